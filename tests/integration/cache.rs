//! Integration tests for the snapshot cache and model loading

use std::fs;

use wsmodel_engine::{Query, WorkspaceModel};
use wsmodel_foundation::{
    ContentRootData, EntityKind, EntitySource, ModuleData, SourceRootData, SourceRootType,
};
use wsmodel_runtime::{
    CacheConfig, CacheLoad, CacheMiss, CacheSerializer, UrlRelativizer, load_cached_model,
};

fn serializer(project_dir: &str) -> CacheSerializer {
    CacheSerializer::new(CacheConfig::default())
        .with_relativizer(UrlRelativizer::standard(project_dir, "/home/u", "/opt/app").unwrap())
}

fn populated(project_dir: &str) -> WorkspaceModel {
    let model = WorkspaceModel::new();
    let iml = EntitySource::file(format!("{project_dir}/app.iml"));
    model
        .update_model("Load project", |b| {
            let app = b.add_entity(ModuleData::new("app"), iml.clone())?;
            let root = b.add_child(app, ContentRootData::new(format!("file://{project_dir}")), iml.clone())?;
            b.add_child(
                root,
                SourceRootData::new(format!("file://{project_dir}/src"), SourceRootType::Source),
                iml.clone(),
            )?;
            b.add_entity(ModuleData::new("scratch"), EntitySource::NonPersistent)?;
            Ok(())
        })
        .unwrap();
    model
}

#[test]
fn cached_model_loads_into_fresh_model() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("project.cache");
    let model = populated("/home/u/project");
    serializer("/home/u/project")
        .save_to_file(&model.storage(), &path)
        .unwrap();

    let fresh = WorkspaceModel::new();
    let subscription = fresh.subscribe();
    let version = load_cached_model(&fresh, &serializer("/home/u/project"), &path).unwrap();
    assert_eq!(version, Some(1));

    let storage = fresh.storage();
    assert_eq!(storage.entity_count(EntityKind::Module), 1);
    assert_eq!(storage.entity_count(EntityKind::SourceRoot), 1);
    let event = subscription.try_recv().unwrap();
    assert_eq!(event.changes().summary().added, 3);
}

#[test]
fn relocated_project_resolves_against_new_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("project.cache");
    serializer("/home/u/project")
        .save_to_file(&populated("/home/u/project").storage(), &path)
        .unwrap();

    let fresh = WorkspaceModel::new();
    load_cached_model(&fresh, &serializer("/work/checkout"), &path).unwrap();
    let urls = Query::<SourceRootData>::entities()
        .map(|r| r.url)
        .execute(&fresh.storage());
    assert_eq!(urls, vec!["file:///work/checkout/src".to_string()]);
}

#[test]
fn stale_format_is_a_miss_and_leaves_model_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("project.cache");
    CacheSerializer::new(CacheConfig::default().with_format_version("wsmodel-cache-0"))
        .save_to_file(&populated("/home/u/project").storage(), &path)
        .unwrap();

    let fresh = WorkspaceModel::new();
    assert_eq!(
        load_cached_model(&fresh, &serializer("/home/u/project"), &path).unwrap(),
        None
    );
    assert_eq!(fresh.version(), 0);
    assert!(matches!(
        serializer("/home/u/project").load_from_file(&path),
        CacheLoad::Miss(CacheMiss::VersionMismatch { .. })
    ));
}

#[test]
fn garbage_file_is_a_miss() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("project.cache");
    fs::write(&path, [0xc1, 0x00, 0xff]).unwrap();
    assert!(matches!(
        serializer("/home/u/project").load_from_file(&path),
        CacheLoad::Miss(CacheMiss::Corrupted(_))
    ));
}
