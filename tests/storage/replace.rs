//! Integration tests for source-scoped replacement

use wsmodel_foundation::{
    ContentRootData, EntityKind, EntitySource, ModuleData, SourceRootData, SourceRootType,
};
use wsmodel_storage::{Builder, ExternalMappingKey, Storage};

fn iml(name: &str) -> EntitySource {
    EntitySource::file(format!("/p/{name}.iml"))
}

fn is(source: EntitySource) -> impl Fn(&EntitySource) -> bool {
    move |candidate| *candidate == source
}

fn project(roots: &[&str]) -> Storage {
    let mut builder = Builder::new();
    let app = builder.add_entity(ModuleData::new("app"), iml("app")).unwrap();
    for url in roots {
        builder
            .add_child(app, ContentRootData::new(*url), iml("app"))
            .unwrap();
    }
    builder.add_entity(ModuleData::new("core"), iml("core")).unwrap();
    builder.to_snapshot()
}

#[test]
fn replacement_only_touches_matching_sources() {
    let current = project(&["file:///p/app"]);
    let mut replacement = Builder::new();
    replacement
        .add_entity(ModuleData::new("core").with_type("JAVA"), iml("core"))
        .unwrap();
    replacement
        .add_entity(ModuleData::new("app").with_type("WEB"), iml("app"))
        .unwrap();

    let mut builder = current.to_builder();
    let report = builder
        .replace_by_source(is(iml("core")), &replacement.to_snapshot())
        .unwrap();
    let result = builder.to_snapshot();

    assert_eq!(report.relabelled, 1);
    let types: Vec<_> = result
        .entities::<ModuleData>()
        .map(|(_, m)| (m.name.clone(), m.module_type.clone()))
        .collect();
    assert_eq!(
        types,
        vec![
            ("app".to_string(), None),
            ("core".to_string(), Some("JAVA".to_string())),
        ]
    );
    assert_eq!(result.entity_count(EntityKind::ContentRoot), 1);
    result.check_consistency().unwrap();
}

#[test]
fn replacing_with_same_content_changes_nothing() {
    let current = project(&["file:///p/app", "file:///p/app/gen"]);
    let mut builder = current.to_builder();
    builder.replace_by_source(|_| true, &current).unwrap();
    assert!(builder.collect_changes().is_empty());
    assert!(builder.to_snapshot().same_entities(&current));
}

#[test]
fn content_roots_are_reconciled_by_url() {
    let current = project(&["file:///p/app", "file:///p/old"]);
    let app_id = current.entities::<ModuleData>().next().unwrap().0;
    let kept_root = current.children(app_id, EntityKind::ContentRoot).next().unwrap().id();

    let mut replacement = Builder::new();
    let app = replacement.add_entity(ModuleData::new("app"), iml("app")).unwrap();
    let root = replacement
        .add_child(app, ContentRootData::new("file:///p/app"), iml("app"))
        .unwrap();
    replacement
        .add_child(root, SourceRootData::new("file:///p/app/src", SourceRootType::Source), iml("app"))
        .unwrap();

    let mut builder = current.to_builder();
    builder
        .replace_by_source(is(iml("app")), &replacement.to_snapshot())
        .unwrap();
    let result = builder.to_snapshot();

    let roots: Vec<_> = result.children(app_id, EntityKind::ContentRoot).collect();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].id(), kept_root);
    assert_eq!(result.children(kept_root, EntityKind::SourceRoot).count(), 1);
    result.check_consistency().unwrap();
}

#[test]
fn replacement_round_trips_through_change_set() {
    let current = project(&["file:///p/app"]);
    let mut replacement = Builder::new();
    replacement.add_entity(ModuleData::new("extra"), iml("core")).unwrap();

    let mut builder = current.to_builder();
    builder
        .replace_by_source(is(iml("core")), &replacement.to_snapshot())
        .unwrap();
    let after = builder.to_snapshot();

    let replayed = builder.collect_changes().replay(&current).unwrap();
    assert!(replayed.same_entities(&after));
    assert_eq!(after.entity_count(EntityKind::Module), 2);
}

#[test]
fn repeated_sync_with_mappings_changes_nothing() {
    const HANDLE: ExternalMappingKey<u32> = ExternalMappingKey::new("handle");
    let sync = |builder: &mut Builder| {
        let mut replacement = Builder::new();
        let app = replacement.add_entity(ModuleData::new("app"), iml("app")).unwrap();
        replacement
            .add_child(app, ContentRootData::new("file:///p/app"), iml("app"))
            .unwrap();
        replacement.set_mapping(&HANDLE, app, 7).unwrap();
        builder
            .replace_by_source(is(iml("app")), &replacement.to_snapshot())
            .unwrap();
    };

    let mut builder = Builder::new();
    sync(&mut builder);
    assert!(builder.has_changes());
    builder.rebase();

    for _ in 0..2 {
        sync(&mut builder);
        assert!(!builder.has_changes());
        assert!(builder.collect_changes().is_empty());
        builder.rebase();
    }

    let (app, _) = builder.storage().entities::<ModuleData>().next().unwrap();
    assert_eq!(builder.storage().mapping(&HANDLE, app), Some(&7));
}
