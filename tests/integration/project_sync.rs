//! End-to-end tests: importer sync, flows, and optimistic commits together

use std::time::Duration;

use wsmodel_engine::{Query, ReplaceOutcome, WorkspaceModel};
use wsmodel_foundation::{
    ContentRootData, EntityKind, EntitySource, ModuleData, SourceRootData, SourceRootType,
};
use wsmodel_storage::{Builder, Storage};

fn gradle() -> EntitySource {
    EntitySource::generated("gradle")
}

fn imported(modules: &[(&str, &[&str])]) -> Storage {
    let mut builder = Builder::new();
    for (name, roots) in modules {
        let module = builder.add_entity(ModuleData::new(*name), gradle()).unwrap();
        let content = builder
            .add_child(module, ContentRootData::new(format!("file:///p/{name}")), gradle())
            .unwrap();
        for root in *roots {
            builder
                .add_child(
                    content,
                    SourceRootData::new(format!("file:///p/{name}/{root}"), SourceRootType::Source),
                    gradle(),
                )
                .unwrap();
        }
    }
    builder.to_snapshot()
}

fn sync(model: &WorkspaceModel, import: &Storage) {
    model
        .update_model("Gradle sync", |b| {
            b.replace_by_source(|s| *s == gradle(), import).map(|_| ())
        })
        .unwrap();
}

#[test]
fn repeated_sync_is_stable_and_flows_see_only_real_changes() {
    let model = WorkspaceModel::new();
    model
        .update_model("Manual module", |b| {
            b.add_entity(ModuleData::new("manual"), EntitySource::file("/p/manual.iml"))
        })
        .unwrap();

    let mut flow = model
        .flow_of_diff(Query::<SourceRootData>::entities().map(|r| r.url))
        .unwrap();

    sync(&model, &imported(&[("app", &["src"]), ("lib", &["src"])]));
    assert_eq!(model.version(), 2);
    let update = flow.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(update.value.added.len(), 2);

    sync(&model, &imported(&[("app", &["src"]), ("lib", &["src"])]));
    assert_eq!(model.version(), 2);

    sync(&model, &imported(&[("app", &["src", "gen"])]));
    let update = flow.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(update.value.added, vec!["file:///p/app/gen".to_string()]);
    assert_eq!(update.value.removed, vec!["file:///p/lib/src".to_string()]);

    let storage = model.storage();
    let names: Vec<_> = Query::<ModuleData>::entities()
        .map(|m| m.name)
        .execute(&storage);
    assert!(names.contains(&"manual".to_string()));
    assert!(!names.contains(&"lib".to_string()));
    storage.check_consistency().unwrap();
}

#[test]
fn background_import_retries_after_conflict() {
    let model = WorkspaceModel::new();
    let import = imported(&[("app", &["src"])]);

    let mut background = model.builder_snapshot();
    background
        .builder_mut()
        .replace_by_source(|s| *s == gradle(), &import)
        .unwrap();

    model
        .update_model("User edit", |b| {
            b.add_entity(ModuleData::new("manual"), EntitySource::file("/p/manual.iml"))
        })
        .unwrap();
    assert!(matches!(
        model.replace_project_model(background.into_replacement()).unwrap(),
        ReplaceOutcome::Conflict { .. }
    ));

    let mut retry = model.builder_snapshot();
    retry
        .builder_mut()
        .replace_by_source(|s| *s == gradle(), &import)
        .unwrap();
    assert!(model.replace_project_model(retry.into_replacement()).unwrap().is_committed());
    assert_eq!(model.storage().entity_count(EntityKind::Module), 2);
}
