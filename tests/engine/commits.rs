//! Integration tests for synchronous and optimistic commits

use std::sync::Arc;
use std::thread;

use wsmodel_engine::{ModelConfig, ReplaceOutcome, WorkspaceModel};
use wsmodel_foundation::{EntityKind, EntitySource, ErrorKind, ModuleData, ModuleId, SymbolicId};

fn source() -> EntitySource {
    EntitySource::file("/p/app.iml")
}

#[test]
fn optimistic_commit_is_compare_and_swap() {
    let model = WorkspaceModel::new();

    let mut b1 = model.builder_snapshot();
    let mut b2 = model.builder_snapshot();
    b1.builder_mut()
        .add_entity(ModuleData::new("one"), source())
        .unwrap();
    b2.builder_mut()
        .add_entity(ModuleData::new("two"), source())
        .unwrap();

    assert_eq!(
        model.replace_project_model(b1.into_replacement()).unwrap(),
        ReplaceOutcome::Committed { version: 1 }
    );
    assert_eq!(
        model.replace_project_model(b2.into_replacement()).unwrap(),
        ReplaceOutcome::Conflict {
            expected: 0,
            actual: 1
        }
    );

    let mut b3 = model.builder_snapshot();
    b3.builder_mut()
        .add_entity(ModuleData::new("two"), source())
        .unwrap();
    let outcome = model
        .replace_project_model(b3.into_replacement().with_description("Retry"))
        .unwrap();
    assert!(outcome.is_committed());
    assert_eq!(model.storage().entity_count(EntityKind::Module), 2);
}

#[test]
fn readers_keep_their_snapshot() {
    let model = WorkspaceModel::new();
    let before = model.current();
    model
        .update_model("add app", |b| b.add_entity(ModuleData::new("app"), source()))
        .unwrap();

    assert_eq!(before.version(), 0);
    assert!(before.storage().is_empty());
    assert_eq!(model.current().version(), 1);
}

#[test]
fn concurrent_writers_are_serialized() {
    let model = Arc::new(WorkspaceModel::with_config(ModelConfig::strict()));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let model = Arc::clone(&model);
            thread::spawn(move || {
                model
                    .update_model("add module", |b| {
                        b.add_entity(ModuleData::new(format!("m{i}")), source())
                    })
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(model.version(), 8);
    let storage = model.storage();
    for i in 0..8 {
        assert!(
            storage
                .resolve_id(&SymbolicId::Module(ModuleId::new(format!("m{i}"))))
                .is_some()
        );
    }
}

#[test]
fn nested_commit_from_replace_fails_fast() {
    let model = WorkspaceModel::new();
    let err = model
        .update_model("outer", |_| {
            let snapshot = model.builder_snapshot();
            model.replace_project_model(snapshot.into_replacement())
        })
        .unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::ReentrantUpdate { ref in_flight, .. } if in_flight == "outer"
    ));
    assert_eq!(model.version(), 0);
}

#[test]
fn strict_config_rejects_nothing_valid() {
    let model = WorkspaceModel::with_config(ModelConfig::strict());
    model
        .update_model("build", |b| {
            let app = b.add_entity(ModuleData::new("app"), source())?;
            b.add_child(app, wsmodel_foundation::ContentRootData::new("file:///p"), source())?;
            Ok(())
        })
        .unwrap();
    assert_eq!(model.version(), 1);
}
