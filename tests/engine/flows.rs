//! Integration tests for reactive query flows

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use wsmodel_engine::{Query, WorkspaceModel};
use wsmodel_foundation::{ContentRootData, EntitySource, ModuleData};

fn source() -> EntitySource {
    EntitySource::file("/p/app.iml")
}

fn names() -> Query<String> {
    Query::<ModuleData>::entities().map(|m| m.name)
}

fn add(model: &WorkspaceModel, name: &str) {
    model
        .update_model(&format!("add {name}"), |b| {
            b.add_entity(ModuleData::new(name), source())
        })
        .unwrap();
}

#[test]
fn flow_is_gap_free_and_ordered() {
    let model = WorkspaceModel::new();
    add(&model, "a");
    let mut flow = model.flow_of_query(names()).unwrap();
    add(&model, "b");
    add(&model, "c");

    assert_eq!(flow.initial(), &vec!["a".to_string()]);
    let first = flow.recv_timeout(Duration::from_secs(1)).unwrap();
    let second = flow.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!((first.from_version, first.version), (1, 2));
    assert_eq!((second.from_version, second.version), (2, 3));
    assert_eq!(second.value, vec!["a", "b", "c"]);
}

#[test]
fn new_elements_survive_coalescing() {
    let model = WorkspaceModel::with_config(
        wsmodel_engine::ModelConfig::default().with_subscriber_capacity(1),
    );
    let mut flow = model.flow_of_new_elements(names()).unwrap();
    for name in ["a", "b", "c"] {
        add(&model, name);
    }

    let mut seen = Vec::new();
    while let Some(update) = flow.try_recv() {
        seen.extend(update.value);
    }
    assert_eq!(seen, vec!["a", "b", "c"]);
}

#[test]
fn unrelated_kind_changes_emit_nothing() {
    let model = WorkspaceModel::new();
    add(&model, "app");
    let mut flow = model
        .flow_of_diff(Query::<ContentRootData>::entities().map(|r| r.url))
        .unwrap();
    add(&model, "core");
    assert!(flow.try_recv().is_none());
    assert_eq!(flow.version(), 2);
}

#[test]
fn spawned_subscribers_are_isolated() {
    let model = WorkspaceModel::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let panicking = model
        .flow_of_query(names())
        .unwrap()
        .spawn(|_| panic!("subscriber failure"));
    let recorder = {
        let seen = Arc::clone(&seen);
        model
            .flow_of_query(names())
            .unwrap()
            .spawn(move |update| seen.lock().push(update.value))
    };

    add(&model, "a");
    add(&model, "b");
    drop(model);

    panicking.join().unwrap();
    recorder.join().unwrap();
    assert_eq!(
        *seen.lock(),
        vec![vec!["a".to_string()], vec!["a".to_string(), "b".to_string()]]
    );
}
