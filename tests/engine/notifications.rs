//! Integration tests for listeners and subscriptions

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use wsmodel_engine::{ChangeListener, ModelConfig, VersionedStorageChange, WorkspaceModel};
use wsmodel_foundation::{EntityKind, EntitySource, ModuleData};
use wsmodel_storage::{Builder, ExternalMappingKey};

fn source() -> EntitySource {
    EntitySource::file("/p/app.iml")
}

fn add(model: &WorkspaceModel, name: &str) {
    model
        .update_model(&format!("add {name}"), |b| {
            b.add_entity(ModuleData::new(name), source())
        })
        .unwrap();
}

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(u64, u64, usize)>>,
}

impl ChangeListener for Recorder {
    fn changed(&self, event: &VersionedStorageChange) {
        self.seen.lock().push((
            event.before().version(),
            event.after().version(),
            event.changes().get(EntityKind::Module).len(),
        ));
    }
}

struct Panicking(AtomicUsize);

impl ChangeListener for Panicking {
    fn changed(&self, _event: &VersionedStorageChange) {
        self.0.fetch_add(1, Ordering::SeqCst);
        panic!("listener failure");
    }
}

#[test]
fn listeners_see_each_version_once_in_order() {
    let model = WorkspaceModel::new();
    let recorder = Arc::new(Recorder::default());
    model.add_listener(recorder.clone());

    add(&model, "a");
    add(&model, "b");
    model.update_model("noop", |_| Ok(())).unwrap();

    assert_eq!(*recorder.seen.lock(), vec![(0, 1, 1), (1, 2, 1)]);
}

#[test]
fn panicking_listener_does_not_affect_others() {
    let model = WorkspaceModel::new();
    let panicking = Arc::new(Panicking(AtomicUsize::new(0)));
    let recorder = Arc::new(Recorder::default());
    model.add_listener(panicking.clone());
    model.add_listener(recorder.clone());

    add(&model, "a");
    add(&model, "b");

    assert_eq!(panicking.0.load(Ordering::SeqCst), 2);
    assert_eq!(recorder.seen.lock().len(), 2);
    assert_eq!(model.version(), 2);
}

#[test]
fn slow_subscriber_gets_coalesced_span() {
    let model = WorkspaceModel::with_config(ModelConfig::default().with_subscriber_capacity(1));
    let subscription = model.subscribe();
    for name in ["a", "b", "c", "d"] {
        add(&model, name);
    }

    let events = subscription.drain();
    let spans: Vec<_> = events
        .iter()
        .map(|e| (e.before().version(), e.after().version()))
        .collect();
    assert_eq!(spans, vec![(0, 1), (1, 4)]);
    assert_eq!(events[1].changes().get(EntityKind::Module).len(), 3);
}

#[test]
fn subscribe_with_current_has_no_gap() {
    let model = WorkspaceModel::new();
    add(&model, "a");
    let (current, subscription) = model.subscribe_with_current().unwrap();
    add(&model, "b");

    let event = subscription.try_recv().unwrap();
    assert_eq!(event.before().version(), current.version());
    assert!(subscription.try_recv().is_none());
}

#[test]
fn cancelled_subscription_stops_delivery_without_reverting() {
    let model = WorkspaceModel::new();
    let subscription = model.subscribe();
    subscription.cancel();
    add(&model, "a");

    assert!(subscription.try_recv().is_none());
    assert!(subscription.is_cancelled());
    assert_eq!(model.version(), 1);
}

#[test]
fn identical_resync_notifies_once() {
    const HANDLE: ExternalMappingKey<u32> = ExternalMappingKey::new("handle");
    let model = WorkspaceModel::new();
    let recorder = Arc::new(Recorder::default());
    model.add_listener(recorder.clone());

    for _ in 0..3 {
        let mut replacement = Builder::new();
        let app = replacement.add_entity(ModuleData::new("app"), source()).unwrap();
        replacement.set_mapping(&HANDLE, app, 7).unwrap();
        let replacement = replacement.to_snapshot();
        model
            .update_model("sync", |b| {
                b.replace_by_source(|s| *s == source(), &replacement)
            })
            .unwrap();
    }

    assert_eq!(model.version(), 1);
    assert_eq!(*recorder.seen.lock(), vec![(0, 1, 1)]);
    let storage = model.storage();
    let (app, _) = storage.entities::<ModuleData>().next().unwrap();
    assert_eq!(storage.mapping(&HANDLE, app), Some(&7));
}

#[test]
fn identical_resync_without_mappings_is_silent() {
    let model = WorkspaceModel::new();
    add(&model, "app");
    let subscription = model.subscribe();

    let current = model.storage();
    model
        .update_model("sync", |b| b.replace_by_source(|_| true, &current))
        .unwrap();

    assert_eq!(model.version(), 1);
    assert!(subscription.try_recv().is_none());
}
