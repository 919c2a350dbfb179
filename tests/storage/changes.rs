//! Integration tests for change collection and replay

use wsmodel_foundation::{ContentRootData, EntityKind, EntitySource, ModuleData, ModuleId, SymbolicId};
use wsmodel_storage::{Builder, EntityChange, collect_changes, format_changes};

fn source() -> EntitySource {
    EntitySource::file("/p/app.iml")
}

#[test]
fn content_root_addition_keeps_module_identity() {
    let mut builder = Builder::new();
    let module = builder.add_entity(ModuleData::new("M"), source()).unwrap();
    let before = builder.to_snapshot();
    builder
        .add_child(module, ContentRootData::new("/src"), source())
        .unwrap();
    let after = builder.to_snapshot();

    let changes = collect_changes(&before, &after);
    let summary = changes.summary();
    assert_eq!(summary.added, 1);
    assert_eq!(summary.replaced, 1);
    assert_eq!(summary.removed, 0);
    assert!(matches!(
        changes.get(EntityKind::ContentRoot),
        [EntityChange::Added(_)]
    ));
    assert_eq!(
        after.resolve_id(&SymbolicId::Module(ModuleId::new("M"))),
        Some(module)
    );
}

#[test]
fn builder_changes_match_snapshot_diff() {
    let mut builder = Builder::new();
    let a = builder.add_entity(ModuleData::new("a"), source()).unwrap();
    builder.add_entity(ModuleData::new("b"), source()).unwrap();
    let before = builder.to_snapshot();
    builder.rebase();

    builder.remove_entity(a).unwrap();
    builder.add_entity(ModuleData::new("c"), source()).unwrap();
    let after = builder.to_snapshot();

    let from_log = builder.collect_changes();
    let from_diff = collect_changes(&before, &after);
    assert_eq!(from_log.summary(), from_diff.summary());
    assert!(from_log.replay(&before).unwrap().same_entities(&after));
}

#[test]
fn format_reports_no_changes() {
    let storage = Builder::new().to_snapshot();
    assert_eq!(format_changes(&collect_changes(&storage, &storage), 10), "No changes");
}
