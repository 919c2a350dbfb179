//! Integration tests for builders and snapshots

use wsmodel_foundation::{
    ContentRootData, EntityKind, EntitySource, ErrorKind, LibraryData, LibraryTableId, ModuleData,
    ModuleDependency, ModuleId, SourceRootData, SourceRootType, SymbolicId,
};
use wsmodel_storage::{Builder, Storage};

fn source() -> EntitySource {
    EntitySource::file("/p/app.iml")
}

fn module(name: &str) -> SymbolicId {
    SymbolicId::Module(ModuleId::new(name))
}

// =============================================================================
// Snapshots
// =============================================================================

#[test]
fn builder_from_snapshot_does_not_affect_snapshot() {
    let mut builder = Builder::new();
    builder.add_entity(ModuleData::new("app"), source()).unwrap();
    let snapshot = builder.to_snapshot();

    let mut edit = snapshot.to_builder();
    edit.add_entity(ModuleData::new("core"), source()).unwrap();

    assert_eq!(snapshot.entity_count(EntityKind::Module), 1);
    assert_eq!(edit.storage().entity_count(EntityKind::Module), 2);
}

#[test]
fn no_op_builder_has_no_changes() {
    let mut builder = Builder::new();
    let app = builder.add_entity(ModuleData::new("app"), source()).unwrap();
    let snapshot = builder.to_snapshot();

    let mut edit = snapshot.to_builder();
    edit.modify::<ModuleData>(app, |m| m.name = "renamed".to_string())
        .unwrap();
    edit.modify::<ModuleData>(app, |m| m.name = "app".to_string())
        .unwrap();
    let added = edit
        .add_entity(LibraryData::new("junit", LibraryTableId::Project), source())
        .unwrap();
    edit.remove_entity(added).unwrap();

    assert!(!edit.has_changes());
    assert!(edit.collect_changes().is_empty());
    assert!(edit.to_snapshot().same_entities(&snapshot));
}

// =============================================================================
// Containment
// =============================================================================

#[test]
fn removing_module_cascades_to_whole_subtree() {
    let mut builder = Builder::new();
    let app = builder.add_entity(ModuleData::new("app"), source()).unwrap();
    let root = builder
        .add_child(app, ContentRootData::new("file:///p"), source())
        .unwrap();
    let src = builder
        .add_child(root, SourceRootData::new("file:///p/src", SourceRootType::Source), source())
        .unwrap();

    assert_eq!(builder.remove_entity(app).unwrap(), 3);
    let storage = builder.to_snapshot();
    for id in [app, root, src] {
        assert!(!storage.contains(id));
        assert!(matches!(
            storage.validate(id).unwrap_err().kind,
            ErrorKind::StaleEntity(_) | ErrorKind::EntityNotFound(_)
        ));
    }
    assert!(storage.is_empty());
    storage.check_consistency().unwrap();
}

#[test]
fn removed_slot_is_reused_with_new_generation() {
    let mut builder = Builder::new();
    let first = builder.add_entity(ModuleData::new("a"), source()).unwrap();
    builder.remove_entity(first).unwrap();
    let second = builder.add_entity(ModuleData::new("b"), source()).unwrap();

    assert_eq!(first.index, second.index);
    assert_ne!(first.generation, second.generation);
    assert!(builder.storage().get::<ModuleData>(first).is_none());
    assert_eq!(builder.storage().get::<ModuleData>(second).unwrap().name, "b");
}

#[test]
fn content_root_requires_module_parent() {
    let mut builder = Builder::new();
    let err = builder
        .add_entity(ContentRootData::new("file:///p"), source())
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MissingParent(EntityKind::ContentRoot)));
}

// =============================================================================
// Symbolic Ids and Soft Links
// =============================================================================

#[test]
fn rename_rewrites_referrers_and_index() {
    let mut builder = Builder::new();
    let core = builder.add_entity(ModuleData::new("core"), source()).unwrap();
    let app = builder
        .add_entity(
            ModuleData::new("app").with_dependency(ModuleDependency::module(ModuleId::new("core"))),
            source(),
        )
        .unwrap();

    builder
        .modify::<ModuleData>(core, |m| m.name = "base".to_string())
        .unwrap();
    let storage: Storage = builder.to_snapshot();

    assert_eq!(storage.resolve_id(&module("base")), Some(core));
    assert_eq!(storage.resolve_id(&module("core")), None);
    let referrers: Vec<_> = storage
        .referrers(&module("base"), EntityKind::Module)
        .map(|e| e.id())
        .collect();
    assert_eq!(referrers, vec![app]);

    let changes = builder.collect_changes();
    assert_eq!(changes.get(EntityKind::Module).len(), 2);
    storage.check_consistency().unwrap();
}

#[test]
fn duplicate_module_name_is_rejected_without_changes() {
    let mut builder = Builder::new();
    builder.add_entity(ModuleData::new("app"), source()).unwrap();
    let snapshot = builder.to_snapshot();
    builder.rebase();

    let err = builder
        .add_entity(ModuleData::new("app"), source())
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::DuplicateSymbolicId { .. }));
    assert!(!builder.has_changes());
    assert!(builder.to_snapshot().same_entities(&snapshot));
}

#[test]
fn entities_by_source_selects_by_predicate() {
    let mut builder = Builder::new();
    builder.add_entity(ModuleData::new("app"), source()).unwrap();
    builder
        .add_entity(ModuleData::new("gen"), EntitySource::generated("gradle"))
        .unwrap();
    let storage = builder.to_snapshot();

    let generated: Vec<_> = storage
        .entities_by_source(|s| matches!(s, EntitySource::Generated { .. }))
        .filter_map(|e| e.get::<ModuleData>().map(|m| m.name.clone()))
        .collect();
    assert_eq!(generated, vec!["gen".to_string()]);
}
