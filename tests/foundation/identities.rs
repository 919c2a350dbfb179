//! Integration tests for entity and symbolic identities

use std::collections::HashSet;

use wsmodel_foundation::{
    EntityData, EntityId, EntityKind, EntitySource, FacetData, LibraryData, LibraryId,
    LibraryTableId, ModuleData, ModuleId, SymbolicId,
};

// =============================================================================
// Entity Ids
// =============================================================================

#[test]
fn ids_differ_by_kind_index_and_generation() {
    let ids: HashSet<_> = [
        EntityId::new(EntityKind::Module, 0, 1),
        EntityId::new(EntityKind::Module, 0, 3),
        EntityId::new(EntityKind::Module, 1, 1),
        EntityId::new(EntityKind::ContentRoot, 0, 1),
    ]
    .into_iter()
    .collect();
    assert_eq!(ids.len(), 4);
}

#[test]
fn kinds_are_listed_in_declaration_order() {
    for (ordinal, kind) in EntityKind::ALL.into_iter().enumerate() {
        assert_eq!(kind.ordinal(), ordinal);
    }
    assert_eq!(EntityKind::ALL[0], EntityKind::Module);
}

#[test]
fn only_modules_libraries_and_facets_are_keyed() {
    let keyed: Vec<_> = EntityKind::ALL.into_iter().filter(|k| k.is_keyed()).collect();
    assert_eq!(
        keyed,
        vec![EntityKind::Module, EntityKind::Library, EntityKind::Facet]
    );
}

// =============================================================================
// Symbolic Ids
// =============================================================================

#[test]
fn payloads_derive_their_symbolic_ids() {
    let module: EntityData = ModuleData::new("app").into();
    assert_eq!(
        module.symbolic_id(),
        Some(SymbolicId::Module(ModuleId::new("app")))
    );

    let library: EntityData = LibraryData::new("junit", LibraryTableId::Project).into();
    assert_eq!(
        library.symbolic_id(),
        Some(SymbolicId::Library(LibraryId::project("junit")))
    );

    let facet: EntityData = FacetData::new(ModuleId::new("app"), "web", "Web").into();
    assert_eq!(facet.symbolic_id().map(|id| id.kind()), Some(EntityKind::Facet));
}

#[test]
fn same_library_name_in_different_tables_is_distinct() {
    let project = LibraryId::project("junit");
    let module = LibraryId::new("junit", LibraryTableId::Module(ModuleId::new("app")));
    assert_ne!(project, module);
    assert_eq!(
        SymbolicId::Library(module).presentable_name(),
        SymbolicId::Library(project).presentable_name()
    );
}

// =============================================================================
// Sources
// =============================================================================

#[test]
fn only_file_and_generated_sources_are_cacheable() {
    assert!(EntitySource::file("/p/app.iml").is_cacheable());
    assert!(EntitySource::generated("gradle").is_cacheable());
    assert!(!EntitySource::NonPersistent.is_cacheable());
    assert!(!EntitySource::Orphanage.is_cacheable());
    assert!(!EntitySource::DummyParent.is_cacheable());
}

#[test]
fn same_variant_ignores_payload() {
    let a = EntitySource::file("/p/a.iml");
    let b = EntitySource::file("/p/b.iml");
    assert!(a.same_variant(&b));
    assert!(!a.same_variant(&EntitySource::generated("maven")));
}
