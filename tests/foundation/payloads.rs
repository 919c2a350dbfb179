//! Integration tests for entity payloads

use wsmodel_foundation::{
    ContentRootData, EntityData, FacetData, LibraryData, LibraryTableId, ModuleData,
    ModuleDependency, ModuleId, SourceRootData, SourceRootType, SymbolicId,
};

#[test]
fn soft_links_follow_field_order() {
    let module: EntityData = ModuleData::new("app")
        .with_dependency(ModuleDependency::module(ModuleId::new("core")))
        .with_dependency(ModuleDependency::module(ModuleId::new("util")))
        .into();
    assert_eq!(
        module.soft_links(),
        vec![
            SymbolicId::Module(ModuleId::new("core")),
            SymbolicId::Module(ModuleId::new("util")),
        ]
    );
}

#[test]
fn update_soft_link_rewrites_matching_references_only() {
    let old = SymbolicId::Module(ModuleId::new("core"));
    let new = SymbolicId::Module(ModuleId::new("base"));

    let mut library: EntityData =
        LibraryData::new("lib", LibraryTableId::Module(ModuleId::new("core"))).into();
    assert!(library.update_soft_link(&old, &new));
    assert_eq!(library.soft_links(), vec![new.clone()]);

    let mut facet: EntityData = FacetData::new(ModuleId::new("app"), "web", "Web").into();
    assert!(!facet.update_soft_link(&old, &new));
}

#[test]
fn pairing_keys_identify_unkeyed_payloads() {
    let root: EntityData = ContentRootData::new("file:///p").into();
    let source_root: EntityData = SourceRootData::new("file:///p/src", SourceRootType::Source).into();
    let module: EntityData = ModuleData::new("app").into();
    assert_eq!(root.pairing_key(), Some("file:///p"));
    assert_eq!(source_root.pairing_key(), Some("file:///p/src"));
    assert_eq!(module.pairing_key(), None);
}

#[test]
fn for_each_url_mut_visits_every_url() {
    let mut root: EntityData = ContentRootData::new("file:///p")
        .with_excluded_url("file:///p/out")
        .with_excluded_url("file:///p/build")
        .into();
    let mut seen = Vec::new();
    root.for_each_url_mut(&mut |url| {
        seen.push(url.clone());
        url.push('/');
    });
    assert_eq!(seen.len(), 3);
    let EntityData::ContentRoot(root) = root else {
        panic!("kind changed");
    };
    assert_eq!(root.url, "file:///p/");
}
