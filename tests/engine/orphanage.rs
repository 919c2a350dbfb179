//! Integration tests for orphaned fragment reattachment

use wsmodel_engine::{FragmentState, ModelConfig, Orphanage, WorkspaceModel};
use wsmodel_foundation::{
    ContentRootData, EntityKind, EntitySource, ModuleData, ModuleId, SourceRootData, SourceRootType,
};
use wsmodel_storage::Storage;

fn source() -> EntitySource {
    EntitySource::file("/p/app.iml")
}

fn park_fragments(model: &WorkspaceModel) {
    model
        .update_orphanage("park app roots", |b| {
            let module = Orphanage::placeholder_module(b, "app")?;
            let root = b.add_child(module, ContentRootData::new("file:///p/app"), source())?;
            b.add_child(root, SourceRootData::new("file:///p/app/src", SourceRootType::Source), source())?;
            Ok(())
        })
        .unwrap();
}

fn add_module(model: &WorkspaceModel) {
    model
        .update_model("add app", |b| b.add_entity(ModuleData::new("app"), source()))
        .unwrap();
}

fn urls(storage: &Storage) -> Vec<String> {
    let mut urls: Vec<_> = storage
        .entities::<ContentRootData>()
        .map(|(_, r)| r.url.clone())
        .chain(storage.entities::<SourceRootData>().map(|(_, r)| r.url.clone()))
        .collect();
    urls.sort();
    urls
}

#[test]
fn fragments_parked_first_are_adopted_when_module_appears() {
    let model = WorkspaceModel::new();
    park_fragments(&model);
    assert_eq!(model.version(), 0);
    assert_eq!(
        model.orphanage().state_of(&ModuleId::new("app")),
        FragmentState::Parked
    );

    add_module(&model);
    assert!(model.orphanage().is_empty());
    assert_eq!(
        model.orphanage().state_of(&ModuleId::new("app")),
        FragmentState::Absent
    );
    assert_eq!(urls(&model.storage()), vec!["file:///p/app", "file:///p/app/src"]);
}

#[test]
fn both_insertion_orders_converge() {
    let fragments_first = WorkspaceModel::with_config(ModelConfig::strict());
    park_fragments(&fragments_first);
    add_module(&fragments_first);

    let module_first = WorkspaceModel::with_config(ModelConfig::strict());
    add_module(&module_first);
    park_fragments(&module_first);

    let a = fragments_first.storage();
    let b = module_first.storage();
    assert_eq!(urls(&a), urls(&b));
    for kind in EntityKind::ALL {
        assert_eq!(a.entity_count(kind), b.entity_count(kind), "{kind}");
    }
    assert!(fragments_first.orphanage().is_empty());
    assert!(module_first.orphanage().is_empty());
}

#[test]
fn disabled_orphanage_keeps_fragments_parked() {
    let model = WorkspaceModel::with_config(ModelConfig::relaxed());
    park_fragments(&model);
    add_module(&model);
    assert!(!model.orphanage().is_empty());
    assert_eq!(model.storage().entity_count(EntityKind::ContentRoot), 0);
}

#[test]
fn fragments_are_not_moved_back_after_module_removal() {
    let model = WorkspaceModel::new();
    park_fragments(&model);
    add_module(&model);

    model
        .update_model("remove app", |b| {
            let id = b.storage().entities::<ModuleData>().next().map(|(id, _)| id);
            match id {
                Some(id) => b.remove_entity(id),
                None => Ok(0),
            }
        })
        .unwrap();
    assert!(model.storage().is_empty());
    assert!(model.orphanage().is_empty());
}
