//! Property tests: collected changes replay to the same storage

use proptest::prelude::*;
use wsmodel_foundation::{
    ContentRootData, EntityId, EntityKind, EntitySource, LibraryData, LibraryTableId, ModuleData,
    ModuleDependency, ModuleId, SourceRootData, SourceRootType,
};
use wsmodel_storage::{Builder, Storage, collect_changes};

#[derive(Clone, Debug)]
enum Op {
    AddModule(u8),
    AddLibrary(u8),
    AddContentRoot { module: usize, url: u8 },
    AddSourceRoot { root: usize, url: u8 },
    AddDependency { from: usize, to: u8 },
    Rename { module: usize, name: u8 },
    Relabel { module: usize, generated: bool },
    Remove { kind: EntityKind, pick: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..8).prop_map(Op::AddModule),
        (0u8..4).prop_map(Op::AddLibrary),
        (any::<usize>(), 0u8..6).prop_map(|(module, url)| Op::AddContentRoot { module, url }),
        (any::<usize>(), 0u8..6).prop_map(|(root, url)| Op::AddSourceRoot { root, url }),
        (any::<usize>(), 0u8..8).prop_map(|(from, to)| Op::AddDependency { from, to }),
        (any::<usize>(), 0u8..8).prop_map(|(module, name)| Op::Rename { module, name }),
        (any::<usize>(), any::<bool>()).prop_map(|(module, generated)| Op::Relabel { module, generated }),
        (
            prop_oneof![
                Just(EntityKind::Module),
                Just(EntityKind::ContentRoot),
                Just(EntityKind::SourceRoot),
                Just(EntityKind::Library),
            ],
            any::<usize>()
        )
            .prop_map(|(kind, pick)| Op::Remove { kind, pick }),
    ]
}

fn pick(builder: &Builder, kind: EntityKind, pick: usize) -> Option<EntityId> {
    let ids: Vec<_> = builder.storage().entities_of(kind).map(|e| e.id()).collect();
    (!ids.is_empty()).then(|| ids[pick % ids.len()])
}

fn source() -> EntitySource {
    EntitySource::file("/p/app.iml")
}

/// Applies one operation. Rejected operations leave the builder unchanged.
fn apply(builder: &mut Builder, op: &Op) {
    let _ = match *op {
        Op::AddModule(n) => builder
            .add_entity(ModuleData::new(format!("m{n}")), source())
            .map(|_| ()),
        Op::AddLibrary(n) => builder
            .add_entity(LibraryData::new(format!("l{n}"), LibraryTableId::Project), source())
            .map(|_| ()),
        Op::AddContentRoot { module, url } => match pick(builder, EntityKind::Module, module) {
            Some(parent) => builder
                .add_child(parent, ContentRootData::new(format!("file:///r{url}")), source())
                .map(|_| ()),
            None => Ok(()),
        },
        Op::AddSourceRoot { root, url } => match pick(builder, EntityKind::ContentRoot, root) {
            Some(parent) => builder
                .add_child(
                    parent,
                    SourceRootData::new(format!("file:///r/s{url}"), SourceRootType::Source),
                    source(),
                )
                .map(|_| ()),
            None => Ok(()),
        },
        Op::AddDependency { from, to } => match pick(builder, EntityKind::Module, from) {
            Some(id) => builder
                .modify::<ModuleData>(id, |m| {
                    m.dependencies
                        .push(ModuleDependency::module(ModuleId::new(format!("m{to}"))));
                })
                .map(|_| ()),
            None => Ok(()),
        },
        Op::Rename { module, name } => match pick(builder, EntityKind::Module, module) {
            Some(id) => builder
                .modify::<ModuleData>(id, |m| m.name = format!("m{name}"))
                .map(|_| ()),
            None => Ok(()),
        },
        Op::Relabel { module, generated } => match pick(builder, EntityKind::Module, module) {
            Some(id) => {
                let label = if generated {
                    EntitySource::generated("gradle")
                } else {
                    source()
                };
                builder.change_source(id, label)
            }
            None => Ok(()),
        },
        Op::Remove { kind, pick: n } => match pick(builder, kind, n) {
            Some(id) => builder.remove_entity(id).map(|_| ()),
            None => Ok(()),
        },
    };
}

fn build(ops: &[Op]) -> Storage {
    let mut builder = Builder::new();
    for op in ops {
        apply(&mut builder, op);
    }
    builder.to_snapshot()
}

proptest! {
    #[test]
    fn diff_replays_to_target(setup in prop::collection::vec(op(), 0..20), script in prop::collection::vec(op(), 0..30)) {
        let before = build(&setup);
        let mut builder = before.to_builder();
        for op in &script {
            apply(&mut builder, op);
        }
        let after = builder.to_snapshot();
        after.check_consistency().unwrap();

        let replayed = collect_changes(&before, &after).replay(&before).unwrap();
        prop_assert!(replayed.same_entities(&after));

        let replayed = builder.collect_changes().replay(&before).unwrap();
        prop_assert!(replayed.same_entities(&after));
    }

    #[test]
    fn unchanged_builder_collects_nothing(setup in prop::collection::vec(op(), 0..20)) {
        let before = build(&setup);
        let builder = before.to_builder();
        prop_assert!(builder.collect_changes().is_empty());
        prop_assert!(collect_changes(&before, &builder.to_snapshot()).is_empty());
    }
}
