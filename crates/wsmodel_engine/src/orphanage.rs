//! Parking area for sub-entities whose module does not exist yet.
//!
//! Producers sometimes learn about a module's content roots, options, or facets
//! before the module itself is loaded. Such fragments are parked under placeholder
//! modules with source [`EntitySource::Orphanage`]. Whenever the main storage or
//! the orphanage changes, every placeholder whose module resolves in the main
//! storage is spliced into it and dropped from the orphanage:
//!
//! ```text
//! Parked --(module appears)--> Reattached --(commit succeeds)--> absent
//! ```
//!
//! Sub-entities already present under the real module win. Content roots are
//! matched by URL, and their source roots merged. Fragments are never moved back
//! if the module is removed later.

use parking_lot::Mutex;
use tracing::{debug, trace};
use wsmodel_foundation::{
    EntityData, EntityId, EntityKind, EntitySource, ModuleData, ModuleId, Result, SymbolicId,
};
use wsmodel_storage::{Builder, Storage};

/// Lifecycle of a parked fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FragmentState {
    /// Waiting for its module.
    Parked,
    /// Spliced into a builder whose commit is pending.
    Reattached,
    /// Not in the orphanage.
    Absent,
}

/// Result of splicing orphaned fragments into a builder.
#[derive(Clone, Debug)]
pub struct Adoption {
    /// The orphanage storage without the adopted placeholders.
    pub remaining: Storage,
    /// Modules whose fragments were reattached.
    pub modules: Vec<ModuleId>,
}

/// Storage of orphaned fragments.
#[derive(Debug, Default)]
pub struct Orphanage {
    storage: Mutex<Storage>,
    /// Modules adopted by a commit that has not finished yet.
    pending: Mutex<Vec<ModuleId>>,
}

impl Orphanage {
    /// Creates an empty orphanage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the orphanage.
    #[must_use]
    pub fn snapshot(&self) -> Storage {
        self.storage.lock().clone()
    }

    /// Returns true if nothing is parked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storage.lock().is_empty()
    }

    /// Returns the state of the fragments parked for `module`.
    #[must_use]
    pub fn state_of(&self, module: &ModuleId) -> FragmentState {
        if self.pending.lock().contains(module) {
            return FragmentState::Reattached;
        }
        let storage = self.storage.lock();
        if storage.resolve_id(&SymbolicId::Module(module.clone())).is_some() {
            FragmentState::Parked
        } else {
            FragmentState::Absent
        }
    }

    /// Replaces the orphanage contents, completing any pending adoption.
    pub(crate) fn install(&self, storage: Storage) {
        *self.storage.lock() = storage;
        self.pending.lock().clear();
    }

    /// Forgets a pending adoption whose commit did not happen.
    pub(crate) fn discard_pending(&self) {
        self.pending.lock().clear();
    }

    /// Returns the placeholder module for `name` in an orphanage builder,
    /// creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the placeholder cannot be added to the builder.
    pub fn placeholder_module(builder: &mut Builder, name: &str) -> Result<EntityId> {
        let symbolic = SymbolicId::Module(ModuleId::new(name));
        if let Some(existing) = builder.storage().resolve_id(&symbolic) {
            return Ok(existing);
        }
        builder.add_entity(ModuleData::new(name), EntitySource::Orphanage)
    }

    /// Splices every placeholder whose module resolves in `target` into it.
    ///
    /// Returns `None` if nothing was adopted. The orphanage itself is unchanged
    /// until the caller installs [`Adoption::remaining`].
    ///
    /// # Errors
    ///
    /// Returns an error if a fragment cannot be attached to its module.
    pub(crate) fn adopt_into(&self, target: &mut Builder) -> Result<Option<Adoption>> {
        let orphans = self.snapshot();
        if orphans.is_empty() {
            return Ok(None);
        }

        let mut remaining = orphans.to_builder();
        let mut modules = Vec::new();
        for (placeholder, data) in orphans.entities::<ModuleData>() {
            let module_id = data.module_id();
            let Some(module) = target.storage().resolve_id(&SymbolicId::Module(module_id.clone()))
            else {
                continue;
            };
            trace!(target: "wsmodel::orphanage", module = %module_id, "reattaching fragments");
            splice(&orphans, placeholder, target, module)?;
            remaining.remove_entity(placeholder)?;
            modules.push(module_id);
        }

        if modules.is_empty() {
            return Ok(None);
        }
        debug!(target: "wsmodel::orphanage", count = modules.len(), "adopted orphaned fragments");
        self.pending.lock().clone_from(&modules);
        Ok(Some(Adoption {
            remaining: remaining.to_snapshot(),
            modules,
        }))
    }
}

/// Copies the children of a placeholder into the real module.
fn splice(
    orphans: &Storage,
    placeholder: EntityId,
    target: &mut Builder,
    module: EntityId,
) -> Result<()> {
    for options in orphans.children(placeholder, EntityKind::ModuleOptions) {
        if target
            .storage()
            .children(module, EntityKind::ModuleOptions)
            .next()
            .is_none()
        {
            copy_subtree(orphans, options.id(), target, module)?;
        }
    }

    for root in orphans.children(placeholder, EntityKind::ContentRoot) {
        let existing = target
            .storage()
            .children(module, EntityKind::ContentRoot)
            .find(|candidate| candidate.data().pairing_key() == root.data().pairing_key())
            .map(|candidate| candidate.id());
        match existing {
            Some(existing) => merge_source_roots(orphans, root.id(), target, existing)?,
            None => {
                copy_subtree(orphans, root.id(), target, module)?;
            }
        }
    }

    for facet in orphans.children(placeholder, EntityKind::Facet) {
        let taken = facet
            .symbolic_id()
            .is_some_and(|symbolic| target.storage().resolve_id(&symbolic).is_some());
        if !taken {
            copy_subtree(orphans, facet.id(), target, module)?;
        }
    }
    Ok(())
}

fn merge_source_roots(
    orphans: &Storage,
    root: EntityId,
    target: &mut Builder,
    existing: EntityId,
) -> Result<()> {
    for source_root in orphans.children(root, EntityKind::SourceRoot) {
        let present = target
            .storage()
            .children(existing, EntityKind::SourceRoot)
            .any(|candidate| candidate.data().pairing_key() == source_root.data().pairing_key());
        if !present {
            copy_subtree(orphans, source_root.id(), target, existing)?;
        }
    }
    Ok(())
}

/// Copies an entity and its descendants under `parent`, keeping sources.
fn copy_subtree(
    from: &Storage,
    id: EntityId,
    target: &mut Builder,
    parent: EntityId,
) -> Result<EntityId> {
    let Some(entity) = from.entity(id) else {
        return Ok(parent);
    };
    let data: EntityData = entity.data().clone();
    let copied = target.add_child(parent, data, entity.source().clone())?;
    for child in entity.children().iter() {
        copy_subtree(from, *child, target, copied)?;
    }
    Ok(copied)
}
