//! Secondary indexes over stored entities.
//!
//! Maintained incrementally by every record insert, replace, and removal. All maps
//! are persistent, so snapshots share index structure with their builders.

use wsmodel_foundation::{EntityId, EntitySource, SymbolicId};

use crate::record::EntityRecord;

/// Symbolic id, source, and referrer indexes.
#[derive(Clone, Debug, Default)]
pub struct StorageIndexes {
    /// Symbolic id -> owning entity.
    symbolic: im::HashMap<SymbolicId, EntityId>,
    /// Source -> entities with that source.
    by_source: im::OrdMap<EntitySource, im::OrdSet<EntityId>>,
    /// Soft link target -> entities holding a link to it.
    referrers: im::HashMap<SymbolicId, im::OrdSet<EntityId>>,
}

impl StorageIndexes {
    /// Returns the entity owning a symbolic id.
    #[must_use]
    pub fn symbolic(&self, id: &SymbolicId) -> Option<EntityId> {
        self.symbolic.get(id).copied()
    }

    /// Returns the number of indexed symbolic ids.
    #[must_use]
    pub fn symbolic_count(&self) -> usize {
        self.symbolic.len()
    }

    /// Iterates entities whose source satisfies `pred`, ordered by source then id.
    pub fn with_source<'a>(
        &'a self,
        pred: impl Fn(&EntitySource) -> bool + 'a,
    ) -> impl Iterator<Item = EntityId> + 'a {
        self.by_source
            .iter()
            .filter(move |(source, _)| pred(source))
            .flat_map(|(_, ids)| ids.iter().copied())
    }

    /// Returns true if `id` is indexed under `source`.
    #[must_use]
    pub fn has_source(&self, source: &EntitySource, id: EntityId) -> bool {
        self.by_source
            .get(source)
            .is_some_and(|ids| ids.contains(&id))
    }

    /// Iterates entities holding a soft link to `target`, in id order.
    pub fn referrers(&self, target: &SymbolicId) -> impl Iterator<Item = EntityId> + '_ {
        self.referrers
            .get(target)
            .into_iter()
            .flat_map(|ids| ids.iter().copied())
    }

    pub(crate) fn entity_added(&mut self, id: EntityId, record: &EntityRecord) {
        if let Some(symbolic) = record.data.symbolic_id() {
            self.symbolic.insert(symbolic, id);
        }
        self.by_source
            .entry(record.source.clone())
            .or_default()
            .insert(id);
        for link in record.data.soft_links() {
            self.referrers.entry(link).or_default().insert(id);
        }
    }

    pub(crate) fn entity_removed(&mut self, id: EntityId, record: &EntityRecord) {
        if let Some(symbolic) = record.data.symbolic_id() {
            // Only drop the entry if it still points here; replays may have
            // handed the id to another entity already.
            if self.symbolic.get(&symbolic) == Some(&id) {
                self.symbolic.remove(&symbolic);
            }
        }
        self.remove_source(&record.source, id);
        for link in record.data.soft_links() {
            self.remove_referrer(&link, id);
        }
    }

    pub(crate) fn entity_replaced(&mut self, id: EntityId, old: &EntityRecord, new: &EntityRecord) {
        let old_symbolic = old.data.symbolic_id();
        let new_symbolic = new.data.symbolic_id();
        if old_symbolic != new_symbolic {
            if let Some(symbolic) = old_symbolic {
                if self.symbolic.get(&symbolic) == Some(&id) {
                    self.symbolic.remove(&symbolic);
                }
            }
            if let Some(symbolic) = new_symbolic {
                self.symbolic.insert(symbolic, id);
            }
        }

        if old.source != new.source {
            self.remove_source(&old.source, id);
            self.by_source
                .entry(new.source.clone())
                .or_default()
                .insert(id);
        }

        let old_links = old.data.soft_links();
        let new_links = new.data.soft_links();
        if old_links != new_links {
            for link in &old_links {
                if !new_links.contains(link) {
                    self.remove_referrer(link, id);
                }
            }
            for link in new_links {
                self.referrers.entry(link).or_default().insert(id);
            }
        }
    }

    fn remove_source(&mut self, source: &EntitySource, id: EntityId) {
        let now_empty = match self.by_source.get_mut(source) {
            Some(ids) => {
                ids.remove(&id);
                ids.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.by_source.remove(source);
        }
    }

    fn remove_referrer(&mut self, target: &SymbolicId, id: EntityId) {
        let now_empty = match self.referrers.get_mut(target) {
            Some(ids) => {
                ids.remove(&id);
                ids.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.referrers.remove(target);
        }
    }
}
