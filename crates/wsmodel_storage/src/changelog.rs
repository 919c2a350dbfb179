//! Builder change log.
//!
//! Records, per entity, the net effect of every builder operation relative to the
//! builder's base snapshot. Entries compact as they are recorded, so a sequence of
//! operations that cancels out leaves no trace.

use std::sync::Arc;

use indexmap::IndexMap;
use wsmodel_foundation::EntityId;

use crate::record::EntityRecord;

/// Net change of one entity relative to the base snapshot.
#[derive(Clone, Debug)]
pub enum ChangeEntry {
    /// Did not exist in the base; current record lives in the builder.
    Added,
    /// Existed in the base and has been removed.
    Removed {
        /// The base record.
        original: Arc<EntityRecord>,
    },
    /// Existed in the base and now has a different record.
    Replaced {
        /// The base record.
        original: Arc<EntityRecord>,
    },
}

/// Insertion-ordered change log of a builder.
#[derive(Clone, Debug, Default)]
pub struct ChangeLog {
    entries: IndexMap<EntityId, ChangeEntry>,
}

impl ChangeLog {
    /// Returns true if the log holds no net changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of changed entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns the entry for one entity.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&ChangeEntry> {
        self.entries.get(&id)
    }

    /// Iterates entries in the order entities were first touched.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &ChangeEntry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    pub(crate) fn record_add(&mut self, id: EntityId) {
        self.entries.insert(id, ChangeEntry::Added);
    }

    /// `previous` is the record being overwritten; `current` the new one.
    pub(crate) fn record_replace(
        &mut self,
        id: EntityId,
        previous: &Arc<EntityRecord>,
        current: &EntityRecord,
    ) {
        match self.entries.get(&id) {
            Some(ChangeEntry::Added) => {}
            Some(ChangeEntry::Replaced { original }) => {
                if **original == *current {
                    self.entries.shift_remove(&id);
                }
            }
            Some(ChangeEntry::Removed { .. }) => {
                // Ids are never reused inside one builder without a new
                // generation, so a removed id cannot be replaced.
            }
            None => {
                if **previous != *current {
                    self.entries.insert(
                        id,
                        ChangeEntry::Replaced {
                            original: Arc::clone(previous),
                        },
                    );
                }
            }
        }
    }

    /// `previous` is the record being removed.
    pub(crate) fn record_remove(&mut self, id: EntityId, previous: &Arc<EntityRecord>) {
        match self.entries.get(&id) {
            Some(ChangeEntry::Added) => {
                self.entries.shift_remove(&id);
            }
            Some(ChangeEntry::Replaced { original }) => {
                let original = Arc::clone(original);
                self.entries.insert(id, ChangeEntry::Removed { original });
            }
            Some(ChangeEntry::Removed { .. }) => {}
            None => {
                self.entries.insert(
                    id,
                    ChangeEntry::Removed {
                        original: Arc::clone(previous),
                    },
                );
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
