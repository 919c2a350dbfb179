//! Structural diffs between storages.
//!
//! A [`ChangeSet`] groups entity changes by kind, kinds in declaration order. Within
//! a kind, removals come first, then replacements, then additions. Snapshot diffs
//! order each group by entity index; builder change logs keep insertion order.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use wsmodel_foundation::{Entity, EntityId, EntityKind, Result};

use crate::changelog::{ChangeEntry, ChangeLog};
use crate::record::EntityRef;
use crate::storage::Storage;

// =============================================================================
// Change types
// =============================================================================

/// One entity's change between two storages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityChange {
    /// The entity exists only in the newer storage.
    Added(EntityRef),
    /// The entity exists only in the older storage.
    Removed(EntityRef),
    /// The entity exists in both with different records.
    Replaced {
        /// The older record.
        old: EntityRef,
        /// The newer record.
        new: EntityRef,
    },
}

impl EntityChange {
    /// The changed entity's id.
    #[must_use]
    pub fn id(&self) -> EntityId {
        match self {
            EntityChange::Added(entity) | EntityChange::Removed(entity) => entity.id(),
            EntityChange::Replaced { new, .. } => new.id(),
        }
    }

    /// The changed entity's kind.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.id().kind
    }

    /// The entity as it was before the change.
    #[must_use]
    pub fn before(&self) -> Option<&EntityRef> {
        match self {
            EntityChange::Added(_) => None,
            EntityChange::Removed(old) | EntityChange::Replaced { old, .. } => Some(old),
        }
    }

    /// The entity as it is after the change.
    #[must_use]
    pub fn after(&self) -> Option<&EntityRef> {
        match self {
            EntityChange::Removed(_) => None,
            EntityChange::Added(new) | EntityChange::Replaced { new, .. } => Some(new),
        }
    }
}

/// Counts of changes by type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    /// Added entities.
    pub added: usize,
    /// Removed entities.
    pub removed: usize,
    /// Replaced entities.
    pub replaced: usize,
}

impl fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "+{} -{} ~{}",
            self.added, self.removed, self.replaced
        )
    }
}

// =============================================================================
// ChangeSet
// =============================================================================

/// Changes grouped by entity kind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: BTreeMap<EntityKind, Vec<EntityChange>>,
}

/// Per-kind change groups, before concatenation.
#[derive(Default)]
struct KindGroups {
    removed: Vec<EntityChange>,
    replaced: Vec<EntityChange>,
    added: Vec<EntityChange>,
}

impl KindGroups {
    fn push(&mut self, change: EntityChange) {
        match change {
            EntityChange::Removed(_) => self.removed.push(change),
            EntityChange::Replaced { .. } => self.replaced.push(change),
            EntityChange::Added(_) => self.added.push(change),
        }
    }

    fn into_vec(self) -> Vec<EntityChange> {
        let mut all = self.removed;
        all.extend(self.replaced);
        all.extend(self.added);
        all
    }
}

impl ChangeSet {
    fn from_groups(groups: [KindGroups; EntityKind::COUNT]) -> Self {
        let changes = EntityKind::ALL
            .into_iter()
            .zip(groups)
            .map(|(kind, group)| (kind, group.into_vec()))
            .filter(|(_, changes)| !changes.is_empty())
            .collect();
        Self { changes }
    }

    /// Builds a change set from a builder's change log.
    pub(crate) fn from_changelog(log: &ChangeLog, current: &Storage) -> Self {
        let mut groups: [KindGroups; EntityKind::COUNT] = Default::default();
        for (id, entry) in log.iter() {
            let change = match entry {
                ChangeEntry::Added => match current.entity(id) {
                    Some(new) => EntityChange::Added(new),
                    None => continue,
                },
                ChangeEntry::Removed { original } => {
                    EntityChange::Removed(EntityRef::new(id, Arc::clone(original)))
                }
                ChangeEntry::Replaced { original } => match current.entity(id) {
                    Some(new) => EntityChange::Replaced {
                        old: EntityRef::new(id, Arc::clone(original)),
                        new,
                    },
                    None => continue,
                },
            };
            groups[id.kind.ordinal()].push(change);
        }
        Self::from_groups(groups)
    }

    /// Returns true if there are no changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns the total number of changed entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.values().map(Vec::len).sum()
    }

    /// Returns the changes of one kind.
    #[must_use]
    pub fn get(&self, kind: EntityKind) -> &[EntityChange] {
        self.changes.get(&kind).map_or(&[], Vec::as_slice)
    }

    /// Returns the changes of one typed kind.
    #[must_use]
    pub fn of<T: Entity>(&self) -> &[EntityChange] {
        self.get(T::KIND)
    }

    /// Returns true if any entity of `kind` changed.
    #[must_use]
    pub fn touches(&self, kind: EntityKind) -> bool {
        self.changes.contains_key(&kind)
    }

    /// Iterates the kinds with changes, in declaration order.
    pub fn kinds(&self) -> impl Iterator<Item = EntityKind> + '_ {
        self.changes.keys().copied()
    }

    /// Iterates every change, kinds in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &EntityChange> {
        self.changes.values().flatten()
    }

    /// Counts changes by type.
    #[must_use]
    pub fn summary(&self) -> ChangeSummary {
        let mut summary = ChangeSummary::default();
        for change in self.iter() {
            match change {
                EntityChange::Added(_) => summary.added += 1,
                EntityChange::Removed(_) => summary.removed += 1,
                EntityChange::Replaced { .. } => summary.replaced += 1,
            }
        }
        summary
    }

    /// Applies this change set to `base`, producing the newer storage.
    ///
    /// Replaying `collect_changes(a, b)` against `a` reproduces `b`.
    ///
    /// # Errors
    ///
    /// Returns an error if the change set does not fit `base`: a removed or
    /// replaced entity is missing, or an added entity's slot is occupied.
    pub fn replay(&self, base: &Storage) -> Result<Storage> {
        let mut builder = base.to_builder();
        // Removals first, so additions can reclaim freed slots
        for change in self.iter() {
            if let EntityChange::Removed(old) = change {
                builder.remove_record(old.id())?;
            }
        }
        for change in self.iter() {
            match change {
                EntityChange::Removed(_) => {}
                EntityChange::Replaced { new, .. } => {
                    builder.put_record(new.id(), new.record().clone())?;
                }
                EntityChange::Added(new) => {
                    builder.insert_record_at(new.id(), new.record().clone())?;
                }
            }
        }
        Ok(builder.to_snapshot())
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a EntityChange;
    type IntoIter = Box<dyn Iterator<Item = &'a EntityChange> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

// =============================================================================
// Snapshot diff
// =============================================================================

/// Computes the changes that turn `old` into `new`.
///
/// Both storages must share a lineage (one derived from the other through
/// builders), since entities are matched by id. Records shared between the two
/// snapshots are skipped without comparing contents.
#[must_use]
pub fn collect_changes(old: &Storage, new: &Storage) -> ChangeSet {
    let mut groups: [KindGroups; EntityKind::COUNT] = Default::default();

    for kind in EntityKind::ALL {
        let (before, after) = (old.table(kind), new.table(kind));
        if before.ptr_eq(after) {
            continue;
        }
        let group = &mut groups[kind.ordinal()];
        let slots = before.slot_count().max(after.slot_count());
        for index in 0..slots {
            match (before.live_at(index), after.live_at(index)) {
                (None, None) => {}
                (Some((id, record)), None) => {
                    group.push(EntityChange::Removed(EntityRef::new(id, Arc::clone(record))));
                }
                (None, Some((id, record))) => {
                    group.push(EntityChange::Added(EntityRef::new(id, Arc::clone(record))));
                }
                (Some((old_id, old_record)), Some((new_id, new_record))) => {
                    if old_id != new_id {
                        group.push(EntityChange::Removed(EntityRef::new(
                            old_id,
                            Arc::clone(old_record),
                        )));
                        group.push(EntityChange::Added(EntityRef::new(
                            new_id,
                            Arc::clone(new_record),
                        )));
                    } else if !Arc::ptr_eq(old_record, new_record) && old_record != new_record {
                        group.push(EntityChange::Replaced {
                            old: EntityRef::new(old_id, Arc::clone(old_record)),
                            new: EntityRef::new(new_id, Arc::clone(new_record)),
                        });
                    }
                }
            }
        }
    }

    ChangeSet::from_groups(groups)
}

/// Formats a change set, listing at most `max_entities` changes per kind.
#[must_use]
pub fn format_changes(changes: &ChangeSet, max_entities: usize) -> String {
    use std::fmt::Write;
    let mut output = String::new();

    if changes.is_empty() {
        return "No changes".to_string();
    }

    for kind in changes.kinds() {
        let group = changes.get(kind);
        let _ = writeln!(output, "--- {kind} ({}) ---", group.len());
        for change in group.iter().take(max_entities) {
            let (marker, entity) = match change {
                EntityChange::Added(new) => ('+', new),
                EntityChange::Removed(old) => ('-', old),
                EntityChange::Replaced { new, .. } => ('~', new),
            };
            match entity.symbolic_id() {
                Some(symbolic) => {
                    let _ = writeln!(output, "  {marker} {} {symbolic}", entity.id());
                }
                None => {
                    let _ = writeln!(output, "  {marker} {}", entity.id());
                }
            }
        }
        if group.len() > max_entities {
            let _ = writeln!(output, "  ... and {} more", group.len() - max_entities);
        }
    }

    output.trim_end().to_string()
}
