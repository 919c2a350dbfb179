//! Immutable storage snapshots.
//!
//! A `Storage` holds one [`EntityTable`] per kind plus the secondary indexes and
//! external mappings. Every field is a persistent collection, so cloning a storage
//! is O(1) and snapshots can be shared freely across threads.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use wsmodel_foundation::{
    Entity, EntityId, EntityKind, EntitySource, Error, ErrorKind, Result, SymbolicId,
};

use crate::builder::Builder;
use crate::indexes::StorageIndexes;
use crate::mapping::{ExternalMappingKey, ExternalMappings};
use crate::record::{EntityRecord, EntityRef};
use crate::table::EntityTable;

/// An immutable snapshot of the entity graph.
#[derive(Clone)]
pub struct Storage {
    tables: [EntityTable; EntityKind::COUNT],
    indexes: StorageIndexes,
    mappings: ExternalMappings,
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: EntityKind::ALL.map(EntityTable::new),
            indexes: StorageIndexes::default(),
            mappings: ExternalMappings::default(),
        }
    }

    /// Creates a builder whose base is this snapshot.
    #[must_use]
    pub fn to_builder(&self) -> Builder {
        Builder::from_storage(self)
    }

    // =========================================================================
    // Entity access
    // =========================================================================

    /// Returns a handle to a live entity.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<EntityRef> {
        self.record(id)
            .map(|record| EntityRef::new(id, Arc::clone(record)))
    }

    /// Returns the typed payload of a live entity.
    #[must_use]
    pub fn get<T: Entity>(&self, id: EntityId) -> Option<&T> {
        self.record(id).and_then(|record| T::from_data(&record.data))
    }

    /// Returns the source of a live entity.
    #[must_use]
    pub fn source(&self, id: EntityId) -> Option<&EntitySource> {
        self.record(id).map(|record| &record.source)
    }

    /// Checks if an entity exists and is not stale.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.table(id.kind).exists(id)
    }

    /// Validates that an entity is live.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is stale or never existed.
    pub fn validate(&self, id: EntityId) -> Result<()> {
        self.table(id.kind).validate(id)
    }

    /// Iterates typed payloads of one kind in ascending index order.
    pub fn entities<T: Entity>(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.table(T::KIND)
            .iter()
            .filter_map(|(id, record)| T::from_data(&record.data).map(|data| (id, data)))
    }

    /// Iterates entities of one kind in ascending index order.
    pub fn entities_of(&self, kind: EntityKind) -> impl Iterator<Item = EntityRef> + '_ {
        self.table(kind)
            .iter()
            .map(|(id, record)| EntityRef::new(id, Arc::clone(record)))
    }

    /// Iterates every entity, kinds in declaration order.
    pub fn all_entities(&self) -> impl Iterator<Item = EntityRef> + '_ {
        EntityKind::ALL
            .into_iter()
            .flat_map(move |kind| self.entities_of(kind))
    }

    /// Returns the number of live entities of one kind.
    #[must_use]
    pub fn entity_count(&self, kind: EntityKind) -> usize {
        self.table(kind).len()
    }

    /// Returns the number of live entities across all kinds.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.tables.iter().map(EntityTable::len).sum()
    }

    /// Returns true if the storage holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(EntityTable::is_empty)
    }

    // =========================================================================
    // Index lookups
    // =========================================================================

    /// Resolves a symbolic id to its entity.
    #[must_use]
    pub fn resolve(&self, id: &SymbolicId) -> Option<EntityRef> {
        self.resolve_id(id).and_then(|entity| self.entity(entity))
    }

    /// Resolves a symbolic id to its entity id.
    #[must_use]
    pub fn resolve_id(&self, id: &SymbolicId) -> Option<EntityId> {
        self.indexes.symbolic(id)
    }

    /// Iterates entities of `kind` holding a soft link to `target`, in id order.
    pub fn referrers<'a>(
        &'a self,
        target: &SymbolicId,
        kind: EntityKind,
    ) -> impl Iterator<Item = EntityRef> + use<'a> {
        let ids: Vec<_> = self
            .indexes
            .referrers(target)
            .filter(|id| id.kind == kind)
            .collect();
        ids.into_iter().filter_map(move |id| self.entity(id))
    }

    /// Iterates entities whose source satisfies `pred`, ordered by source then id.
    pub fn entities_by_source<'a>(
        &'a self,
        pred: impl Fn(&EntitySource) -> bool + 'a,
    ) -> impl Iterator<Item = EntityRef> + 'a {
        self.indexes
            .with_source(pred)
            .filter_map(move |id| self.entity(id))
    }

    // =========================================================================
    // Containment
    // =========================================================================

    /// Returns the hard parent of an entity.
    #[must_use]
    pub fn parent(&self, id: EntityId) -> Option<EntityRef> {
        self.record(id)
            .and_then(|record| record.parent)
            .and_then(|parent| self.entity(parent))
    }

    /// Iterates the hard children of one kind, in order.
    pub fn children(
        &self,
        id: EntityId,
        kind: EntityKind,
    ) -> impl Iterator<Item = EntityRef> + '_ {
        self.record(id)
            .into_iter()
            .flat_map(move |record| record.children_of(kind).collect::<Vec<_>>())
            .filter_map(move |child| self.entity(child))
    }

    /// Collects an entity and its transitive children, parents before children.
    #[must_use]
    pub fn subtree(&self, id: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(record) = self.record(next) {
                out.push(next);
                stack.extend(record.children.iter().rev().copied());
            }
        }
        out
    }

    // =========================================================================
    // External mappings
    // =========================================================================

    /// Returns the mapping of one entity in one table.
    #[must_use]
    pub fn mapping<T: Any + Send + Sync>(
        &self,
        key: &ExternalMappingKey<T>,
        id: EntityId,
    ) -> Option<&T> {
        self.mappings.get(key, id)
    }

    /// Returns all mapping tables.
    #[must_use]
    pub fn mappings(&self) -> &ExternalMappings {
        &self.mappings
    }

    // =========================================================================
    // Comparison
    // =========================================================================

    /// Returns true if both storages hold the same entities under the same ids.
    ///
    /// External mappings and free-list state are ignored.
    #[must_use]
    pub fn same_entities(&self, other: &Storage) -> bool {
        self.tables.iter().zip(&other.tables).all(|(a, b)| {
            a.ptr_eq(b)
                || (a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|((ia, ra), (ib, rb))| {
                        ia == ib && (Arc::ptr_eq(ra, rb) || ra == rb)
                    }))
        })
    }

    /// Returns the secondary indexes.
    #[must_use]
    pub fn indexes(&self) -> &StorageIndexes {
        &self.indexes
    }

    // =========================================================================
    // Crate-internal mutation, used by the builder
    // =========================================================================

    pub(crate) fn record(&self, id: EntityId) -> Option<&Arc<EntityRecord>> {
        self.table(id.kind).get(id)
    }

    pub(crate) fn require(&self, id: EntityId) -> Result<&Arc<EntityRecord>> {
        self.validate(id)?;
        self.record(id)
            .ok_or_else(|| Error::new(ErrorKind::EntityNotFound(id)))
    }

    pub(crate) fn table(&self, kind: EntityKind) -> &EntityTable {
        &self.tables[kind.ordinal()]
    }

    pub(crate) fn parts_mut(
        &mut self,
        kind: EntityKind,
    ) -> (&mut EntityTable, &mut StorageIndexes, &mut ExternalMappings) {
        (
            &mut self.tables[kind.ordinal()],
            &mut self.indexes,
            &mut self.mappings,
        )
    }

    pub(crate) fn mappings_mut(&mut self) -> &mut ExternalMappings {
        &mut self.mappings
    }
}

impl PartialEq for Storage {
    fn eq(&self, other: &Self) -> bool {
        self.same_entities(other)
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in EntityKind::ALL {
            map.entry(&kind, &self.entity_count(kind));
        }
        map.finish()
    }
}
