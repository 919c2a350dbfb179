//! Copy-on-write builders.
//!
//! A `Builder` starts from a base snapshot and applies mutations to its own copy of
//! the storage. Because every table and index is persistent, each mutation rebuilds
//! only the touched record and index nodes. The change log tracks the net effect
//! relative to the base, so [`Builder::collect_changes`] is cheap and a sequence of
//! operations that cancels out yields no changes.

use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;
use wsmodel_foundation::{
    Entity, EntityData, EntityId, EntityKind, EntitySource, Error, ErrorKind, Result,
    SymbolicId,
};

use crate::changelog::ChangeLog;
use crate::diff::ChangeSet;
use crate::mapping::ExternalMappingKey;
use crate::record::EntityRecord;
use crate::schema::{self, Cardinality, ConnectionSchema, OnViolation};
use crate::storage::Storage;

/// Mutable overlay over a storage snapshot.
#[derive(Clone, Debug)]
pub struct Builder {
    base: Storage,
    current: Storage,
    changelog: ChangeLog,
    mappings_changed: bool,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    /// Creates a builder over an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::from_storage(&Storage::new())
    }

    pub(crate) fn from_storage(base: &Storage) -> Self {
        Self {
            base: base.clone(),
            current: base.clone(),
            changelog: ChangeLog::default(),
            mappings_changed: false,
        }
    }

    /// The snapshot this builder started from.
    #[must_use]
    pub fn base(&self) -> &Storage {
        &self.base
    }

    /// Read access to the builder's current state.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.current
    }

    /// The net change log relative to the base.
    #[must_use]
    pub fn changelog(&self) -> &ChangeLog {
        &self.changelog
    }

    /// Returns true if any entity differs from the base. External mappings are
    /// not part of an entity and do not count.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.changelog.is_empty()
    }

    /// Returns true if any external mapping was set or removed.
    #[must_use]
    pub fn has_mapping_changes(&self) -> bool {
        self.mappings_changed
    }

    /// Returns the structural changes relative to the base.
    #[must_use]
    pub fn collect_changes(&self) -> ChangeSet {
        ChangeSet::from_changelog(&self.changelog, &self.current)
    }

    /// Freezes the current state into a snapshot. The builder stays usable.
    #[must_use]
    pub fn to_snapshot(&self) -> Storage {
        self.current.clone()
    }

    /// Makes the current state the new base and forgets the change log.
    pub fn rebase(&mut self) {
        self.base = self.current.clone();
        self.changelog.clear();
        self.mappings_changed = false;
    }

    // =========================================================================
    // Entity operations
    // =========================================================================

    /// Adds a root entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the kind requires a parent or the symbolic id is taken.
    pub fn add_entity(
        &mut self,
        data: impl Into<EntityData>,
        source: EntitySource,
    ) -> Result<EntityId> {
        let data = data.into();
        let kind = data.kind();
        if schema::requires_parent(kind) {
            return Err(Error::new(ErrorKind::MissingParent(kind)));
        }
        self.check_unique(&data, None)?;

        let id = self.insert_record(EntityRecord::new(data, source));
        trace!(target: "wsmodel::storage", entity = %id, "added entity");
        Ok(id)
    }

    /// Adds an entity under a hard parent, appending it to the parent's children.
    ///
    /// Adding a second child to a to-one containment either fails or replaces the
    /// existing child, as the containment's schema dictates.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent does not exist, cannot contain this kind, or
    /// the symbolic id is taken.
    pub fn add_child(
        &mut self,
        parent: EntityId,
        data: impl Into<EntityData>,
        source: EntitySource,
    ) -> Result<EntityId> {
        let data = data.into();
        let parent_record = self.parent_record(parent)?;
        let connection = check_connection(parent, &parent_record, &data)?;
        self.check_unique(&data, None)?;
        self.make_room(parent, &parent_record, connection)?;

        let id = self.insert_record(EntityRecord::new(data, source).with_parent(parent));
        self.update_record(parent, |record| record.children.push_back(id))?;
        trace!(target: "wsmodel::storage", entity = %id, parent = %parent, "added child");
        Ok(id)
    }

    /// Applies `mutator` to a copy of an entity's payload and stores the result.
    ///
    /// If the symbolic id changes, every soft link to the old id is rewritten to
    /// the new one, transitively. A mutation that leaves the payload unchanged
    /// records nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity does not exist, the mutator changed the
    /// payload kind, or the new symbolic id (or one derived from it) is taken.
    /// The builder is unchanged on error.
    pub fn modify_entity(
        &mut self,
        id: EntityId,
        mutator: impl FnOnce(&mut EntityData),
    ) -> Result<EntityId> {
        let previous = Arc::clone(self.current.require(id)?);
        let mut data = previous.data.clone();
        mutator(&mut data);

        if data.kind() != id.kind {
            return Err(Error::new(ErrorKind::KindMismatch {
                expected: id.kind,
                actual: data.kind(),
            }));
        }
        if data == previous.data {
            return Ok(id);
        }
        if let Some(parent) = previous.parent {
            let parent_record = self.parent_record(parent)?;
            check_connection(parent, &parent_record, &data)?;
        }

        let old_symbolic = previous.data.symbolic_id();
        let new_symbolic = data.symbolic_id();
        let mut renames = Vec::new();
        if old_symbolic != new_symbolic {
            if let Some(symbolic) = &new_symbolic {
                self.check_unique_id(symbolic, Some(id))?;
            }
            if let (Some(old), Some(new)) = (old_symbolic, new_symbolic) {
                renames = self.plan_rename(id, old, new)?;
            }
        }

        self.update_record(id, |record| record.data = data)?;
        for (referrer, data) in renames {
            self.update_record(referrer, |record| record.data = data)?;
        }
        Ok(id)
    }

    /// Typed version of [`modify_entity`](Self::modify_entity).
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not of kind `T`, or as `modify_entity` does.
    pub fn modify<T: Entity>(
        &mut self,
        id: EntityId,
        mutator: impl FnOnce(&mut T),
    ) -> Result<EntityId> {
        if id.kind != T::KIND {
            return Err(Error::new(ErrorKind::KindMismatch {
                expected: T::KIND,
                actual: id.kind,
            }));
        }
        self.modify_entity(id, |data| {
            if let Some(inner) = T::from_data_mut(data) {
                mutator(inner);
            }
        })
    }

    /// Relabels an entity with a new source.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity does not exist.
    pub fn change_source(&mut self, id: EntityId, source: EntitySource) -> Result<()> {
        self.current.validate(id)?;
        self.update_record(id, |record| record.source = source)
    }

    /// Moves a child to another parent, appending it to the new parent's children.
    ///
    /// Facets follow their module: a moved facet's module reference is rewritten
    /// to the new parent.
    ///
    /// # Errors
    ///
    /// Returns an error if either entity does not exist, the new parent cannot
    /// contain the child, or a moved facet's new id is taken.
    pub fn move_child(&mut self, child: EntityId, new_parent: EntityId) -> Result<()> {
        let record = Arc::clone(self.current.require(child)?);
        if record.parent == Some(new_parent) {
            return Ok(());
        }
        let parent_record = self.parent_record(new_parent)?;

        let mut data = record.data.clone();
        if let (EntityData::Facet(facet), EntityData::Module(module)) =
            (&mut data, &parent_record.data)
        {
            facet.module = module.module_id();
        }
        let connection = check_connection(new_parent, &parent_record, &data)?;
        if data != record.data {
            if let Some(symbolic) = data.symbolic_id() {
                self.check_unique_id(&symbolic, Some(child))?;
            }
        }
        self.make_room(new_parent, &parent_record, connection)?;

        if let Some(old_parent) = record.parent {
            if self.current.contains(old_parent) {
                self.update_record(old_parent, |r| r.children.retain(|c| *c != child))?;
            }
        }
        self.update_record(child, |r| {
            r.parent = Some(new_parent);
            r.data = data;
        })?;
        self.update_record(new_parent, |r| r.children.push_back(child))?;
        trace!(target: "wsmodel::storage", entity = %child, parent = %new_parent, "moved child");
        Ok(())
    }

    /// Reorders the children of one kind. `order` must be a permutation of the
    /// parent's current children of that kind; children of other kinds keep their
    /// positions.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent does not exist or `order` is not a
    /// permutation of its children of `kind`.
    pub fn reorder_children(
        &mut self,
        parent: EntityId,
        kind: EntityKind,
        order: &[EntityId],
    ) -> Result<()> {
        let record = Arc::clone(self.current.require(parent)?);
        let mut existing: Vec<_> = record.children_of(kind).collect();
        let mut requested = order.to_vec();
        existing.sort_unstable();
        requested.sort_unstable();
        if existing != requested {
            return Err(Error::new(ErrorKind::InvalidChildOrder { parent, kind }));
        }

        let mut next = order.iter().copied();
        let children: im::Vector<EntityId> = record
            .children
            .iter()
            .map(|child| {
                if child.kind == kind {
                    next.next().unwrap_or(*child)
                } else {
                    *child
                }
            })
            .collect();
        self.update_record(parent, |r| r.children = children)
    }

    /// Removes an entity and, transitively, all of its hard children.
    ///
    /// Returns the number of removed entities. Soft links to removed entities are
    /// left dangling.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is stale or does not exist.
    pub fn remove_entity(&mut self, id: EntityId) -> Result<usize> {
        let record = Arc::clone(self.current.require(id)?);
        let subtree = self.current.subtree(id);

        if let Some(parent) = record.parent {
            if self.current.contains(parent) {
                self.update_record(parent, |r| r.children.retain(|c| *c != id))?;
            }
        }
        for entity in subtree.iter().rev() {
            self.remove_record(*entity)?;
        }
        trace!(target: "wsmodel::storage", entity = %id, removed = subtree.len(), "removed entity");
        Ok(subtree.len())
    }

    // =========================================================================
    // External mappings
    // =========================================================================

    /// Attaches a mapping value to an entity, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity does not exist.
    pub fn set_mapping<T: Any + Send + Sync>(
        &mut self,
        key: &ExternalMappingKey<T>,
        id: EntityId,
        value: T,
    ) -> Result<()> {
        self.current.validate(id)?;
        self.current.mappings_mut().insert(key, id, value);
        self.mappings_changed = true;
        Ok(())
    }

    /// Detaches a mapping value. Returns true if one was present.
    pub fn remove_mapping<T>(&mut self, key: &ExternalMappingKey<T>, id: EntityId) -> bool {
        let removed = self.current.mappings_mut().remove(key, id);
        self.mappings_changed |= removed;
        removed
    }

    /// Moves every mapping of `from` in `source` onto `to` in this builder,
    /// dropping `to`'s own mappings first.
    pub(crate) fn transfer_mappings(&mut self, source: &Storage, from: EntityId, to: EntityId) {
        let incoming = source.mappings().all_for(from);
        let existing = self.current.mappings().all_for(to);
        if incoming.is_empty() && existing.is_empty() {
            return;
        }
        let mappings = self.current.mappings_mut();
        mappings.entity_removed(to);
        for (name, value) in incoming {
            mappings.insert_raw(name, to, value);
        }
        self.mappings_changed = true;
    }

    // =========================================================================
    // Validation helpers
    // =========================================================================

    fn parent_record(&self, parent: EntityId) -> Result<Arc<EntityRecord>> {
        self.current
            .record(parent)
            .cloned()
            .ok_or_else(|| Error::dangling_parent(parent))
    }

    fn check_unique(&self, data: &EntityData, except: Option<EntityId>) -> Result<()> {
        match data.symbolic_id() {
            Some(symbolic) => self.check_unique_id(&symbolic, except),
            None => Ok(()),
        }
    }

    fn check_unique_id(&self, symbolic: &SymbolicId, except: Option<EntityId>) -> Result<()> {
        match self.current.resolve_id(symbolic) {
            Some(existing) if Some(existing) != except => {
                Err(Error::duplicate_symbolic_id(symbolic.clone(), existing))
            }
            _ => Ok(()),
        }
    }

    /// Enforces to-one cardinality before a child is attached to `parent`.
    fn make_room(
        &mut self,
        parent: EntityId,
        parent_record: &EntityRecord,
        connection: &ConnectionSchema,
    ) -> Result<()> {
        if connection.cardinality != Cardinality::OneToOne {
            return Ok(());
        }
        let Some(existing) = parent_record.children_of(connection.child).next() else {
            return Ok(());
        };
        match connection.on_violation {
            OnViolation::Error => Err(Error::new(ErrorKind::CardinalityViolation {
                parent,
                child: connection.child,
            })),
            OnViolation::Replace => self.remove_entity(existing).map(|_| ()),
        }
    }

    /// Computes the payload rewrites needed to follow a symbolic id rename,
    /// following renames that cascade through referrers' own ids.
    fn plan_rename(
        &self,
        renamed: EntityId,
        old: SymbolicId,
        new: SymbolicId,
    ) -> Result<Vec<(EntityId, EntityData)>> {
        let mut planned: IndexMap<EntityId, EntityData> = IndexMap::new();
        let mut claimed: HashMap<SymbolicId, EntityId> = HashMap::new();
        let mut released: HashSet<SymbolicId> = HashSet::new();
        claimed.insert(new.clone(), renamed);
        released.insert(old.clone());

        let mut queue = VecDeque::from([(old, new)]);
        while let Some((old, new)) = queue.pop_front() {
            let referrers: Vec<_> = self.current.indexes().referrers(&old).collect();
            for referrer in referrers {
                if referrer == renamed {
                    continue;
                }
                let Some(mut data) = planned
                    .get(&referrer)
                    .cloned()
                    .or_else(|| self.current.record(referrer).map(|r| r.data.clone()))
                else {
                    continue;
                };
                let before = data.symbolic_id();
                if !data.update_soft_link(&old, &new) {
                    continue;
                }
                let after = data.symbolic_id();
                if before != after {
                    if let Some(next) = &after {
                        if let Some(owner) = claimed.get(next) {
                            if *owner != referrer {
                                return Err(Error::duplicate_symbolic_id(next.clone(), *owner));
                            }
                        }
                        if let Some(owner) = self.current.resolve_id(next) {
                            if owner != referrer && !released.contains(next) {
                                return Err(Error::duplicate_symbolic_id(next.clone(), owner));
                            }
                        }
                        claimed.insert(next.clone(), referrer);
                    }
                    if let (Some(prev), Some(next)) = (before, after) {
                        released.insert(prev.clone());
                        queue.push_back((prev, next));
                    }
                }
                planned.insert(referrer, data);
            }
        }
        Ok(planned.into_iter().collect())
    }

    // =========================================================================
    // Record primitives; every mutation funnels through these
    // =========================================================================

    pub(crate) fn insert_record(&mut self, record: EntityRecord) -> EntityId {
        let record = Arc::new(record);
        let (table, indexes, _) = self.current.parts_mut(record.kind());
        let id = table.insert(Arc::clone(&record));
        indexes.entity_added(id, &record);
        self.changelog.record_add(id);
        id
    }

    pub(crate) fn update_record(
        &mut self,
        id: EntityId,
        update: impl FnOnce(&mut EntityRecord),
    ) -> Result<()> {
        let previous = Arc::clone(self.current.require(id)?);
        let mut record = (*previous).clone();
        update(&mut record);
        if record == *previous {
            return Ok(());
        }
        self.put_record(id, record)
    }

    pub(crate) fn put_record(&mut self, id: EntityId, record: EntityRecord) -> Result<()> {
        let record = Arc::new(record);
        let (table, indexes, _) = self.current.parts_mut(id.kind);
        let previous = table.replace(id, Arc::clone(&record))?;
        indexes.entity_replaced(id, &previous, &record);
        self.changelog.record_replace(id, &previous, &record);
        Ok(())
    }

    pub(crate) fn insert_record_at(&mut self, id: EntityId, record: EntityRecord) -> Result<()> {
        let record = Arc::new(record);
        let (table, indexes, _) = self.current.parts_mut(id.kind);
        table.insert_at(id, Arc::clone(&record))?;
        indexes.entity_added(id, &record);
        self.changelog.record_add(id);
        Ok(())
    }

    pub(crate) fn remove_record(&mut self, id: EntityId) -> Result<Arc<EntityRecord>> {
        let (table, indexes, mappings) = self.current.parts_mut(id.kind);
        let previous = table.remove(id)?;
        indexes.entity_removed(id, &previous);
        mappings.entity_removed(id);
        self.changelog.record_remove(id, &previous);
        Ok(previous)
    }
}

/// Checks that `parent` may contain `data`, returning the containment schema.
fn check_connection(
    parent: EntityId,
    parent_record: &EntityRecord,
    data: &EntityData,
) -> Result<&'static ConnectionSchema> {
    let connection = schema::connection(parent.kind, data.kind())
        .ok_or_else(|| Error::invalid_parent(parent.kind, data.kind()))?;
    if let (EntityData::Facet(facet), EntityData::Module(module)) = (data, &parent_record.data) {
        if facet.module.name() != module.name {
            return Err(Error::inconsistent(format!(
                "facet '{}' names module '{}' but belongs to '{}'",
                facet.name, facet.module, module.name
            )));
        }
    }
    Ok(connection)
}
