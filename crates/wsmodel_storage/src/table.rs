//! Per-kind entity tables with generational indices.
//!
//! An `EntityTable` allocates dense indices for one entity kind and tracks
//! generations to detect stale references to removed entities. Slots live in an
//! `im::Vector`, so cloning a table is O(1) and an edit only copies the touched path.

// Table lengths never exceed u32::MAX
#![allow(clippy::cast_possible_truncation)]

use std::sync::Arc;

use wsmodel_foundation::{EntityId, EntityKind, Error, ErrorKind, Result};

use crate::record::EntityRecord;

#[derive(Clone, Debug)]
struct Slot {
    /// Even generations are free, odd generations are alive.
    generation: u32,
    record: Option<Arc<EntityRecord>>,
}

/// Generational storage for the records of one entity kind.
///
/// Indices are allocated from a free list when available, otherwise appended.
/// Removing an entity bumps its slot's generation and frees the index.
#[derive(Clone, Debug)]
pub struct EntityTable {
    kind: EntityKind,
    slots: im::Vector<Slot>,
    free_list: im::Vector<u32>,
    live_count: usize,
}

impl EntityTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            slots: im::Vector::new(),
            free_list: im::Vector::new(),
            live_count: 0,
        }
    }

    /// The kind stored in this table.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Stores a record under a fresh id, reusing a freed index when possible.
    pub fn insert(&mut self, record: Arc<EntityRecord>) -> EntityId {
        self.live_count += 1;

        if let Some(index) = self.free_list.pop_back() {
            let slot = &mut self.slots[index as usize];
            // Was even/free, now odd/alive
            slot.generation += 1;
            slot.record = Some(record);
            EntityId::new(self.kind, index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push_back(Slot {
                generation: 1,
                record: Some(record),
            });
            EntityId::new(self.kind, index, 1)
        }
    }

    /// Stores a record under a given id.
    ///
    /// Used when replaying changes, where ids must match the source storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the id belongs to another kind, has a free (even)
    /// generation, or its slot is already occupied.
    pub fn insert_at(&mut self, id: EntityId, record: Arc<EntityRecord>) -> Result<()> {
        self.check_kind(id)?;
        if id.generation % 2 == 0 {
            return Err(Error::internal(format!(
                "cannot insert {id:?} with a free generation"
            )));
        }

        let idx = id.index as usize;
        while self.slots.len() <= idx {
            let index = self.slots.len() as u32;
            self.slots.push_back(Slot {
                generation: 0,
                record: None,
            });
            self.free_list.push_back(index);
        }

        if self.slots[idx].record.is_some() {
            return Err(Error::internal(format!("slot for {id:?} is occupied")));
        }

        if let Some(position) = self.free_list.iter().position(|&i| i == id.index) {
            self.free_list.remove(position);
        }
        self.slots[idx] = Slot {
            generation: id.generation,
            record: Some(record),
        };
        self.live_count += 1;
        Ok(())
    }

    /// Swaps the record of a live entity, returning the previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is stale or does not exist.
    pub fn replace(
        &mut self,
        id: EntityId,
        record: Arc<EntityRecord>,
    ) -> Result<Arc<EntityRecord>> {
        self.validate(id)?;
        let slot = &mut self.slots[id.index as usize];
        slot.record
            .replace(record)
            .ok_or_else(|| Error::entity_not_found(id))
    }

    /// Removes an entity, returning its record.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is stale or does not exist.
    pub fn remove(&mut self, id: EntityId) -> Result<Arc<EntityRecord>> {
        self.validate(id)?;

        let slot = &mut self.slots[id.index as usize];
        // Was odd/alive, now even/free
        slot.generation += 1;
        let record = slot.record.take().ok_or_else(|| Error::entity_not_found(id))?;
        self.free_list.push_back(id.index);
        self.live_count -= 1;

        Ok(record)
    }

    /// Returns the record of a live entity.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Arc<EntityRecord>> {
        if id.kind != self.kind {
            return None;
        }
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.record.as_ref())
    }

    /// Checks if an entity exists and is not stale.
    #[must_use]
    pub fn exists(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    /// Validates that an entity is live.
    ///
    /// # Errors
    ///
    /// Returns an error if the id belongs to another kind, is stale, or never existed.
    pub fn validate(&self, id: EntityId) -> Result<()> {
        self.check_kind(id)?;

        let Some(slot) = self.slots.get(id.index as usize) else {
            return Err(Error::entity_not_found(id));
        };

        if slot.generation != id.generation {
            // Removed and possibly reused
            return Err(Error::stale_entity(id));
        }

        if slot.generation % 2 == 0 {
            return Err(Error::entity_not_found(id));
        }

        Ok(())
    }

    fn check_kind(&self, id: EntityId) -> Result<()> {
        if id.kind == self.kind {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::KindMismatch {
                expected: self.kind,
                actual: id.kind,
            }))
        }
    }

    /// Returns the live entity at `index`, if any.
    #[must_use]
    pub fn live_at(&self, index: u32) -> Option<(EntityId, &Arc<EntityRecord>)> {
        let slot = self.slots.get(index as usize)?;
        let record = slot.record.as_ref()?;
        Some((EntityId::new(self.kind, index, slot.generation), record))
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live_count
    }

    /// Returns true if there are no live entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// Returns the number of allocated slots, live or free.
    #[must_use]
    pub fn slot_count(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Returns true if both tables share the same slot storage.
    #[must_use]
    pub fn ptr_eq(&self, other: &EntityTable) -> bool {
        self.slots.ptr_eq(&other.slots)
    }

    /// Iterates live entities in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Arc<EntityRecord>)> + '_ {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            slot.record
                .as_ref()
                .map(|record| (EntityId::new(self.kind, idx as u32, slot.generation), record))
        })
    }
}
