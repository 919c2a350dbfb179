//! External mappings: typed side tables attached to entities.
//!
//! A mapping associates an entity with an arbitrary host value (for example a UI
//! object or a build-system handle). Mappings are not part of an entity's identity,
//! are dropped when the entity is removed, and are never cached.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use wsmodel_foundation::EntityId;

/// Type-erased mapping value.
pub type MappingValue = Arc<dyn Any + Send + Sync>;

/// A string-named, type-qualified key for one mapping table.
pub struct ExternalMappingKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ExternalMappingKey<T> {
    /// Creates a key. Keys with the same name share a table.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// The table name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ExternalMappingKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ExternalMappingKey<T> {}

impl<T> fmt::Debug for ExternalMappingKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExternalMappingKey({})", self.name)
    }
}

/// All mapping tables of one storage.
#[derive(Clone, Default)]
pub struct ExternalMappings {
    tables: im::OrdMap<&'static str, im::HashMap<EntityId, MappingValue>>,
}

impl ExternalMappings {
    /// Returns the value mapped to `id`, if it has type `T`.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(
        &self,
        key: &ExternalMappingKey<T>,
        id: EntityId,
    ) -> Option<&T> {
        self.tables
            .get(key.name)
            .and_then(|table| table.get(&id))
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Returns every mapped entity of one table with its value, in id order.
    #[must_use]
    pub fn entries<T: Any + Send + Sync>(&self, key: &ExternalMappingKey<T>) -> Vec<(EntityId, &T)> {
        let mut entries: Vec<_> = self
            .tables
            .get(key.name)
            .into_iter()
            .flat_map(|table| table.iter())
            .filter_map(|(id, value)| value.downcast_ref::<T>().map(|v| (*id, v)))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }

    /// Returns true if no entity has any mapping.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.values().all(im::HashMap::is_empty)
    }

    pub(crate) fn insert<T: Any + Send + Sync>(
        &mut self,
        key: &ExternalMappingKey<T>,
        id: EntityId,
        value: T,
    ) {
        self.insert_raw(key.name, id, Arc::new(value));
    }

    pub(crate) fn insert_raw(&mut self, name: &'static str, id: EntityId, value: MappingValue) {
        self.tables.entry(name).or_default().insert(id, value);
    }

    pub(crate) fn remove<T>(&mut self, key: &ExternalMappingKey<T>, id: EntityId) -> bool {
        self.tables
            .get_mut(key.name)
            .is_some_and(|table| table.remove(&id).is_some())
    }

    /// Returns every mapping of one entity across tables.
    pub(crate) fn all_for(&self, id: EntityId) -> Vec<(&'static str, MappingValue)> {
        self.tables
            .iter()
            .filter_map(|(name, table)| table.get(&id).map(|value| (*name, Arc::clone(value))))
            .collect()
    }

    pub(crate) fn entity_removed(&mut self, id: EntityId) {
        let names: Vec<_> = self
            .tables
            .iter()
            .filter(|(_, table)| table.contains_key(&id))
            .map(|(name, _)| *name)
            .collect();
        for name in names {
            if let Some(table) = self.tables.get_mut(name) {
                table.remove(&id);
            }
        }
    }
}

impl fmt::Debug for ExternalMappings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.tables.iter().map(|(name, table)| (name, table.len())))
            .finish()
    }
}
