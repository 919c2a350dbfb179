//! Declarative queries over one entity kind.
//!
//! A [`Query`] is a small pipeline: a source kind followed by `filter`, `map`, and
//! `flat_map` stages. Because every element of the result derives from exactly
//! one entity, results can be maintained incrementally per entity (see
//! [`flow`](crate::flow)).

use std::fmt;
use std::sync::Arc;

use wsmodel_foundation::{Entity, EntityKind};
use wsmodel_storage::{EntityRef, Storage};

type Extract<T> = dyn Fn(&EntityRef) -> Vec<T> + Send + Sync;

/// A query pipeline producing values of type `T`.
pub struct Query<T> {
    kind: EntityKind,
    extract: Arc<Extract<T>>,
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            extract: Arc::clone(&self.extract),
        }
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query").field("kind", &self.kind).finish_non_exhaustive()
    }
}

impl<E: Entity> Query<E> {
    /// Queries every entity of kind `E`, yielding typed payloads.
    #[must_use]
    pub fn entities() -> Self {
        Self {
            kind: E::KIND,
            extract: Arc::new(|entity: &EntityRef| entity.get::<E>().cloned().into_iter().collect()),
        }
    }
}

impl Query<EntityRef> {
    /// Queries every entity of `kind`, yielding entity references.
    #[must_use]
    pub fn refs(kind: EntityKind) -> Self {
        Self {
            kind,
            extract: Arc::new(|entity: &EntityRef| vec![entity.clone()]),
        }
    }
}

impl<T: Send + Sync + 'static> Query<T> {
    /// The entity kind this query reads.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Keeps only values satisfying `pred`.
    #[must_use]
    pub fn filter(self, pred: impl Fn(&T) -> bool + Send + Sync + 'static) -> Query<T> {
        let inner = self.extract;
        Query {
            kind: self.kind,
            extract: Arc::new(move |entity: &EntityRef| {
                let mut values = inner(entity);
                values.retain(|value| pred(value));
                values
            }),
        }
    }

    /// Transforms each value.
    #[must_use]
    pub fn map<U: Send + Sync + 'static>(
        self,
        f: impl Fn(T) -> U + Send + Sync + 'static,
    ) -> Query<U> {
        let inner = self.extract;
        Query {
            kind: self.kind,
            extract: Arc::new(move |entity: &EntityRef| inner(entity).into_iter().map(&f).collect()),
        }
    }

    /// Transforms each value into any number of values.
    #[must_use]
    pub fn flat_map<U, I>(self, f: impl Fn(T) -> I + Send + Sync + 'static) -> Query<U>
    where
        U: Send + Sync + 'static,
        I: IntoIterator<Item = U>,
    {
        let inner = self.extract;
        Query {
            kind: self.kind,
            extract: Arc::new(move |entity: &EntityRef| inner(entity).into_iter().flat_map(&f).collect()),
        }
    }

    /// Runs the query against a snapshot. Results follow entity index order.
    #[must_use]
    pub fn execute(&self, storage: &Storage) -> Vec<T> {
        storage
            .entities_of(self.kind)
            .flat_map(|entity| (self.extract)(&entity))
            .collect()
    }

    /// Runs the pipeline on one entity.
    pub(crate) fn values_of(&self, entity: &EntityRef) -> Vec<T> {
        if entity.kind() == self.kind {
            (self.extract)(entity)
        } else {
            Vec::new()
        }
    }
}
