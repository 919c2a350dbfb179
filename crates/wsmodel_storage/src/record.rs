//! Stored entity records and shared handles to them.

use std::sync::Arc;

use wsmodel_foundation::{Entity, EntityData, EntityId, EntityKind, EntitySource, SymbolicId};

/// One stored entity: payload, provenance, and containment.
///
/// `children` is the denormalized, ordered list of hard children across all child
/// kinds. Adding or removing a child therefore replaces the parent record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityRecord {
    /// Provenance tag.
    pub source: EntitySource,
    /// Payload.
    pub data: EntityData,
    /// Hard parent, for contained kinds.
    pub parent: Option<EntityId>,
    /// Hard children, in order.
    pub children: im::Vector<EntityId>,
}

impl EntityRecord {
    /// Creates a parentless record without children.
    #[must_use]
    pub fn new(data: EntityData, source: EntitySource) -> Self {
        Self {
            source,
            data,
            parent: None,
            children: im::Vector::new(),
        }
    }

    /// Sets the hard parent.
    #[must_use]
    pub fn with_parent(mut self, parent: EntityId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Returns the payload kind.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.data.kind()
    }

    /// Iterates the children of one kind, in order.
    pub fn children_of(&self, kind: EntityKind) -> impl Iterator<Item = EntityId> + '_ {
        self.children.iter().copied().filter(move |c| c.kind == kind)
    }
}

/// A cheap handle to an entity inside one snapshot.
#[derive(Clone, Debug)]
pub struct EntityRef {
    id: EntityId,
    record: Arc<EntityRecord>,
}

impl EntityRef {
    pub(crate) fn new(id: EntityId, record: Arc<EntityRecord>) -> Self {
        Self { id, record }
    }

    /// The entity's id.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// The entity's kind.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.id.kind
    }

    /// The full record.
    #[must_use]
    pub fn record(&self) -> &EntityRecord {
        &self.record
    }

    /// The shared record.
    #[must_use]
    pub fn record_arc(&self) -> &Arc<EntityRecord> {
        &self.record
    }

    /// The entity's source.
    #[must_use]
    pub fn source(&self) -> &EntitySource {
        &self.record.source
    }

    /// The entity's payload.
    #[must_use]
    pub fn data(&self) -> &EntityData {
        &self.record.data
    }

    /// The entity's hard parent.
    #[must_use]
    pub fn parent(&self) -> Option<EntityId> {
        self.record.parent
    }

    /// The entity's hard children, in order.
    #[must_use]
    pub fn children(&self) -> &im::Vector<EntityId> {
        &self.record.children
    }

    /// The entity's symbolic id, for keyed kinds.
    #[must_use]
    pub fn symbolic_id(&self) -> Option<SymbolicId> {
        self.record.data.symbolic_id()
    }

    /// Typed access to the payload.
    #[must_use]
    pub fn get<T: Entity>(&self) -> Option<&T> {
        T::from_data(&self.record.data)
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && (Arc::ptr_eq(&self.record, &other.record) || self.record == other.record)
    }
}

impl Eq for EntityRef {}
