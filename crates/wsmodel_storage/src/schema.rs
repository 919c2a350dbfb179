//! Hard-reference schema.
//!
//! Defines which entity kinds may contain which, with what cardinality, and what
//! happens when a to-one containment is violated. Every containment cascades on
//! parent removal.

use wsmodel_foundation::EntityKind;

/// Cardinality of a parent-to-child containment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cardinality {
    /// A parent holds at most one child of this kind.
    OneToOne,
    /// A parent holds an ordered list of children of this kind.
    OneToMany,
}

/// Behavior when adding a child would violate cardinality.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnViolation {
    /// Return an error.
    Error,
    /// Remove the existing child (with its subtree) and add the new one.
    Replace,
}

/// Schema for one hard containment edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionSchema {
    /// Containing kind.
    pub parent: EntityKind,
    /// Contained kind.
    pub child: EntityKind,
    /// Cardinality constraint.
    pub cardinality: Cardinality,
    /// What happens when cardinality would be violated.
    pub on_violation: OnViolation,
}

impl ConnectionSchema {
    /// Creates a one-to-many containment.
    #[must_use]
    pub const fn new(parent: EntityKind, child: EntityKind) -> Self {
        Self {
            parent,
            child,
            cardinality: Cardinality::OneToMany,
            on_violation: OnViolation::Error,
        }
    }

    /// Sets the cardinality.
    #[must_use]
    pub const fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    /// Sets the violation behavior.
    #[must_use]
    pub const fn with_on_violation(mut self, on_violation: OnViolation) -> Self {
        self.on_violation = on_violation;
        self
    }
}

/// Every hard containment in the model.
pub const CONNECTIONS: [ConnectionSchema; 4] = [
    ConnectionSchema::new(EntityKind::Module, EntityKind::ModuleOptions)
        .with_cardinality(Cardinality::OneToOne)
        .with_on_violation(OnViolation::Replace),
    ConnectionSchema::new(EntityKind::Module, EntityKind::ContentRoot),
    ConnectionSchema::new(EntityKind::ContentRoot, EntityKind::SourceRoot),
    ConnectionSchema::new(EntityKind::Module, EntityKind::Facet),
];

/// Returns the schema for a parent/child kind pair.
#[must_use]
pub fn connection(parent: EntityKind, child: EntityKind) -> Option<&'static ConnectionSchema> {
    CONNECTIONS
        .iter()
        .find(|c| c.parent == parent && c.child == child)
}

/// Returns the kind that must contain `child`, if it is a contained kind.
#[must_use]
pub fn parent_kind(child: EntityKind) -> Option<EntityKind> {
    CONNECTIONS.iter().find(|c| c.child == child).map(|c| c.parent)
}

/// Returns true if `kind` can only exist under a hard parent.
#[must_use]
pub fn requires_parent(kind: EntityKind) -> bool {
    parent_kind(kind).is_some()
}

/// Returns the kinds `parent` may contain, in declaration order.
pub fn child_kinds(parent: EntityKind) -> impl Iterator<Item = EntityKind> {
    CONNECTIONS
        .iter()
        .filter(move |c| c.parent == parent)
        .map(|c| c.child)
}
