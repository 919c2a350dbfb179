//! Entity kinds and generational entity identifiers.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The closed set of entity kinds stored in a workspace model.
///
/// Declaration order is significant: change sets, index scans, and reconciliation
/// all visit kinds in this order, and every container kind precedes its children.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EntityKind {
    /// A project module.
    Module,
    /// Per-module compiler output options.
    ModuleOptions,
    /// A content root attached to a module.
    ContentRoot,
    /// A source root inside a content root.
    SourceRoot,
    /// A library in a project, application, or module table.
    Library,
    /// A facet attached to a module.
    Facet,
}

impl EntityKind {
    /// Number of entity kinds.
    pub const COUNT: usize = 6;

    /// All entity kinds, in declaration order.
    pub const ALL: [EntityKind; Self::COUNT] = [
        EntityKind::Module,
        EntityKind::ModuleOptions,
        EntityKind::ContentRoot,
        EntityKind::SourceRoot,
        EntityKind::Library,
        EntityKind::Facet,
    ];

    /// Returns the position of this kind in declaration order.
    #[must_use]
    pub const fn ordinal(self) -> usize {
        self as usize
    }

    /// Returns the kind's display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            EntityKind::Module => "Module",
            EntityKind::ModuleOptions => "ModuleOptions",
            EntityKind::ContentRoot => "ContentRoot",
            EntityKind::SourceRoot => "SourceRoot",
            EntityKind::Library => "Library",
            EntityKind::Facet => "Facet",
        }
    }

    /// Returns true if entities of this kind carry a [`SymbolicId`](crate::SymbolicId).
    #[must_use]
    pub const fn is_keyed(self) -> bool {
        matches!(
            self,
            EntityKind::Module | EntityKind::Library | EntityKind::Facet
        )
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Entity identifier with generational index for stale reference detection.
///
/// Indices are dense per kind. The generation counter increments when an index is
/// reused after removal, so a handle to a removed entity never silently resolves to
/// its successor.
///
/// Ordering is by kind, then index, then generation.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityId {
    /// Kind of the entity; selects the table the index points into.
    pub kind: EntityKind,
    /// Index into the kind's entity table.
    pub index: u32,
    /// Generation counter for stale reference detection.
    pub generation: u32,
}

impl EntityId {
    /// Creates a new entity ID.
    #[must_use]
    pub const fn new(kind: EntityKind, index: u32, generation: u32) -> Self {
        Self {
            kind,
            index,
            generation,
        }
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EntityId({}#{}v{})",
            self.kind, self.index, self.generation
        )
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.index)
    }
}
