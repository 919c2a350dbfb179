//! Error types for the workspace model.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.

use std::fmt;

use thiserror::Error;

use crate::entity::{EntityId, EntityKind};
use crate::symbolic::SymbolicId;

/// The main error type for workspace model operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

/// Result alias used throughout the workspace model.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Creates an entity not found error.
    #[must_use]
    pub fn entity_not_found(id: EntityId) -> Self {
        Self::new(ErrorKind::EntityNotFound(id))
    }

    /// Creates a stale entity reference error.
    #[must_use]
    pub fn stale_entity(id: EntityId) -> Self {
        Self::new(ErrorKind::StaleEntity(id))
    }

    /// Creates a duplicate symbolic id error.
    #[must_use]
    pub fn duplicate_symbolic_id(id: SymbolicId, existing: EntityId) -> Self {
        Self::new(ErrorKind::DuplicateSymbolicId { id, existing })
    }

    /// Creates a dangling hard parent error.
    #[must_use]
    pub fn dangling_parent(parent: EntityId) -> Self {
        Self::new(ErrorKind::DanglingParent(parent))
    }

    /// Creates an invalid parent kind error.
    #[must_use]
    pub fn invalid_parent(parent: EntityKind, child: EntityKind) -> Self {
        Self::new(ErrorKind::InvalidParent { parent, child })
    }

    /// Creates an inconsistent storage error.
    #[must_use]
    pub fn inconsistent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InconsistentStorage(message.into()))
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(message.into()))
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Entity was not found in storage.
    #[error("entity not found: {0:?}")]
    EntityNotFound(EntityId),

    /// Entity reference is stale (generation mismatch).
    #[error("stale entity reference: {0:?}")]
    StaleEntity(EntityId),

    /// Another entity of the same kind already has this symbolic id.
    #[error("duplicate symbolic id {id}: already used by {existing:?}")]
    DuplicateSymbolicId {
        /// The conflicting id.
        id: SymbolicId,
        /// The entity that already owns it.
        existing: EntityId,
    },

    /// A hard parent reference points at an entity that does not exist.
    #[error("dangling parent reference: {0:?}")]
    DanglingParent(EntityId),

    /// An entity of a kind that requires a parent was added without one.
    #[error("{0} entities must be added under a parent")]
    MissingParent(EntityKind),

    /// The parent kind cannot contain the child kind.
    #[error("{parent} cannot contain {child}")]
    InvalidParent {
        /// Kind of the would-be parent.
        parent: EntityKind,
        /// Kind of the child.
        child: EntityKind,
    },

    /// A to-one containment already has a child and rejects another.
    #[error("{parent:?} already has a {child}")]
    CardinalityViolation {
        /// The parent entity.
        parent: EntityId,
        /// Kind of the rejected child.
        child: EntityKind,
    },

    /// A mutator or typed accessor produced a payload of the wrong kind.
    #[error("kind mismatch: expected {expected}, got {actual}")]
    KindMismatch {
        /// Kind of the entity.
        expected: EntityKind,
        /// Kind that was produced.
        actual: EntityKind,
    },

    /// The children passed to a reorder are not a permutation of the existing ones.
    #[error("invalid {kind} child order for {parent:?}")]
    InvalidChildOrder {
        /// The parent entity.
        parent: EntityId,
        /// Kind of the reordered children.
        kind: EntityKind,
    },

    /// An update was started from inside another update on the same thread.
    #[error(
        "re-entrant update '{description}' inside in-flight update '{in_flight}' at version {version}"
    )]
    ReentrantUpdate {
        /// Description of the rejected update.
        description: String,
        /// Description of the update already in flight.
        in_flight: String,
        /// Version the in-flight update started from.
        version: u64,
    },

    /// Storage failed a consistency check.
    #[error("inconsistent storage: {0}")]
    InconsistentStorage(String),

    /// A relativizer base path is unusable.
    #[error("invalid base path '{path}': {reason}")]
    InvalidBasePath {
        /// The rejected path.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// File system failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Description of the update that failed.
    pub description: Option<String>,
    /// Model version the failure was observed at.
    pub version: Option<u64>,
    /// Stack of operations leading to the error, outermost first.
    pub stack: Vec<String>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the update description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the model version.
    #[must_use]
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// Adds a stack frame.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.stack.push(frame.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(description) = &self.description {
            write!(f, "in '{description}'")?;
            if let Some(version) = self.version {
                write!(f, " at version {version}")?;
            }
        }
        if !self.stack.is_empty() {
            writeln!(f)?;
            for frame in &self.stack {
                writeln!(f, "  in {frame}")?;
            }
        }
        Ok(())
    }
}
