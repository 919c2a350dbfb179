//! Entity sources: the provenance tag carried by every entity.

use std::fmt;
use std::mem;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Where an entity came from.
///
/// Sources scope reconciliation (`replace_by_source` only touches entities whose
/// source satisfies a predicate) and decide cache eligibility.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EntitySource {
    /// Loaded from a project file.
    File {
        /// URL of the backing file.
        url: String,
    },
    /// Produced by an importer or generator, identified by tag.
    Generated {
        /// Generator tag.
        tag: String,
    },
    /// Lives only in memory; never cached.
    NonPersistent,
    /// Placeholder parent created by the orphanage.
    Orphanage,
    /// Placeholder parent that only anchors children during reconciliation.
    DummyParent,
}

impl EntitySource {
    /// Creates a file source.
    #[must_use]
    pub fn file(url: impl Into<String>) -> Self {
        EntitySource::File { url: url.into() }
    }

    /// Creates a generated source.
    #[must_use]
    pub fn generated(tag: impl Into<String>) -> Self {
        EntitySource::Generated { tag: tag.into() }
    }

    /// Returns true if entities with this source may be written to the cache.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        matches!(
            self,
            EntitySource::File { .. } | EntitySource::Generated { .. }
        )
    }

    /// Returns true for [`EntitySource::DummyParent`].
    #[must_use]
    pub fn is_dummy_parent(&self) -> bool {
        matches!(self, EntitySource::DummyParent)
    }

    /// Returns the file URL for file sources.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            EntitySource::File { url } => Some(url),
            _ => None,
        }
    }

    /// Returns a mutable reference to the file URL for file sources.
    pub fn url_mut(&mut self) -> Option<&mut String> {
        match self {
            EntitySource::File { url } => Some(url),
            _ => None,
        }
    }

    /// Returns true if both sources are the same variant, ignoring payloads.
    #[must_use]
    pub fn same_variant(&self, other: &EntitySource) -> bool {
        mem::discriminant(self) == mem::discriminant(other)
    }
}

impl fmt::Display for EntitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntitySource::File { url } => write!(f, "file({url})"),
            EntitySource::Generated { tag } => write!(f, "generated({tag})"),
            EntitySource::NonPersistent => f.write_str("non-persistent"),
            EntitySource::Orphanage => f.write_str("orphanage"),
            EntitySource::DummyParent => f.write_str("dummy-parent"),
        }
    }
}
