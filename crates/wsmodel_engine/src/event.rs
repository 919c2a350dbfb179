//! Versioned storages and change events.

use std::fmt;
use std::sync::{Arc, OnceLock};

use wsmodel_storage::{ChangeSet, Storage, collect_changes};

/// A storage snapshot tagged with the model version that installed it.
#[derive(Clone, Debug)]
pub struct VersionedStorage {
    version: u64,
    storage: Storage,
}

impl VersionedStorage {
    /// Creates a versioned storage.
    #[must_use]
    pub fn new(version: u64, storage: Storage) -> Self {
        Self { version, storage }
    }

    /// The version number. Each commit increments it by one.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The snapshot.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}

/// A transition between two model versions.
///
/// The change list is computed on first access when the committer did not
/// supply it.
pub struct VersionedStorageChange {
    before: Arc<VersionedStorage>,
    after: Arc<VersionedStorage>,
    description: String,
    changes: OnceLock<ChangeSet>,
}

impl VersionedStorageChange {
    /// Creates an event whose changes are computed lazily.
    #[must_use]
    pub fn new(
        before: Arc<VersionedStorage>,
        after: Arc<VersionedStorage>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            before,
            after,
            description: description.into(),
            changes: OnceLock::new(),
        }
    }

    /// Creates an event with a precomputed change list.
    #[must_use]
    pub fn with_changes(
        before: Arc<VersionedStorage>,
        after: Arc<VersionedStorage>,
        description: impl Into<String>,
        changes: ChangeSet,
    ) -> Self {
        let event = Self::new(before, after, description);
        let _ = event.changes.set(changes);
        event
    }

    /// The state before the transition.
    #[must_use]
    pub fn before(&self) -> &Arc<VersionedStorage> {
        &self.before
    }

    /// The state after the transition.
    #[must_use]
    pub fn after(&self) -> &Arc<VersionedStorage> {
        &self.after
    }

    /// The update description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The structural changes between `before` and `after`.
    pub fn changes(&self) -> &ChangeSet {
        self.changes
            .get_or_init(|| collect_changes(self.before.storage(), self.after.storage()))
    }

    /// Merges this event with a later one into a single event spanning both.
    ///
    /// The merged change list is recomputed lazily from the outer snapshots.
    #[must_use]
    pub fn coalesce(&self, later: &VersionedStorageChange) -> VersionedStorageChange {
        let description = if self.description == later.description {
            later.description.clone()
        } else {
            format!("{}; {}", self.description, later.description)
        };
        Self::new(Arc::clone(&self.before), Arc::clone(&later.after), description)
    }
}

impl fmt::Debug for VersionedStorageChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionedStorageChange")
            .field("before", &self.before.version)
            .field("after", &self.after.version)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
