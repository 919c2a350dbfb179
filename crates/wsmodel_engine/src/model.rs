//! The versioned workspace model.
//!
//! A [`WorkspaceModel`] owns the current [`VersionedStorage`]. Readers load it
//! without locking. Writers go through one of two commit protocols:
//!
//! - [`WorkspaceModel::update_model`] holds the write lock for the whole mutation.
//! - [`WorkspaceModel::builder_snapshot`] hands out a builder that is populated
//!   off-lock, then committed with [`WorkspaceModel::replace_project_model`], which
//!   succeeds only if no other commit happened in between.
//!
//! Every commit adopts orphaned fragments, installs the new version with a pointer
//! swap, and notifies listeners and subscribers exactly once.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use arc_swap::ArcSwap;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};
use wsmodel_foundation::{Error, ErrorContext, ErrorKind, Result};
use wsmodel_storage::{Builder, ChangeSet, Storage};

use crate::bus::{ChangeBus, ChangeListener, ChangeSubscription, ListenerId};
use crate::config::ModelConfig;
use crate::event::{VersionedStorage, VersionedStorageChange};
use crate::orphanage::Orphanage;

// =============================================================================
// Optimistic commit types
// =============================================================================

/// A builder over a known model version, for optimistic commits.
#[derive(Debug)]
pub struct BuilderSnapshot {
    version: u64,
    builder: Builder,
}

impl BuilderSnapshot {
    /// The version the builder started from.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Read access to the builder.
    #[must_use]
    pub fn builder(&self) -> &Builder {
        &self.builder
    }

    /// Write access to the builder.
    pub fn builder_mut(&mut self) -> &mut Builder {
        &mut self.builder
    }

    /// Freezes the builder into a replacement ready to commit.
    #[must_use]
    pub fn into_replacement(self) -> StorageReplacement {
        StorageReplacement {
            version: self.version,
            builder: self.builder,
            description: "Replace project model".to_string(),
        }
    }
}

/// A populated builder to be committed with
/// [`WorkspaceModel::replace_project_model`].
#[derive(Debug)]
pub struct StorageReplacement {
    version: u64,
    builder: Builder,
    description: String,
}

impl StorageReplacement {
    /// Builder method to set the update description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The version the replacement was built against.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns true if the builder holds any entity change.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.builder.has_changes()
    }
}

/// Result of an optimistic commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// The replacement became the current version.
    Committed {
        /// The model version after the commit.
        version: u64,
    },
    /// Another commit happened first; nothing was applied.
    Conflict {
        /// The version the replacement was built against.
        expected: u64,
        /// The current version.
        actual: u64,
    },
}

impl ReplaceOutcome {
    /// Returns true if the replacement was committed.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, ReplaceOutcome::Committed { .. })
    }
}

// =============================================================================
// Re-entrancy tracking
// =============================================================================

struct InFlight {
    thread: ThreadId,
    description: String,
    version: u64,
}

/// Marks an update as in flight for as long as it lives.
struct InFlightGuard<'a> {
    slot: &'a Mutex<Option<InFlight>>,
}

impl<'a> InFlightGuard<'a> {
    fn enter(slot: &'a Mutex<Option<InFlight>>, description: &str, version: u64) -> Self {
        *slot.lock() = Some(InFlight {
            thread: thread::current().id(),
            description: description.to_string(),
            version,
        });
        Self { slot }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}

// =============================================================================
// WorkspaceModel
// =============================================================================

/// The live, versioned entity graph of one workspace.
pub struct WorkspaceModel {
    current: ArcSwap<VersionedStorage>,
    write_lock: Mutex<()>,
    in_flight: Mutex<Option<InFlight>>,
    orphanage: Orphanage,
    bus: ChangeBus,
    config: ModelConfig,
}

impl Default for WorkspaceModel {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkspaceModel {
    /// Creates an empty model at version 0 with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ModelConfig::default())
    }

    /// Creates an empty model at version 0.
    #[must_use]
    pub fn with_config(config: ModelConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(VersionedStorage::new(0, Storage::new())),
            write_lock: Mutex::new(()),
            in_flight: Mutex::new(None),
            orphanage: Orphanage::new(),
            bus: ChangeBus::new(config.subscriber_capacity),
            config,
        }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// The orphanage.
    #[must_use]
    pub fn orphanage(&self) -> &Orphanage {
        &self.orphanage
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Returns the current version and its snapshot.
    #[must_use]
    pub fn current(&self) -> Arc<VersionedStorage> {
        self.current.load_full()
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn storage(&self) -> Storage {
        self.current.load().storage().clone()
    }

    /// Returns the current version number.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.current.load().version()
    }

    // =========================================================================
    // Notification
    // =========================================================================

    /// Registers a listener called synchronously on every commit.
    pub fn add_listener(&self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        self.bus.add_listener(listener)
    }

    /// Unregisters a listener. Returns true if it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.bus.remove_listener(id)
    }

    /// Opens a subscription to every version committed from now on.
    #[must_use]
    pub fn subscribe(&self) -> ChangeSubscription {
        self.bus.subscribe()
    }

    /// Opens a subscription and captures the current version atomically, so no
    /// commit falls between the two.
    ///
    /// # Errors
    ///
    /// Returns `ReentrantUpdate` when called from inside an update on the same
    /// thread.
    pub fn subscribe_with_current(&self) -> Result<(Arc<VersionedStorage>, ChangeSubscription)> {
        let _lock = self.lock_for("subscribe")?;
        Ok((self.current(), self.bus.subscribe()))
    }

    /// Runs `f` under the write lock with the current version.
    pub(crate) fn with_write_lock<R>(
        &self,
        description: &str,
        f: impl FnOnce(&Arc<VersionedStorage>) -> R,
    ) -> Result<R> {
        let _lock = self.lock_for(description)?;
        Ok(f(&self.current()))
    }

    pub(crate) fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    // =========================================================================
    // Commits
    // =========================================================================

    /// Applies `f` to a builder over the current version and commits the result.
    ///
    /// The write lock is held for the whole call. An update that changes nothing
    /// does not create a version unless `notify_empty_updates` is set.
    ///
    /// # Errors
    ///
    /// Returns `ReentrantUpdate` when called from inside another update on the
    /// same thread, the error of `f` (nothing is committed), or a consistency
    /// error when commit-time checks are enabled.
    pub fn update_model<R>(
        &self,
        description: &str,
        f: impl FnOnce(&mut Builder) -> Result<R>,
    ) -> Result<R> {
        let _lock = self.lock_for(description)?;
        let before = self.current();
        let _guard = InFlightGuard::enter(&self.in_flight, description, before.version());

        let mut builder = before.storage().to_builder();
        let result = f(&mut builder).map_err(|e| in_update(e, description, before.version()))?;
        self.commit_locked(description, &before, builder)?;
        Ok(result)
    }

    /// Returns a builder over the current version for an optimistic commit.
    #[must_use]
    pub fn builder_snapshot(&self) -> BuilderSnapshot {
        let current = self.current();
        BuilderSnapshot {
            version: current.version(),
            builder: current.storage().to_builder(),
        }
    }

    /// Commits a replacement built with [`builder_snapshot`](Self::builder_snapshot)
    /// if the model is still at the replacement's version.
    ///
    /// # Errors
    ///
    /// Returns `ReentrantUpdate` when called from inside an update on the same
    /// thread, or a consistency error when commit-time checks are enabled. A
    /// version mismatch is not an error: it is reported as
    /// [`ReplaceOutcome::Conflict`].
    pub fn replace_project_model(&self, replacement: StorageReplacement) -> Result<ReplaceOutcome> {
        let description = replacement.description.as_str();
        let _lock = self.lock_for(description)?;
        let before = self.current();
        if before.version() != replacement.version {
            warn!(
                target: "wsmodel::model",
                expected = replacement.version,
                actual = before.version(),
                description,
                "optimistic commit conflict"
            );
            return Ok(ReplaceOutcome::Conflict {
                expected: replacement.version,
                actual: before.version(),
            });
        }

        let _guard = InFlightGuard::enter(&self.in_flight, description, before.version());
        let version = self.commit_locked(description, &before, replacement.builder)?;
        Ok(ReplaceOutcome::Committed { version })
    }

    /// Installs a storage obtained elsewhere (typically the snapshot cache) as the
    /// next version. The change list is computed lazily.
    ///
    /// Changes are matched slot by slot, as [`collect_changes`] does. Loaded into
    /// an empty model every entity is `Added`. Loaded over existing entities the
    /// storage shares no lineage with them, so an entity present on both sides
    /// may show up as `Replaced` by an unrelated entity or as a `Removed`/`Added`
    /// pair. Use [`Builder::replace_by_source`] when identity-aware changes matter.
    ///
    /// [`collect_changes`]: wsmodel_storage::collect_changes
    ///
    /// # Errors
    ///
    /// As [`update_model`](Self::update_model).
    pub fn load_storage(&self, description: &str, storage: Storage) -> Result<u64> {
        let _lock = self.lock_for(description)?;
        let before = self.current();
        let _guard = InFlightGuard::enter(&self.in_flight, description, before.version());

        let mut builder = storage.to_builder();
        let adoption = self.adopt(&mut builder)?;
        let storage = builder.to_snapshot();
        if adoption.is_none()
            && storage.same_entities(before.storage())
            && !self.config.notify_empty_updates
        {
            return Ok(before.version());
        }
        let version = self
            .install_locked(description, &before, storage, None)
            .inspect_err(|_| self.orphanage.discard_pending())?;
        if let Some(adoption) = adoption {
            self.orphanage.install(adoption.remaining);
        }
        Ok(version)
    }

    /// Applies `f` to a builder over the orphanage, then adopts whatever fragments
    /// now have a module in the main storage.
    ///
    /// # Errors
    ///
    /// As [`update_model`](Self::update_model).
    pub fn update_orphanage<R>(
        &self,
        description: &str,
        f: impl FnOnce(&mut Builder) -> Result<R>,
    ) -> Result<R> {
        let _lock = self.lock_for(description)?;
        let before = self.current();
        let _guard = InFlightGuard::enter(&self.in_flight, description, before.version());

        let mut orphans = self.orphanage.snapshot().to_builder();
        let result = f(&mut orphans).map_err(|e| in_update(e, description, before.version()))?;
        if orphans.has_changes() || orphans.has_mapping_changes() {
            self.orphanage.install(orphans.to_snapshot());
            self.commit_locked(description, &before, before.storage().to_builder())?;
        }
        Ok(result)
    }

    // =========================================================================
    // Commit pipeline; callers hold the write lock
    // =========================================================================

    /// Fails fast on re-entrant use, then takes the write lock.
    fn lock_for(&self, description: &str) -> Result<MutexGuard<'_, ()>> {
        if let Some(in_flight) = &*self.in_flight.lock() {
            if in_flight.thread == thread::current().id() {
                return Err(Error::new(ErrorKind::ReentrantUpdate {
                    description: description.to_string(),
                    in_flight: in_flight.description.clone(),
                    version: in_flight.version,
                }));
            }
        }
        Ok(self.write_lock.lock())
    }

    fn adopt(&self, builder: &mut Builder) -> Result<Option<crate::orphanage::Adoption>> {
        if !self.config.orphanage_enabled {
            return Ok(None);
        }
        self.orphanage.adopt_into(builder).inspect_err(|_| {
            self.orphanage.discard_pending();
        })
    }

    fn commit_locked(
        &self,
        description: &str,
        before: &Arc<VersionedStorage>,
        mut builder: Builder,
    ) -> Result<u64> {
        let adoption = self.adopt(&mut builder)?;
        if !builder.has_changes() && !self.config.notify_empty_updates {
            if builder.has_mapping_changes() {
                // Mapping edits stay on the current version and are not published.
                let carried = VersionedStorage::new(before.version(), builder.to_snapshot());
                self.current.store(Arc::new(carried));
                debug!(target: "wsmodel::model", description, "carried mapping edits forward");
            } else {
                debug!(target: "wsmodel::model", description, "update changed nothing");
            }
            return Ok(before.version());
        }

        let changes = builder.collect_changes();
        let version = self
            .install_locked(description, before, builder.to_snapshot(), Some(changes))
            .inspect_err(|_| self.orphanage.discard_pending())?;
        if let Some(adoption) = adoption {
            self.orphanage.install(adoption.remaining);
        }
        Ok(version)
    }

    fn install_locked(
        &self,
        description: &str,
        before: &Arc<VersionedStorage>,
        storage: Storage,
        changes: Option<ChangeSet>,
    ) -> Result<u64> {
        if self.config.check_consistency {
            storage
                .check_consistency()
                .map_err(|e| in_update(e, description, before.version()))?;
        }

        let version = before.version() + 1;
        let after = Arc::new(VersionedStorage::new(version, storage));
        let event = Arc::new(match changes {
            Some(changes) => VersionedStorageChange::with_changes(
                Arc::clone(before),
                Arc::clone(&after),
                description,
                changes,
            ),
            None => VersionedStorageChange::new(Arc::clone(before), Arc::clone(&after), description),
        });

        self.bus.notify_before(&event);
        self.current.store(after);
        self.bus.publish(&event);
        debug!(target: "wsmodel::model", version, description, "committed");
        Ok(version)
    }
}

impl std::fmt::Debug for WorkspaceModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceModel")
            .field("version", &self.version())
            .field("bus", &self.bus)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Attaches the update description to an error that has no context yet.
fn in_update(error: Error, description: &str, version: u64) -> Error {
    if error.context.is_some() {
        return error;
    }
    error.with_context(
        ErrorContext::new()
            .with_description(description)
            .with_version(version),
    )
}
