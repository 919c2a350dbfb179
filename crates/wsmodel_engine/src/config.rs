//! Configuration for the workspace model.

/// Configuration for a [`WorkspaceModel`](crate::WorkspaceModel).
///
/// Controls change delivery, orphan handling, and commit-time checking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelConfig {
    /// Capacity of each subscriber's event queue before events are coalesced.
    pub subscriber_capacity: usize,

    /// Whether sub-entities of missing modules are parked in the orphanage.
    pub orphanage_enabled: bool,

    /// Run the storage consistency checker before installing each version.
    pub check_consistency: bool,

    /// Commit and notify even when an update changed nothing.
    pub notify_empty_updates: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: 64,
            orphanage_enabled: true,
            check_consistency: false,
            notify_empty_updates: false,
        }
    }
}

impl ModelConfig {
    /// Creates a configuration for tests: every commit is checked.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            check_consistency: true,
            ..Self::default()
        }
    }

    /// Creates a configuration for bulk loading: no orphanage, no checking, and a
    /// small queue so slow subscribers coalesce early.
    #[must_use]
    pub fn relaxed() -> Self {
        Self {
            subscriber_capacity: 8,
            orphanage_enabled: false,
            check_consistency: false,
            notify_empty_updates: false,
        }
    }

    /// Builder method to set the subscriber queue capacity.
    #[must_use]
    pub fn with_subscriber_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_capacity = capacity.max(1);
        self
    }

    /// Builder method to enable/disable the orphanage.
    #[must_use]
    pub fn with_orphanage(mut self, enabled: bool) -> Self {
        self.orphanage_enabled = enabled;
        self
    }

    /// Builder method to enable/disable commit-time consistency checks.
    #[must_use]
    pub fn with_consistency_checks(mut self, enabled: bool) -> Self {
        self.check_consistency = enabled;
        self
    }

    /// Builder method to enable/disable notification of empty updates.
    #[must_use]
    pub fn with_notify_empty_updates(mut self, enabled: bool) -> Self {
        self.notify_empty_updates = enabled;
        self
    }
}
