//! Reactive query subscriptions.
//!
//! A [`Flow`] starts with the query result at the version it was opened, then
//! yields one update for every later version that changes the result. Opening a
//! flow captures the current version and registers the subscription under the
//! model's write lock, so the update stream has no gaps. Results are maintained
//! per entity: each change set only re-runs the pipeline for the entities it
//! names, and versions that do not touch the query's kind are skipped without
//! any work.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{error, trace};
use wsmodel_foundation::{EntityId, Result};
use wsmodel_storage::{ChangeSet, Storage};

use crate::bus::{ChangeSubscription, panic_message};
use crate::event::VersionedStorageChange;
use crate::model::WorkspaceModel;
use crate::query::Query;

// =============================================================================
// Incremental state
// =============================================================================

/// Elements that entered and left a query result between two versions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryDiff<T> {
    /// Elements now in the result.
    pub added: Vec<T>,
    /// Elements no longer in the result.
    pub removed: Vec<T>,
}

impl<T> QueryDiff<T> {
    /// Returns true if nothing entered or left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl<T> Default for QueryDiff<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
        }
    }
}

/// A query result kept per source entity.
struct QueryState<T> {
    query: Query<T>,
    per_entity: BTreeMap<EntityId, Vec<T>>,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> QueryState<T> {
    fn new(query: Query<T>, storage: &Storage) -> Self {
        let per_entity = storage
            .entities_of(query.kind())
            .map(|entity| (entity.id(), query.values_of(&entity)))
            .filter(|(_, values)| !values.is_empty())
            .collect();
        Self { query, per_entity }
    }

    fn value(&self) -> Vec<T> {
        self.per_entity.values().flatten().cloned().collect()
    }

    /// Folds a change set into the state and returns the net difference.
    fn apply(&mut self, changes: &ChangeSet) -> QueryDiff<T> {
        let mut diff = QueryDiff::default();
        if !changes.touches(self.query.kind()) {
            return diff;
        }
        for change in changes.get(self.query.kind()) {
            let id = change.id();
            if let Some(old) = self.per_entity.remove(&id) {
                diff.removed.extend(old);
            }
            if let Some(entity) = change.after() {
                let values = self.query.values_of(entity);
                diff.added.extend(values.iter().cloned());
                if !values.is_empty() {
                    self.per_entity.insert(entity.id(), values);
                }
            }
        }
        cancel_common(&mut diff);
        diff
    }
}

/// Removes elements present on both sides, as a multiset.
fn cancel_common<T: PartialEq>(diff: &mut QueryDiff<T>) {
    let mut index = 0;
    while index < diff.removed.len() {
        if let Some(position) = diff.added.iter().position(|a| *a == diff.removed[index]) {
            diff.added.remove(position);
            diff.removed.remove(index);
        } else {
            index += 1;
        }
    }
}

// =============================================================================
// Flow
// =============================================================================

/// One update of a flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowUpdate<V> {
    /// The version the previous value belonged to.
    pub from_version: u64,
    /// The version this value belongs to.
    pub version: u64,
    /// The new value.
    pub value: V,
}

type Step<V> = Box<dyn FnMut(&VersionedStorageChange) -> Option<V> + Send>;

/// A stream of values derived from successive model versions.
pub struct Flow<V> {
    initial: V,
    version: u64,
    subscription: ChangeSubscription,
    step: Step<V>,
}

impl<V: Send + 'static> Flow<V> {
    fn new(initial: V, version: u64, subscription: ChangeSubscription, step: Step<V>) -> Self {
        Self {
            initial,
            version,
            subscription,
            step,
        }
    }

    /// The value at the version the flow was opened.
    #[must_use]
    pub fn initial(&self) -> &V {
        &self.initial
    }

    /// The version of the most recent value.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    fn advance(&mut self, event: &VersionedStorageChange) -> Option<FlowUpdate<V>> {
        let from_version = self.version;
        self.version = event.after().version();
        let value = (self.step)(event)?;
        Some(FlowUpdate {
            from_version,
            version: self.version,
            value,
        })
    }

    /// Returns the next update without blocking.
    pub fn try_recv(&mut self) -> Option<FlowUpdate<V>> {
        while let Some(event) = self.subscription.try_recv() {
            if let Some(update) = self.advance(&event) {
                return Some(update);
            }
        }
        None
    }

    /// Blocks until the next update. Returns `None` once cancelled or once the
    /// model is gone.
    pub fn recv(&mut self) -> Option<FlowUpdate<V>> {
        while let Some(event) = self.subscription.recv() {
            if let Some(update) = self.advance(&event) {
                return Some(update);
            }
        }
        None
    }

    /// Blocks until the next update or until `timeout` elapses.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<FlowUpdate<V>> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = self.subscription.recv_timeout(remaining)?;
            if let Some(update) = self.advance(&event) {
                return Some(update);
            }
            if remaining.is_zero() {
                return None;
            }
        }
    }

    /// Stops the flow.
    pub fn cancel(&self) {
        self.subscription.cancel();
    }

    /// Delivers every update to `callback` on a dedicated thread until the flow
    /// ends. A panicking callback is logged and ends the flow.
    pub fn spawn(mut self, mut callback: impl FnMut(FlowUpdate<V>) + Send + 'static) -> JoinHandle<()> {
        thread::spawn(move || {
            while let Some(update) = self.recv() {
                let version = update.version;
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(update))) {
                    error!(
                        target: "wsmodel::query",
                        version,
                        "flow subscriber panicked: {}",
                        panic_message(&*panic)
                    );
                    self.cancel();
                    return;
                }
            }
        })
    }
}

impl<V> std::fmt::Debug for Flow<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flow")
            .field("version", &self.version)
            .field("subscription", &self.subscription)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Model entry points
// =============================================================================

impl WorkspaceModel {
    /// Opens a flow of the full query result, updated whenever it changes.
    ///
    /// # Errors
    ///
    /// Returns `ReentrantUpdate` when called from inside an update on the same
    /// thread.
    pub fn flow_of_query<T>(&self, query: Query<T>) -> Result<Flow<Vec<T>>>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        self.open_flow("flow_of_query", query, |state, diff| {
            (!diff.is_empty()).then(|| state.value())
        }, QueryState::value)
    }

    /// Opens a flow of elements entering the query result. The initial value is
    /// the whole current result.
    ///
    /// # Errors
    ///
    /// Returns `ReentrantUpdate` when called from inside an update on the same
    /// thread.
    pub fn flow_of_new_elements<T>(&self, query: Query<T>) -> Result<Flow<Vec<T>>>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        self.open_flow("flow_of_new_elements", query, |_, diff| {
            (!diff.added.is_empty()).then_some(diff.added)
        }, QueryState::value)
    }

    /// Opens a flow of explicit additions and removals. The initial value lists
    /// the whole current result as added.
    ///
    /// # Errors
    ///
    /// Returns `ReentrantUpdate` when called from inside an update on the same
    /// thread.
    pub fn flow_of_diff<T>(&self, query: Query<T>) -> Result<Flow<QueryDiff<T>>>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        self.open_flow("flow_of_diff", query, |_, diff| {
            (!diff.is_empty()).then_some(diff)
        }, |state| QueryDiff {
            added: state.value(),
            removed: Vec::new(),
        })
    }

    /// Opens a flow of a value computed from the whole snapshot, updated whenever
    /// it changes.
    ///
    /// # Errors
    ///
    /// Returns `ReentrantUpdate` when called from inside an update on the same
    /// thread.
    pub fn flow_of_scalar<R>(
        &self,
        compute: impl Fn(&Storage) -> R + Send + 'static,
    ) -> Result<Flow<R>>
    where
        R: Clone + PartialEq + Send + 'static,
    {
        self.with_write_lock("flow_of_scalar", |current| {
            let initial = compute(current.storage());
            let mut last = initial.clone();
            let step: Step<R> = Box::new(move |event| {
                let value = compute(event.after().storage());
                if value == last {
                    return None;
                }
                last = value.clone();
                Some(value)
            });
            Flow::new(initial, current.version(), self.bus().subscribe(), step)
        })
    }

    fn open_flow<T, V>(
        &self,
        name: &str,
        query: Query<T>,
        mut emit: impl FnMut(&QueryState<T>, QueryDiff<T>) -> Option<V> + Send + 'static,
        initial: impl FnOnce(&QueryState<T>) -> V,
    ) -> Result<Flow<V>>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        V: Send + 'static,
    {
        self.with_write_lock(name, |current| {
            let kind = query.kind();
            let mut state = QueryState::new(query, current.storage());
            let initial = initial(&state);
            let step: Step<V> = Box::new(move |event| {
                if !event.changes().touches(kind) {
                    return None;
                }
                let diff = state.apply(event.changes());
                trace!(
                    target: "wsmodel::query",
                    %kind,
                    version = event.after().version(),
                    added = diff.added.len(),
                    removed = diff.removed.len(),
                    "recalculated query"
                );
                emit(&state, diff)
            });
            Flow::new(initial, current.version(), self.bus().subscribe(), step)
        })
    }
}
