//! Change notification.
//!
//! Two delivery paths exist. [`ChangeListener`]s run synchronously on the
//! committing thread, once before and once after the new version is installed.
//! [`ChangeSubscription`]s receive events through bounded channels; when a
//! subscriber falls behind, further events are merged into a single pending
//! event spanning the gap, so publishing never blocks and order is preserved.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{error, trace};

use crate::event::VersionedStorageChange;

/// Shared change event.
pub type ChangeEvent = Arc<VersionedStorageChange>;

// =============================================================================
// Listeners
// =============================================================================

/// Synchronous observer of committed versions.
///
/// Listeners run while the model's write lock is held, so they must not commit
/// to the same model. A panicking listener is logged and skipped.
pub trait ChangeListener: Send + Sync {
    /// Called before the new version becomes current.
    fn before_changed(&self, _event: &VersionedStorageChange) {}

    /// Called after the new version became current.
    fn changed(&self, event: &VersionedStorageChange);
}

/// Handle for removing a registered listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

// =============================================================================
// Subscriptions
// =============================================================================

struct SlotState {
    sender: Option<Sender<ChangeEvent>>,
    /// Merged events that did not fit the channel. Newer than anything queued.
    overflow: Option<ChangeEvent>,
}

struct Slot {
    state: Mutex<SlotState>,
}

impl Slot {
    /// Delivers one event. Returns false once the subscription is gone.
    fn deliver(&self, event: &ChangeEvent) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(sender) = &state.sender else {
            return false;
        };
        if let Some(pending) = &state.overflow {
            state.overflow = Some(Arc::new(pending.coalesce(event)));
            return true;
        }
        match sender.try_send(Arc::clone(event)) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                trace!(target: "wsmodel::bus", version = event.after().version(), "subscriber queue full, coalescing");
                state.overflow = Some(event);
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                state.sender = None;
                false
            }
        }
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.sender = None;
        state.overflow = None;
    }
}

/// A stream of change events for every version committed after subscribing.
///
/// Dropping the subscription cancels it.
pub struct ChangeSubscription {
    receiver: Receiver<ChangeEvent>,
    slot: Arc<Slot>,
}

impl ChangeSubscription {
    /// Returns the next event without blocking.
    #[must_use]
    pub fn try_recv(&self) -> Option<ChangeEvent> {
        if let Ok(event) = self.receiver.try_recv() {
            return Some(event);
        }
        // Publishers decide between queue and overflow under this lock, so an
        // empty queue seen here means the overflow is the next event.
        let mut state = self.slot.state.lock();
        if let Ok(event) = self.receiver.try_recv() {
            return Some(event);
        }
        state.overflow.take()
    }

    /// Blocks until the next event. Returns `None` once cancelled or once the
    /// model is gone.
    #[must_use]
    pub fn recv(&self) -> Option<ChangeEvent> {
        if let Some(event) = self.try_recv() {
            return Some(event);
        }
        match self.receiver.recv() {
            Ok(event) => Some(event),
            Err(_) => self.slot.state.lock().overflow.take(),
        }
    }

    /// Blocks until the next event or until `timeout` elapses.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ChangeEvent> {
        if let Some(event) = self.try_recv() {
            return Some(event);
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => self.slot.state.lock().overflow.take(),
        }
    }

    /// Drains every event already delivered.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Stops delivery of later events. Pending overflow is discarded.
    pub fn cancel(&self) {
        self.slot.close();
    }

    /// Returns true once cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.slot.state.lock().sender.is_none()
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.slot.close();
    }
}

impl std::fmt::Debug for ChangeSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeSubscription")
            .field("queued", &self.receiver.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Bus
// =============================================================================

/// Fan-out of committed versions to listeners and subscriptions.
pub struct ChangeBus {
    listeners: Mutex<Vec<(ListenerId, Arc<dyn ChangeListener>)>>,
    slots: Mutex<Vec<Arc<Slot>>>,
    next_listener: AtomicU64,
    capacity: usize,
}

impl ChangeBus {
    /// Creates a bus whose subscription queues hold `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            slots: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    /// Registers a synchronous listener.
    pub fn add_listener(&self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    /// Unregisters a listener. Returns true if it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }

    /// Opens a new subscription.
    #[must_use]
    pub fn subscribe(&self) -> ChangeSubscription {
        let (sender, receiver) = channel::bounded(self.capacity);
        let slot = Arc::new(Slot {
            state: Mutex::new(SlotState {
                sender: Some(sender),
                overflow: None,
            }),
        });
        self.slots.lock().push(Arc::clone(&slot));
        ChangeSubscription { receiver, slot }
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Runs `before_changed` on every listener.
    pub fn notify_before(&self, event: &VersionedStorageChange) {
        for (_, listener) in self.listener_snapshot() {
            guarded("before_changed", event, || listener.before_changed(event));
        }
    }

    /// Runs `changed` on every listener, then queues the event for every
    /// subscription.
    pub fn publish(&self, event: &ChangeEvent) {
        for (_, listener) in self.listener_snapshot() {
            guarded("changed", event, || listener.changed(event));
        }
        self.slots.lock().retain(|slot| slot.deliver(event));
    }

    fn listener_snapshot(&self) -> Vec<(ListenerId, Arc<dyn ChangeListener>)> {
        self.listeners.lock().clone()
    }
}

impl Drop for ChangeBus {
    fn drop(&mut self) {
        // Wake blocked receivers; pending overflow stays readable
        for slot in self.slots.get_mut().drain(..) {
            slot.state.lock().sender = None;
        }
    }
}

impl std::fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeBus")
            .field("listeners", &self.listeners.lock().len())
            .field("subscribers", &self.slots.lock().len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Runs one listener callback, logging instead of propagating a panic.
fn guarded(phase: &str, event: &VersionedStorageChange, callback: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(callback)) {
        error!(
            target: "wsmodel::bus",
            phase,
            version = event.after().version(),
            "change listener panicked: {}",
            panic_message(&*panic)
        );
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("(non-string panic)")
}
