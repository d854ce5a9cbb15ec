//! Observer bus.
//!
//! Two observer kinds live side by side: the legacy
//! `(change_fn, progress_fn)` pairs keyed by an int slot id, and the
//! richer [`StatusCallback`] keyed by a subscription index. Keys are
//! allocated from monotone counters and never reused; unsubscribing with
//! a stale key is a silent no-op.

use indexmap::IndexMap;
use tracing::trace;

use mapdepot_core::{CountryId, ErrorCode, Progress};

/// Legacy country-changed callback.
pub type ChangeCallback = Box<dyn FnMut(&CountryId) + Send>;
/// Legacy progress callback.
pub type ProgressCallback = Box<dyn FnMut(&CountryId, Progress) + Send>;
/// Node status change callback.
pub type StatusChangedCallback = Box<dyn FnMut(&CountryId) + Send>;
/// Download error callback.
pub type ErrorCallback = Box<dyn FnMut(&CountryId, ErrorCode) + Send>;

/// The rich observer: status changes plus errors.
pub struct StatusCallback {
    /// Called for the changed node and every ancestor up to the root.
    pub on_status_changed: StatusChangedCallback,
    /// Called once for the node whose download attempt failed.
    pub on_error: ErrorCallback,
}

struct CountryObserver {
    change: ChangeCallback,
    progress: ProgressCallback,
    slot: i32,
}

/// Fan-out of change, progress, status and error notifications.
#[derive(Default)]
pub struct ObserverBus {
    observers: Vec<CountryObserver>,
    next_slot: i32,
    status_callbacks: IndexMap<usize, StatusCallback>,
    next_status_key: usize,
}

impl ObserverBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a legacy observer pair. Returns its slot id.
    pub fn subscribe(&mut self, change: ChangeCallback, progress: ProgressCallback) -> i32 {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.observers.push(CountryObserver {
            change,
            progress,
            slot,
        });
        slot
    }

    /// Drop the legacy observer of `slot`. Stale slots are ignored.
    pub fn unsubscribe(&mut self, slot: i32) {
        self.observers.retain(|o| o.slot != slot);
    }

    /// Subscribe a status callback. Returns its subscription index.
    pub fn subscribe_status(&mut self, callback: StatusCallback) -> usize {
        let key = self.next_status_key;
        self.next_status_key += 1;
        self.status_callbacks.insert(key, callback);
        key
    }

    /// Drop the status callback of `key`. Stale keys are ignored.
    pub fn unsubscribe_status(&mut self, key: usize) {
        self.status_callbacks.shift_remove(&key);
    }

    /// Number of legacy observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Number of status callbacks.
    #[must_use]
    pub fn status_callback_count(&self) -> usize {
        self.status_callbacks.len()
    }

    /// Fire legacy change callbacks for `id`.
    pub fn notify_changed(&mut self, id: &CountryId) {
        for observer in &mut self.observers {
            (observer.change)(id);
        }
    }

    /// Fire legacy progress callbacks for `id`.
    pub fn notify_progress(&mut self, id: &CountryId, progress: Progress) {
        for observer in &mut self.observers {
            (observer.progress)(id, progress);
        }
    }

    /// Fire status callbacks along a notification chain.
    ///
    /// The chain is the changed node first, then its ancestors root-ward;
    /// each subscriber sees the ids in that order.
    pub fn notify_status_chain(&mut self, chain: &[CountryId]) {
        trace!(ids = chain.len(), "status change fan-out");
        for id in chain {
            for callback in self.status_callbacks.values_mut() {
                (callback.on_status_changed)(id);
            }
        }
    }

    /// Fire error callbacks for the originating `id` only.
    pub fn notify_error(&mut self, id: &CountryId, code: ErrorCode) {
        for callback in self.status_callbacks.values_mut() {
            (callback.on_error)(id, code);
        }
    }
}
