//! In-process change notification.
//!
//! # Contract
//! - Delivery is synchronous, inside the emitting call, to every registered
//!   observer. No ordering across observers.
//! - Nothing is persisted or replayed; an observer registered after a change
//!   never sees it.
//! - Per queue, delivered `new` values strictly increase while the queue is
//!   held (see [`Notifier::hold`]). A change whose `new` does not exceed the
//!   last delivered value for its queue is dropped (racing puts can finish
//!   out of order).
//! - A queue's high-water mark is forgotten when its last hold is released.
//!   Every delivered value is already persisted by then, so later writers
//!   start above it.
//! - Observers must not subscribe or unsubscribe from inside `on_change`.

use sqc_schemas::{CursorChange, Seq};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Receives cursor changes.
pub trait ChangeObserver: Send + Sync {
    fn on_change(&self, change: &CursorChange);
}

impl<F> ChangeObserver for F
where
    F: Fn(&CursorChange) + Send + Sync,
{
    fn on_change(&self, change: &CursorChange) {
        self(change)
    }
}

/// Handle returned by [`Notifier::subscribe`]. Unique per process, so ids
/// from different notifiers never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct QueueState {
    holds: usize,
    delivered: Option<Seq>,
}

#[derive(Default)]
struct Inner {
    observers: Vec<(SubscriptionId, Arc<dyn ChangeObserver>)>,
    queues: HashMap<String, QueueState>,
}

/// Observer registry.
#[derive(Default)]
pub struct Notifier {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking observer must not wedge every later notification.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self, observer: Arc<dyn ChangeObserver>) -> SubscriptionId {
        let id = SubscriptionId(NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed));
        self.lock().observers.push((id, observer));
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.observers.len();
        inner.observers.retain(|(oid, _)| *oid != id);
        inner.observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    /// Queues currently held, i.e. with a high-water mark in memory.
    pub fn held_queues(&self) -> usize {
        self.lock().queues.len()
    }

    /// Track `queue` until the returned guard drops. Take one per in-flight
    /// operation that may emit for `queue`.
    pub fn hold(&self, queue: &str) -> QueueHold<'_> {
        self.lock().queues.entry(queue.to_string()).or_default().holds += 1;
        QueueHold {
            notifier: self,
            queue: queue.to_string(),
        }
    }

    fn release(&self, queue: &str) {
        let mut inner = self.lock();
        if let Some(state) = inner.queues.get_mut(queue) {
            state.holds = state.holds.saturating_sub(1);
            if state.holds == 0 {
                inner.queues.remove(queue);
            }
        }
    }

    /// Deliver `change` to every observer. Returns `false` when the change
    /// was dropped as stale for its queue.
    ///
    /// Changes for a queue nobody holds are delivered unfiltered.
    pub fn emit(&self, change: &CursorChange) -> bool {
        let mut inner = self.lock();
        if let Some(state) = inner.queues.get_mut(&change.queue) {
            if let Some(last) = state.delivered {
                if change.new <= last {
                    debug!(
                        queue = %change.queue,
                        new = change.new,
                        last_delivered = last,
                        "dropping stale cursor change"
                    );
                    return false;
                }
            }
            state.delivered = Some(change.new);
        }

        for (_, observer) in inner.observers.iter() {
            observer.on_change(change);
        }
        true
    }
}

/// Guard returned by [`Notifier::hold`].
#[must_use = "the queue is released as soon as the hold drops"]
pub struct QueueHold<'a> {
    notifier: &'a Notifier,
    queue: String,
}

impl Drop for QueueHold<'_> {
    fn drop(&mut self) {
        self.notifier.release(&self.queue);
    }
}
