//! Writable Store
//!
//! The fundamental reactive container. It holds a value, a list of
//! subscriber pairs, and — while at least one subscriber exists — a retained
//! teardown from its activation closure.
//!
//! # Notification protocol
//!
//! `set` runs in two phases. First every subscriber's invalidate callback
//! fires synchronously, so dependents can mark themselves stale before any
//! sibling recomputes. Then one delivery per subscriber is appended to the
//! pending notification queue; the queue coalesces repeated writes and
//! absorbs reentrant ones, so a `set` issued from inside a subscriber never
//! recurses into a second drain.
//!
//! # Activation
//!
//! A store built with [`writable_with`] invokes its activation closure when
//! the subscriber count goes from zero to one and runs the retained teardown
//! when it returns to zero. Writes made while the store has no subscribers
//! update the value silently.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::queue::{self, QueuedDelivery};
use super::subscribe::{
    next_subscription_id, InvalidateCallback, Store, Subscription, Teardown, ValueCallback,
};
use super::value::StoreValue;

/// Counter for generating unique store IDs.
static STORE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique store ID.
pub(crate) fn next_store_id() -> u64 {
    STORE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Activation closure invoked on the zero-to-one subscriber transition.
pub type StartFn<T> = Box<dyn FnMut(Setter<T>) -> Option<Teardown> + Send>;

struct SubscriberEntry<T> {
    id: u64,
    run: Arc<Mutex<ValueCallback<T>>>,
    invalidate: Option<Arc<Mutex<InvalidateCallback>>>,
    /// Cleared on unsubscribe so queued deliveries become no-ops.
    active: Arc<AtomicBool>,
}

impl<T> Clone for SubscriberEntry<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            run: Arc::clone(&self.run),
            invalidate: self.invalidate.clone(),
            active: Arc::clone(&self.active),
        }
    }
}

struct State<T: StoreValue> {
    value: T,
    subscribers: SmallVec<[SubscriberEntry<T>; 2]>,
    start: Option<StartFn<T>>,
    /// `Some` exactly while the store has at least one subscriber.
    teardown: Option<Teardown>,
}

pub(crate) struct Shared<T: StoreValue> {
    id: u64,
    state: Mutex<State<T>>,
}

/// A writable reactive container.
///
/// Cloning a `Writable` creates a new handle to the same inner state — all
/// handles see the same value and share subscribers.
pub struct Writable<T: StoreValue> {
    shared: Arc<Shared<T>>,
}

/// Create a writable store with the given initial value.
pub fn writable<T: StoreValue>(initial: T) -> Writable<T> {
    Writable {
        shared: Arc::new(Shared {
            id: next_store_id(),
            state: Mutex::new(State {
                value: initial,
                subscribers: SmallVec::new(),
                start: None,
                teardown: None,
            }),
        }),
    }
}

/// Create a writable store with an activation closure.
///
/// `start` runs when the first subscriber arrives, receives a [`Setter`] for
/// producing values, and may return a teardown that runs when the last
/// subscriber leaves. The closure is invoked again on each later
/// zero-to-one transition.
pub fn writable_with<T: StoreValue>(
    initial: T,
    start: impl FnMut(Setter<T>) -> Option<Teardown> + Send + 'static,
) -> Writable<T> {
    let store = writable(initial);
    store.shared.state.lock().start = Some(Box::new(start));
    store
}

impl<T: StoreValue> Writable<T> {
    /// Write a new value and notify subscribers.
    ///
    /// A write that compares equal to the current value (per
    /// [`StoreValue::value_eq`]) is a no-op.
    pub fn set(&self, value: T) {
        set_value(&self.shared, value);
    }

    /// Write a value computed from the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let current = self.shared.state.lock().value.clone();
        self.set(f(&current));
    }

    /// A write half that holds no strong reference to the store.
    pub fn setter(&self) -> Setter<T> {
        Setter {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Read the current value without subscribing.
    pub(crate) fn current(&self) -> T {
        self.shared.state.lock().value.clone()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.shared.state.lock().subscribers.len()
    }
}

impl<T: StoreValue> Clone for Writable<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: StoreValue + std::fmt::Debug> std::fmt::Debug for Writable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Writable")
            .field("id", &self.shared.id)
            .field("value", &state.value)
            .field("subscriber_count", &state.subscribers.len())
            .finish()
    }
}

impl<T: StoreValue> Store for Writable<T> {
    type Value = T;

    fn subscribe_raw(
        &self,
        run: ValueCallback<T>,
        invalidate: Option<InvalidateCallback>,
    ) -> Subscription {
        let shared = Arc::clone(&self.shared);
        let id = next_subscription_id();
        let entry = SubscriberEntry {
            id,
            run: Arc::new(Mutex::new(run)),
            invalidate: invalidate.map(|i| Arc::new(Mutex::new(i))),
            active: Arc::new(AtomicBool::new(true)),
        };
        let run_handle = Arc::clone(&entry.run);
        let active = Arc::clone(&entry.active);

        let first = {
            let mut state = shared.state.lock();
            state.subscribers.push(entry);
            state.subscribers.len() == 1
        };

        if first {
            // The activation closure runs without the state lock held: it may
            // write through the setter, and writes made before the teardown
            // slot is filled update the value silently.
            let start = shared.state.lock().start.take();
            let teardown = match start {
                Some(mut start) => {
                    let setter = Setter {
                        shared: Arc::downgrade(&shared),
                    };
                    let teardown = start(setter);
                    shared.state.lock().start = Some(start);
                    teardown
                }
                None => None,
            };
            shared.state.lock().teardown = Some(teardown.unwrap_or_else(|| Box::new(|| {})));
            tracing::trace!(store = shared.id, "store activated");
        }

        // Initial synchronous delivery.
        let value = shared.state.lock().value.clone();
        (*run_handle.lock())(&value);

        Subscription::new(move || remove_subscriber(&shared, id, &active))
    }
}

/// The write half of a store, handed to activation closures and manual
/// derived producers. Holds only a weak reference; writes after the store is
/// dropped are silently ignored.
pub struct Setter<T: StoreValue> {
    shared: Weak<Shared<T>>,
}

impl<T: StoreValue> Setter<T> {
    /// Write a new value. See [`Writable::set`].
    pub fn set(&self, value: T) {
        if let Some(shared) = self.shared.upgrade() {
            set_value(&shared, value);
        }
    }

    /// Write a value computed from the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        if let Some(shared) = self.shared.upgrade() {
            let current = shared.state.lock().value.clone();
            set_value(&shared, f(&current));
        }
    }
}

impl<T: StoreValue> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

fn set_value<T: StoreValue>(shared: &Arc<Shared<T>>, value: T) {
    let (invalidates, deliveries) = {
        let mut state = shared.state.lock();
        if state.value.value_eq(&value) {
            return;
        }
        state.value = value;
        if state.teardown.is_none() {
            // No subscribers: keep the value, skip notification entirely.
            return;
        }
        let invalidates: SmallVec<[_; 2]> = state
            .subscribers
            .iter()
            .filter_map(|s| s.invalidate.clone())
            .collect();
        let deliveries: Vec<QueuedDelivery> = state
            .subscribers
            .iter()
            .map(|s| make_delivery(shared, s))
            .collect();
        (invalidates, deliveries)
    };

    // Phase one: every invalidate callback, synchronously.
    for invalidate in invalidates {
        (*invalidate.lock())();
    }
    // Phase two: value deliveries through the pending queue.
    queue::enqueue(deliveries);
}

fn make_delivery<T: StoreValue>(
    shared: &Arc<Shared<T>>,
    subscriber: &SubscriberEntry<T>,
) -> QueuedDelivery {
    let weak = Arc::downgrade(shared);
    let run = Arc::clone(&subscriber.run);
    let active = Arc::clone(&subscriber.active);
    QueuedDelivery {
        key: (shared.id, subscriber.id),
        deliver: Box::new(move || {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            if !active.load(Ordering::SeqCst) {
                return;
            }
            // The value is read at delivery time, so a drain always hands
            // out the store's latest value no matter how entries were
            // replaced while queued.
            let value = shared.state.lock().value.clone();
            (*run.lock())(&value);
        }),
    }
}

fn remove_subscriber<T: StoreValue>(shared: &Arc<Shared<T>>, id: u64, active: &Arc<AtomicBool>) {
    active.store(false, Ordering::SeqCst);
    let teardown = {
        let mut state = shared.state.lock();
        state.subscribers.retain(|s| s.id != id);
        if state.subscribers.is_empty() {
            state.teardown.take()
        } else {
            None
        }
    };
    if let Some(teardown) = teardown {
        tracing::trace!(store = shared.id, "store deactivated");
        teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::queue::batch;
    use crate::store::subscribe::StoreExt;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn subscribe_delivers_current_value_once() {
        let store = writable(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = store.subscribe(move |v: &i32| sink.lock().push(*v));
        assert_eq!(*seen.lock(), vec![0]);
    }

    #[test]
    fn equal_write_does_not_notify() {
        let store = writable(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = store.subscribe(move |v: &i32| sink.lock().push(*v));

        store.set(0);
        assert_eq!(*seen.lock(), vec![0]);

        store.set(5);
        assert_eq!(*seen.lock(), vec![0, 5]);
    }

    #[test]
    fn nan_write_does_not_renotify() {
        let store = writable(f64::NAN);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let _sub = store.subscribe(move |_: &f64| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        store.set(f64::NAN);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn update_applies_function_to_current() {
        let store = writable(10);
        store.update(|v| v + 5);
        assert_eq!(store.get(), 15);
    }

    #[test]
    fn batched_writes_coalesce_to_final_value() {
        let store = writable(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = store.subscribe(move |v: &i32| sink.lock().push(*v));
        seen.lock().clear();

        batch(|| {
            store.set(1);
            store.set(2);
            store.set(3);
            assert!(seen.lock().is_empty());
        });

        // Exactly one delivery, carrying the final value.
        assert_eq!(*seen.lock(), vec![3]);
    }

    #[test]
    fn invalidate_runs_before_value_delivery() {
        let store = writable(0);
        let order = Arc::new(Mutex::new(Vec::new()));
        let value_sink = order.clone();
        let invalidate_sink = order.clone();
        let _sub = store.subscribe_with(
            move |v: &i32| value_sink.lock().push(format!("value:{v}")),
            move || invalidate_sink.lock().push("invalidate".to_string()),
        );
        order.lock().clear();

        store.set(7);
        assert_eq!(
            *order.lock(),
            vec!["invalidate".to_string(), "value:7".to_string()]
        );
    }

    #[test]
    fn reentrant_set_folds_into_the_running_drain() {
        let store = writable(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let inner = store.clone();
        let _sub = store.subscribe(move |v: &i32| {
            sink.lock().push(*v);
            if *v == 1 {
                inner.set(2);
            }
        });
        seen.lock().clear();

        store.set(1);
        // The reentrant write is delivered by the same drain, not a nested one.
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn activation_runs_on_first_subscriber_and_teardown_on_last() {
        let started = Arc::new(AtomicUsize::new(0));
        let stopped = Arc::new(AtomicUsize::new(0));
        let started_counter = started.clone();
        let stopped_counter = stopped.clone();
        let store = writable_with(0, move |setter: Setter<i32>| {
            started_counter.fetch_add(1, Ordering::SeqCst);
            setter.set(42);
            let stopped_counter = stopped_counter.clone();
            Some(Box::new(move || {
                stopped_counter.fetch_add(1, Ordering::SeqCst);
            }) as Teardown)
        });

        assert_eq!(started.load(Ordering::SeqCst), 0);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let first = store.subscribe(move |v: &i32| sink.lock().push(*v));
        // The activation write landed before the initial delivery.
        assert_eq!(*seen.lock(), vec![42]);
        assert_eq!(started.load(Ordering::SeqCst), 1);

        let second = store.subscribe(|_: &i32| {});
        assert_eq!(started.load(Ordering::SeqCst), 1);

        second.unsubscribe();
        assert_eq!(stopped.load(Ordering::SeqCst), 0);
        first.unsubscribe();
        assert_eq!(stopped.load(Ordering::SeqCst), 1);

        // Re-activation invokes the closure again.
        let _third = store.subscribe(|_: &i32| {});
        assert_eq!(started.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn writes_without_subscribers_are_silent_but_kept() {
        let store = writable(1);
        store.set(9);
        assert_eq!(store.get(), 9);
    }

    #[test]
    fn clone_shares_state() {
        let a = writable(0);
        let b = a.clone();
        a.set(42);
        assert_eq!(b.get(), 42);
        b.set(100);
        assert_eq!(a.get(), 100);
    }

    #[test]
    fn unsubscribed_subscriber_misses_pending_deliveries() {
        let store = writable(0);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let sub = store.subscribe(move |_: &i32| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        batch(|| {
            store.set(5);
            sub.unsubscribe();
        });
        // The queued delivery was disarmed by the unsubscribe.
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
