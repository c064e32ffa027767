//! Readable Store
//!
//! A store whose value is produced solely by its activation closure — the
//! read-only face of [`Writable`]. Consumers can subscribe but never write.

use super::subscribe::{InvalidateCallback, Store, Subscription, Teardown, ValueCallback};
use super::value::StoreValue;
use super::writable::{writable_with, Setter, Writable};

/// A read-only reactive container.
///
/// Cloning shares the inner state, as with [`Writable`].
pub struct Readable<T: StoreValue> {
    inner: Writable<T>,
}

/// Create a readable store.
///
/// `start` runs when the first subscriber arrives and is the only way values
/// enter the store; its optional teardown runs when the last subscriber
/// leaves.
pub fn readable<T: StoreValue>(
    initial: T,
    start: impl FnMut(Setter<T>) -> Option<Teardown> + Send + 'static,
) -> Readable<T> {
    Readable {
        inner: writable_with(initial, start),
    }
}

impl<T: StoreValue> Readable<T> {
    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }
}

impl<T: StoreValue> Clone for Readable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: StoreValue + std::fmt::Debug> std::fmt::Debug for Readable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Readable").field(&self.inner).finish()
    }
}

impl<T: StoreValue> Store for Readable<T> {
    type Value = T;

    fn subscribe_raw(
        &self,
        run: ValueCallback<T>,
        invalidate: Option<InvalidateCallback>,
    ) -> Subscription {
        self.inner.subscribe_raw(run, invalidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::subscribe::StoreExt;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn values_come_from_the_activation_closure() {
        let store = readable(0, |setter: Setter<i32>| {
            setter.set(7);
            None
        });
        assert_eq!(store.get(), 7);
    }

    #[test]
    fn teardown_runs_when_last_subscriber_leaves() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let counter = stopped.clone();
        let store = readable(0, move |_setter: Setter<i32>| {
            let counter = counter.clone();
            Some(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }) as Teardown)
        });

        let sub = store.subscribe(|_: &i32| {});
        assert_eq!(stopped.load(Ordering::SeqCst), 0);
        sub.unsubscribe();
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn later_writes_through_the_retained_setter_notify() {
        let slot: Arc<Mutex<Option<Setter<i32>>>> = Arc::new(Mutex::new(None));
        let keeper = slot.clone();
        let store = readable(0, move |setter: Setter<i32>| {
            *keeper.lock() = Some(setter);
            None
        });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = store.subscribe(move |v: &i32| sink.lock().push(*v));

        slot.lock().as_ref().map(|s| s.set(3));
        assert_eq!(*seen.lock(), vec![0, 3]);
    }
}
