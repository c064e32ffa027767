//! Subscription plumbing shared by every store flavor.
//!
//! A subscriber is a pair of callbacks: `run`, which receives values, and an
//! optional `invalidate`, which fires before values do so that dependents can
//! mark themselves stale ahead of any sibling recomputing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::value::StoreValue;

/// Counter for generating unique subscription IDs.
static SUBSCRIPTION_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique subscription ID.
pub(crate) fn next_subscription_id() -> u64 {
    SUBSCRIPTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Value callback handed to [`Store::subscribe_raw`].
pub type ValueCallback<T> = Box<dyn FnMut(&T) + Send>;

/// Invalidation callback handed to [`Store::subscribe_raw`].
pub type InvalidateCallback = Box<dyn FnMut() + Send>;

/// Teardown retained from a store activation, run when the last subscriber
/// leaves.
pub type Teardown = Box<dyn FnOnce() + Send>;

/// A reactive container exposing subscription.
///
/// The contract every implementation upholds:
///
/// - `subscribe_raw` delivers the current value to the new subscriber
///   synchronously, before returning.
/// - Later deliveries go through the pending notification queue, preceded by
///   the invalidate phase.
/// - Dropping (or explicitly unsubscribing) the returned [`Subscription`]
///   removes the pair; the last removal deactivates on-demand stores.
pub trait Store: Send + Sync {
    /// The type of value this store produces.
    type Value: StoreValue;

    /// Register a subscriber pair. Prefer [`StoreExt::subscribe`] and
    /// [`StoreExt::subscribe_with`] for closure arguments.
    fn subscribe_raw(
        &self,
        run: ValueCallback<Self::Value>,
        invalidate: Option<InvalidateCallback>,
    ) -> Subscription;
}

/// Ergonomic helpers available on every [`Store`].
pub trait StoreExt: Store {
    /// Subscribe with a value callback only.
    fn subscribe(&self, run: impl FnMut(&Self::Value) + Send + 'static) -> Subscription {
        self.subscribe_raw(Box::new(run), None)
    }

    /// Subscribe with both a value callback and an invalidate callback.
    fn subscribe_with(
        &self,
        run: impl FnMut(&Self::Value) + Send + 'static,
        invalidate: impl FnMut() + Send + 'static,
    ) -> Subscription {
        self.subscribe_raw(Box::new(run), Some(Box::new(invalidate)))
    }

    /// Read the current value by subscribing once.
    ///
    /// This momentarily activates on-demand stores, so a derived store read
    /// this way computes a fresh value even with no other subscribers.
    fn get(&self) -> Self::Value {
        let slot = Arc::new(Mutex::new(None));
        let writer = Arc::clone(&slot);
        let subscription = self.subscribe_raw(
            Box::new(move |value: &Self::Value| {
                *writer.lock() = Some(value.clone());
            }),
            None,
        );
        subscription.unsubscribe();
        let value = slot
            .lock()
            .take()
            .expect("store contract violated: subscribe did not deliver synchronously");
        value
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

/// Guard for an active subscription.
///
/// The subscription ends when the guard is dropped or [`unsubscribe`] is
/// called; both are equivalent.
///
/// [`unsubscribe`]: Subscription::unsubscribe
#[must_use = "dropping a Subscription immediately unsubscribes"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// End the subscription now.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
