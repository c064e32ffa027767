//! Pending Notification Queue
//!
//! Value deliveries from store writes do not run inside `set` call frames.
//! They are appended to a thread-local queue of (subscriber, delivery)
//! entries and drained in order. Two rules keep delivery storms bounded:
//!
//! 1. A subscriber already queued is not queued again; its entry is replaced
//!    in place, keeping its original position. A burst of writes therefore
//!    collapses to one delivery per subscriber, carrying the final value.
//!
//! 2. A write that happens while the queue is draining (a reentrant `set`
//!    from inside a subscriber callback) only appends entries; the drain
//!    already in progress picks them up. Stack depth stays bounded no matter
//!    how subscribers fan out.
//!
//! [`batch`] widens the window: while a batch is open nothing drains, so a
//! group of writes across several stores is observed as a single turn.
//!
//! The queue is thread-local. Stores may be shared across threads, but
//! deliveries always run on the thread that performed the write.

use std::cell::RefCell;
use std::collections::VecDeque;

/// Identifies one (store, subscriber) pair in the queue.
pub(crate) type DeliveryKey = (u64, u64);

/// One queued delivery: who it is for, and how to perform it.
pub(crate) struct QueuedDelivery {
    pub(crate) key: DeliveryKey,
    pub(crate) deliver: Box<dyn FnOnce()>,
}

struct QueueState {
    entries: VecDeque<QueuedDelivery>,
    draining: bool,
    batch_depth: usize,
}

thread_local! {
    static QUEUE: RefCell<QueueState> = RefCell::new(QueueState {
        entries: VecDeque::new(),
        draining: false,
        batch_depth: 0,
    });
}

/// Run `f` with delivery draining deferred until the outermost batch exits.
///
/// Writes inside the batch still update store values and run invalidate
/// callbacks immediately; only value deliveries wait. Nested batches fold
/// into the outermost one.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    QUEUE.with(|q| q.borrow_mut().batch_depth += 1);

    // The guard drains on the way out even if `f` panics, so the queue is
    // never left wedged behind a dead batch.
    struct BatchGuard;
    impl Drop for BatchGuard {
        fn drop(&mut self) {
            let drain_now = QUEUE.with(|q| {
                let mut state = q.borrow_mut();
                state.batch_depth -= 1;
                state.batch_depth == 0 && !state.draining && !state.entries.is_empty()
            });
            if drain_now {
                drain();
            }
        }
    }

    let _guard = BatchGuard;
    f()
}

/// Append a set of deliveries, coalescing per subscriber, and drain unless a
/// drain is already running or a batch is open.
pub(crate) fn enqueue(deliveries: Vec<QueuedDelivery>) {
    let drain_now = QUEUE.with(|q| {
        let mut state = q.borrow_mut();
        for delivery in deliveries {
            if let Some(entry) = state.entries.iter_mut().find(|e| e.key == delivery.key) {
                entry.deliver = delivery.deliver;
            } else {
                state.entries.push_back(delivery);
            }
        }
        state.batch_depth == 0 && !state.draining && !state.entries.is_empty()
    });
    if drain_now {
        drain();
    }
}

/// Number of deliveries currently waiting. Exposed for tests and diagnostics.
pub fn pending_deliveries() -> usize {
    QUEUE.with(|q| q.borrow().entries.len())
}

fn drain() {
    QUEUE.with(|q| q.borrow_mut().draining = true);

    // Reset the flag even if a subscriber panics mid-drain; undelivered
    // entries stay queued for the next write to pick up.
    struct DrainGuard;
    impl Drop for DrainGuard {
        fn drop(&mut self) {
            QUEUE.with(|q| q.borrow_mut().draining = false);
        }
    }
    let _guard = DrainGuard;

    let mut delivered = 0usize;
    loop {
        let next = QUEUE.with(|q| q.borrow_mut().entries.pop_front());
        match next {
            Some(entry) => {
                (entry.deliver)();
                delivered += 1;
            }
            None => break,
        }
    }
    tracing::trace!(delivered, "store notification queue drained");
}
