//! Derived Store
//!
//! A store computed from one or more input stores. Inputs are given as a
//! tuple (one through six elements), so a non-store input is a compile
//! error rather than a runtime check.
//!
//! # Recompute coalescing
//!
//! Each input owns one bit in a pending mask. The invalidate phase of an
//! input write sets the bit; the value delivery clears it and recomputes
//! only when no bits remain set. Because invalidates for a whole turn run
//! before any value delivery, N inputs written in one turn produce exactly
//! one recompute, not N.
//!
//! # Laziness
//!
//! Input subscriptions exist only while the derived store itself has at
//! least one subscriber. Auto mode evaluates the combining function once at
//! construction to seed the container; manual mode takes an explicit
//! initial value instead.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::subscribe::{
    InvalidateCallback, Store, StoreExt, Subscription, Teardown, ValueCallback,
};
use super::value::StoreValue;
use super::writable::{writable_with, Setter, Writable};

/// Cleanup returned by a manual producer, run before each recompute and on
/// final teardown.
pub type Cleanup = Box<dyn FnOnce() + Send>;

/// Shared per-activation state connecting a derived store to its inputs.
pub struct SourceSink<Slots> {
    pub(crate) slots: Mutex<Slots>,
    pub(crate) pending: AtomicU32,
    pub(crate) started: AtomicBool,
}

/// A tuple of input stores.
///
/// Implemented for tuples of one through six stores; the per-input wiring is
/// generated, so this trait is not meant to be implemented downstream.
pub trait Sources: Send + Sync + 'static {
    /// Per-input storage, empty until the input's first delivery.
    type Slots: Default + Send + 'static;

    /// The assembled input values handed to the combining function.
    type Values: Clone + Send + Sync + 'static;

    /// Number of inputs; bounds the pending bitmask.
    const LEN: u32;

    /// Subscribe to every input, wiring deliveries and invalidations into
    /// `sink` and calling `settle` whenever all inputs are current again.
    fn connect(
        &self,
        sink: Arc<SourceSink<Self::Slots>>,
        settle: Arc<dyn Fn() + Send + Sync>,
    ) -> Vec<Subscription>;

    /// Assemble values out of filled slots.
    fn snapshot(slots: &Self::Slots) -> Self::Values;

    /// Read every input once, without a lasting subscription.
    fn peek(&self) -> Self::Values;
}

enum Producer<V, T: StoreValue> {
    Auto(Box<dyn Fn(V) -> T + Send + Sync>),
    Manual(Box<dyn Fn(V, &Setter<T>) -> Option<Cleanup> + Send + Sync>),
}

/// A store derived from a tuple of input stores.
///
/// Cloning shares the inner state.
pub struct Derived<T: StoreValue> {
    inner: Writable<T>,
}

/// Create a derived store whose value is `f` applied to the inputs.
///
/// `f` runs once immediately to seed the store, and again whenever an input
/// changes while the derived store is subscribed to.
pub fn derived<S, T, F>(sources: S, f: F) -> Derived<T>
where
    S: Sources,
    T: StoreValue,
    F: Fn(S::Values) -> T + Send + Sync + 'static,
{
    let initial = f(sources.peek());
    build(sources, initial, Producer::Auto(Box::new(f)))
}

/// Create a derived store with a manual producer.
///
/// `f` receives the input values and a [`Setter`] and may produce values at
/// any time (including asynchronously through a retained setter). A returned
/// cleanup runs before the next recompute and when the last subscriber
/// leaves.
pub fn derived_with<S, T, F>(sources: S, initial: T, f: F) -> Derived<T>
where
    S: Sources,
    T: StoreValue,
    F: Fn(S::Values, &Setter<T>) -> Option<Cleanup> + Send + Sync + 'static,
{
    build(sources, initial, Producer::Manual(Box::new(f)))
}

fn build<S, T>(sources: S, initial: T, producer: Producer<S::Values, T>) -> Derived<T>
where
    S: Sources,
    T: StoreValue,
{
    debug_assert!(S::LEN <= 32, "derived supports at most 32 inputs");
    let producer = Arc::new(producer);
    let inner = writable_with(initial, move |set: Setter<T>| {
        let sink = Arc::new(SourceSink {
            slots: Mutex::new(S::Slots::default()),
            pending: AtomicU32::new(0),
            started: AtomicBool::new(false),
        });
        let cleanup: Arc<Mutex<Option<Cleanup>>> = Arc::new(Mutex::new(None));

        let settle: Arc<dyn Fn() + Send + Sync> = {
            let sink = Arc::clone(&sink);
            let producer = Arc::clone(&producer);
            let cleanup = Arc::clone(&cleanup);
            let set = set.clone();
            Arc::new(move || {
                if sink.pending.load(Ordering::SeqCst) != 0 {
                    return;
                }
                let values = {
                    let slots = sink.slots.lock();
                    S::snapshot(&slots)
                };
                match &*producer {
                    Producer::Auto(f) => set.set(f(values)),
                    Producer::Manual(f) => {
                        if let Some(previous) = cleanup.lock().take() {
                            previous();
                        }
                        let next = f(values, &set);
                        *cleanup.lock() = next;
                    }
                }
            })
        };

        let subscriptions = sources.connect(Arc::clone(&sink), Arc::clone(&settle));
        sink.started.store(true, Ordering::SeqCst);
        (settle.as_ref())();

        let cleanup = Arc::clone(&cleanup);
        Some(Box::new(move || {
            drop(subscriptions);
            if let Some(last) = cleanup.lock().take() {
                last();
            }
        }) as Teardown)
    });
    Derived { inner }
}

impl<T: StoreValue> Derived<T> {
    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }
}

impl<T: StoreValue> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: StoreValue + std::fmt::Debug> std::fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Derived").field(&self.inner).finish()
    }
}

impl<T: StoreValue> Store for Derived<T> {
    type Value = T;

    fn subscribe_raw(
        &self,
        run: ValueCallback<T>,
        invalidate: Option<InvalidateCallback>,
    ) -> Subscription {
        self.inner.subscribe_raw(run, invalidate)
    }
}

macro_rules! impl_sources {
    ($len:expr => $(($S:ident, $V:ident, $idx:tt)),+) => {
        impl<$($V,)+ $($S,)+> Sources for ($($S,)+)
        where
            $($V: StoreValue,)+
            $($S: Store<Value = $V> + Send + Sync + 'static,)+
        {
            type Slots = ($(Option<$V>,)+);
            type Values = ($($V,)+);
            const LEN: u32 = $len;

            fn connect(
                &self,
                sink: Arc<SourceSink<Self::Slots>>,
                settle: Arc<dyn Fn() + Send + Sync>,
            ) -> Vec<Subscription> {
                let mut subscriptions = Vec::with_capacity($len as usize);
                $(
                {
                    let value_sink = Arc::clone(&sink);
                    let value_settle = Arc::clone(&settle);
                    let invalidate_sink = Arc::clone(&sink);
                    subscriptions.push(self.$idx.subscribe_raw(
                        Box::new(move |value: &$V| {
                            value_sink.slots.lock().$idx = Some(value.clone());
                            value_sink
                                .pending
                                .fetch_and(!(1u32 << $idx), Ordering::SeqCst);
                            if value_sink.started.load(Ordering::SeqCst)
                                && value_sink.pending.load(Ordering::SeqCst) == 0
                            {
                                (value_settle.as_ref())();
                            }
                        }),
                        Some(Box::new(move || {
                            invalidate_sink
                                .pending
                                .fetch_or(1u32 << $idx, Ordering::SeqCst);
                        })),
                    ));
                }
                )+
                subscriptions
            }

            fn snapshot(slots: &Self::Slots) -> Self::Values {
                ($(
                    slots
                        .$idx
                        .clone()
                        .expect("derived input delivered no initial value"),
                )+)
            }

            fn peek(&self) -> Self::Values {
                ($(self.$idx.get(),)+)
            }
        }
    };
}

impl_sources!(1 => (S0, V0, 0));
impl_sources!(2 => (S0, V0, 0), (S1, V1, 1));
impl_sources!(3 => (S0, V0, 0), (S1, V1, 1), (S2, V2, 2));
impl_sources!(4 => (S0, V0, 0), (S1, V1, 1), (S2, V2, 2), (S3, V3, 3));
impl_sources!(5 => (S0, V0, 0), (S1, V1, 1), (S2, V2, 2), (S3, V3, 3), (S4, V4, 4));
impl_sources!(6 => (S0, V0, 0), (S1, V1, 1), (S2, V2, 2), (S3, V3, 3), (S4, V4, 4), (S5, V5, 5));
