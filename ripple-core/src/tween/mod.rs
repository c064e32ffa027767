//! Tweened Value Store
//!
//! A [`Tweened`] store animates toward each written value instead of jumping
//! to it. Subscribers see a normal store: intermediate values arrive as the
//! frame loop steps the active leg.
//!
//! # Semantics
//!
//! - `set` validates shape compatibility immediately and returns a
//!   [`TweenError`] on mismatch; nothing is queued on failure.
//! - A zero duration updates synchronously; no frame task is registered and
//!   any in-flight leg is aborted.
//! - Otherwise a frame task drives the leg. The interpolation plan is built
//!   lazily on the first tick past the configured delay, from whatever
//!   value the store holds *at that moment* — which is what makes a
//!   redirected tween continue from its current position. The superseded
//!   leg is aborted at that same moment; legs replace, they never blend.

mod interpolate;

pub use interpolate::{Interpolator, TweenError, TweenValue};

use std::sync::Arc;

use parking_lot::Mutex;

use crate::easing::{linear, EasingFn};
use crate::frame::{Clock, FrameLoop, TaskHandle};
use crate::runtime::Runtime;
use crate::store::{
    writable, InvalidateCallback, Store, Subscription, ValueCallback, Writable,
};

/// Duration of one tween leg: fixed, or computed from its endpoints.
#[derive(Clone)]
pub enum TweenDuration {
    /// Fixed length in milliseconds.
    Millis(f64),
    /// Computed per leg from `(from, to)`.
    PerLeg(Arc<dyn Fn(&TweenValue, &TweenValue) -> f64 + Send + Sync>),
}

impl From<f64> for TweenDuration {
    fn from(ms: f64) -> Self {
        TweenDuration::Millis(ms)
    }
}

impl std::fmt::Debug for TweenDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TweenDuration::Millis(ms) => f.debug_tuple("Millis").field(ms).finish(),
            TweenDuration::PerLeg(_) => f.write_str("PerLeg"),
        }
    }
}

/// Factory for custom interpolation, replacing the structural default.
pub type InterpolateFn = Arc<
    dyn Fn(&TweenValue, &TweenValue) -> Box<dyn Fn(f64) -> TweenValue + Send + Sync>
        + Send
        + Sync,
>;

/// Defaults applied to every leg of a tweened store.
#[derive(Clone)]
pub struct TweenDefaults {
    pub delay: f64,
    pub duration: TweenDuration,
    pub easing: EasingFn,
    pub interpolate: Option<InterpolateFn>,
}

impl Default for TweenDefaults {
    fn default() -> Self {
        Self {
            delay: 0.0,
            duration: TweenDuration::Millis(400.0),
            easing: linear,
            interpolate: None,
        }
    }
}

/// Per-`set` overrides of the store defaults.
#[derive(Clone, Default)]
pub struct TweenOpts {
    pub delay: Option<f64>,
    pub duration: Option<TweenDuration>,
    pub easing: Option<EasingFn>,
    pub interpolate: Option<InterpolateFn>,
}

struct TweenedInner {
    store: Writable<TweenValue>,
    frames: FrameLoop,
    clock: Arc<dyn Clock>,
    defaults: TweenDefaults,
    active: Mutex<Option<TaskHandle>>,
}

/// A store that animates between written values.
///
/// Cloning shares the store.
#[derive(Clone)]
pub struct Tweened {
    inner: Arc<TweenedInner>,
}

/// Create a tweened store with default timing.
pub fn tweened(runtime: &Runtime, initial: TweenValue) -> Tweened {
    tweened_with(runtime, initial, TweenDefaults::default())
}

/// Create a tweened store with explicit defaults.
pub fn tweened_with(runtime: &Runtime, initial: TweenValue, defaults: TweenDefaults) -> Tweened {
    Tweened {
        inner: Arc::new(TweenedInner {
            store: writable(initial),
            frames: runtime.frames().clone(),
            clock: runtime.clock(),
            defaults,
            active: Mutex::new(None),
        }),
    }
}

impl Tweened {
    /// Animate toward `target` with the store defaults.
    pub fn set(&self, target: TweenValue) -> Result<(), TweenError> {
        self.set_with(target, TweenOpts::default())
    }

    /// Animate toward a value computed from the current one.
    pub fn update(
        &self,
        f: impl FnOnce(&TweenValue) -> TweenValue,
        opts: TweenOpts,
    ) -> Result<(), TweenError> {
        let current = self.inner.store.current();
        self.set_with(f(&current), opts)
    }

    /// Animate toward `target`, overriding defaults per `opts`.
    ///
    /// Shape compatibility with the current value is checked before
    /// anything else happens; an error leaves the store untouched.
    pub fn set_with(&self, target: TweenValue, opts: TweenOpts) -> Result<(), TweenError> {
        let inner = &self.inner;
        let delay = opts.delay.unwrap_or(inner.defaults.delay);
        let duration = opts
            .duration
            .unwrap_or_else(|| inner.defaults.duration.clone());
        let easing = opts.easing.unwrap_or(inner.defaults.easing);
        let interpolate = opts
            .interpolate
            .or_else(|| inner.defaults.interpolate.clone());

        let current = inner.store.current();
        if interpolate.is_none() {
            // Structural tweens fail fast; the plan itself is rebuilt later
            // from the value current when the leg starts.
            Interpolator::between(&current, &target)?;
        }

        if matches!(duration, TweenDuration::Millis(ms) if ms == 0.0) {
            if let Some(previous) = inner.active.lock().take() {
                previous.abort();
            }
            inner.store.set(target);
            return Ok(());
        }

        let start = inner.clock.now_ms() + delay;
        let store = inner.store.clone();
        let mut previous = inner.active.lock().take();
        let mut plan: Option<Interpolator> = None;
        let mut leg_duration = 0.0;
        let mut started = false;

        let handle = inner.frames.task(move |now| {
            if now < start {
                return true;
            }
            if !started {
                started = true;
                // The leg departs from wherever the store is right now;
                // only now is the superseded leg withdrawn.
                let from = store.current();
                if let Some(previous) = previous.take() {
                    previous.abort();
                }
                leg_duration = match &duration {
                    TweenDuration::Millis(ms) => *ms,
                    TweenDuration::PerLeg(f) => (f.as_ref())(&from, &target),
                };
                plan = match &interpolate {
                    Some(custom) => Some(Interpolator::Custom((custom.as_ref())(&from, &target))),
                    None => match Interpolator::between(&from, &target) {
                        Ok(plan) => Some(plan),
                        Err(error) => {
                            // Only reachable when a custom interpolator
                            // changed the value's shape mid-flight.
                            tracing::warn!(%error, "tween abandoned");
                            return false;
                        }
                    },
                };
                tracing::trace!(duration = leg_duration, "tween leg started");
            }
            let elapsed = now - start;
            if leg_duration <= 0.0 || elapsed > leg_duration {
                store.set(target.clone());
                return false;
            }
            if let Some(plan) = &plan {
                store.set(plan.at(easing(elapsed / leg_duration)));
            }
            true
        });
        *inner.active.lock() = Some(handle);
        Ok(())
    }

    /// Read the current (possibly mid-animation) value.
    pub fn get(&self) -> TweenValue {
        self.inner.store.current()
    }

    /// Whether a leg is registered with the frame loop.
    pub fn is_animating(&self) -> bool {
        self.inner
            .active
            .lock()
            .as_ref()
            .map_or(false, |task| !task.is_done() && !task.is_aborted())
    }
}

impl Store for Tweened {
    type Value = TweenValue;

    fn subscribe_raw(
        &self,
        run: ValueCallback<TweenValue>,
        invalidate: Option<InvalidateCallback>,
    ) -> Subscription {
        self.inner.store.subscribe_raw(run, invalidate)
    }
}

impl std::fmt::Debug for Tweened {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tweened")
            .field("value", &self.get())
            .field("animating", &self.is_animating())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreExt;
    use crate::Runtime;

    #[test]
    fn zero_duration_updates_synchronously_without_a_frame_task() {
        let (runtime, _handles) = Runtime::headless();
        let store = tweened(&runtime, TweenValue::Number(0.0));
        store
            .set_with(
                TweenValue::Number(10.0),
                TweenOpts {
                    duration: Some(TweenDuration::Millis(0.0)),
                    ..TweenOpts::default()
                },
            )
            .expect("numbers share a shape");
        assert_eq!(store.get(), TweenValue::Number(10.0));
        assert_eq!(runtime.frames().task_count(), 0);
    }

    #[test]
    fn leg_steps_through_intermediate_values() {
        let (runtime, handles) = Runtime::headless();
        let store = tweened_with(
            &runtime,
            TweenValue::Number(0.0),
            TweenDefaults {
                duration: TweenDuration::Millis(100.0),
                ..TweenDefaults::default()
            },
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = store.subscribe(move |v: &TweenValue| {
            if let Some(n) = v.as_number() {
                sink.lock().push(n);
            }
        });

        store.set(TweenValue::Number(10.0)).expect("same shape");
        handles.clock.advance(50.0);
        runtime.advance_frame();
        assert_eq!(store.get(), TweenValue::Number(5.0));

        handles.clock.advance(60.0);
        runtime.advance_frame();
        assert_eq!(store.get(), TweenValue::Number(10.0));
        assert_eq!(runtime.frames().task_count(), 0);
        assert_eq!(*seen.lock(), vec![0.0, 5.0, 10.0]);
    }

    #[test]
    fn new_set_replaces_the_inflight_leg_from_its_current_position() {
        let (runtime, handles) = Runtime::headless();
        let store = tweened_with(
            &runtime,
            TweenValue::Number(0.0),
            TweenDefaults {
                duration: TweenDuration::Millis(100.0),
                ..TweenDefaults::default()
            },
        );

        store.set(TweenValue::Number(10.0)).expect("same shape");
        handles.clock.advance(50.0);
        runtime.advance_frame();
        assert_eq!(store.get(), TweenValue::Number(5.0));

        // Redirect back toward zero; the new leg departs from 5 and the
        // superseded leg is withdrawn as it does.
        store.set(TweenValue::Number(0.0)).expect("same shape");
        runtime.advance_frame();
        assert_eq!(store.get(), TweenValue::Number(5.0));
        assert_eq!(runtime.frames().task_count(), 1);

        handles.clock.advance(50.0);
        runtime.advance_frame();
        assert_eq!(store.get(), TweenValue::Number(2.5));

        handles.clock.advance(60.0);
        runtime.advance_frame();
        assert_eq!(store.get(), TweenValue::Number(0.0));
        assert_eq!(runtime.frames().task_count(), 0);
    }

    #[test]
    fn shape_mismatch_fails_at_request_time() {
        let (runtime, _handles) = Runtime::headless();
        let store = tweened(&runtime, TweenValue::Number(0.0));
        let err = store
            .set(TweenValue::List(vec![TweenValue::Number(1.0)]))
            .expect_err("number toward list");
        assert_eq!(
            err,
            TweenError::ShapeMismatch {
                from: "number",
                to: "list"
            }
        );
        // Nothing was queued and the value is untouched.
        assert_eq!(store.get(), TweenValue::Number(0.0));
        assert_eq!(runtime.frames().task_count(), 0);
    }

    #[test]
    fn delay_defers_the_departure() {
        let (runtime, handles) = Runtime::headless();
        let store = tweened_with(
            &runtime,
            TweenValue::Number(0.0),
            TweenDefaults {
                delay: 100.0,
                duration: TweenDuration::Millis(100.0),
                ..TweenDefaults::default()
            },
        );

        store.set(TweenValue::Number(10.0)).expect("same shape");
        handles.clock.advance(50.0);
        runtime.advance_frame();
        // Still waiting out the delay.
        assert_eq!(store.get(), TweenValue::Number(0.0));

        handles.clock.advance(100.0);
        runtime.advance_frame();
        assert_eq!(store.get(), TweenValue::Number(5.0));
    }

    #[test]
    fn per_leg_duration_sees_both_endpoints() {
        let (runtime, handles) = Runtime::headless();
        let recorded = Arc::new(Mutex::new(None));
        let keeper = recorded.clone();
        let store = tweened_with(
            &runtime,
            TweenValue::Number(0.0),
            TweenDefaults {
                duration: TweenDuration::PerLeg(Arc::new(move |from, to| {
                    *keeper.lock() = Some((from.clone(), to.clone()));
                    200.0
                })),
                ..TweenDefaults::default()
            },
        );

        store.set(TweenValue::Number(10.0)).expect("same shape");
        handles.clock.advance(100.0);
        runtime.advance_frame();
        assert_eq!(store.get(), TweenValue::Number(5.0));
        assert_eq!(
            *recorded.lock(),
            Some((TweenValue::Number(0.0), TweenValue::Number(10.0)))
        );
    }

    #[test]
    fn custom_interpolate_overrides_the_structural_plan() {
        let (runtime, handles) = Runtime::headless();
        let store = tweened_with(
            &runtime,
            TweenValue::Number(0.0),
            TweenDefaults {
                duration: TweenDuration::Millis(100.0),
                interpolate: Some(Arc::new(|_from, to| {
                    let to = to.clone();
                    // Snaps halfway instead of sweeping.
                    Box::new(move |t| {
                        if t < 0.5 {
                            TweenValue::Number(-1.0)
                        } else {
                            to.clone()
                        }
                    })
                })),
                ..TweenDefaults::default()
            },
        );

        store.set(TweenValue::Number(10.0)).expect("custom plan");
        handles.clock.advance(25.0);
        runtime.advance_frame();
        assert_eq!(store.get(), TweenValue::Number(-1.0));
        handles.clock.advance(80.0);
        runtime.advance_frame();
        assert_eq!(store.get(), TweenValue::Number(10.0));
    }

    #[test]
    fn structural_update_builds_on_the_current_value() {
        let (runtime, handles) = Runtime::headless();
        let store = tweened_with(
            &runtime,
            TweenValue::Number(2.0),
            TweenDefaults {
                duration: TweenDuration::Millis(100.0),
                ..TweenDefaults::default()
            },
        );
        store
            .update(
                |current| TweenValue::Number(current.as_number().unwrap_or(0.0) * 2.0),
                TweenOpts::default(),
            )
            .expect("same shape");
        handles.clock.advance(110.0);
        runtime.advance_frame();
        assert_eq!(store.get(), TweenValue::Number(4.0));
    }
}
