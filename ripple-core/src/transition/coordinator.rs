//! Transition Coordinator
//!
//! One [`Transition`] per element coordinates its enter/exit effects. The
//! element is always in one of three states: idle, running a program, or
//! running with a redirect queued behind it. [`Transition::go`] requests a
//! leg; requesting one while a leg is active replaces only the queued slot,
//! which is how an interrupted enter becomes a continuous exit.
//!
//! All stepping happens inside the frame task loop. Each frame, in order: a
//! due pending program is promoted — initialized from the element's
//! *current* interpolated position, never the original endpoints; a due
//! running program takes its final tick and fires its end event; otherwise
//! the position advances through the configured easing.
//!
//! Exits participate in outro groups: the group's deferred teardown runs
//! only after the last exiting sibling finishes. Enters clean up their
//! generated keyframe styles immediately on completion.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::group::OutroGroup;
use super::program::{PendingProgram, Program, TransitionDirection};
use super::style::TransitionTarget;
use crate::easing::{linear, EasingFn};
use crate::frame::TaskHandle;
use crate::runtime::Runtime;
use crate::scheduler::RenderCallback;

/// Timing and rendering parameters for an element's transition.
#[derive(Clone)]
pub struct TransitionConfig {
    /// Milliseconds before a requested leg becomes due.
    pub delay: f64,
    /// Milliseconds for a full 0-to-1 sweep; partial sweeps take
    /// proportionally less.
    pub duration: f64,
    pub easing: EasingFn,
    /// Produces CSS for a given position; legs with `css` run as generated
    /// keyframe animations.
    pub css: Option<Arc<dyn Fn(f64, f64) -> String + Send + Sync>>,
    /// Direct per-frame styling callback, called with `(t, 1 - t)`.
    pub tick: Option<Arc<dyn Fn(f64, f64) + Send + Sync>>,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            delay: 0.0,
            duration: 300.0,
            easing: linear,
            css: None,
            tick: None,
        }
    }
}

impl std::fmt::Debug for TransitionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionConfig")
            .field("delay", &self.delay)
            .field("duration", &self.duration)
            .field("css", &self.css.is_some())
            .field("tick", &self.tick.is_some())
            .finish()
    }
}

/// Lifecycle notifications emitted by a [`Transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionEvent {
    IntroStart,
    IntroEnd,
    OutroStart,
    OutroEnd,
}

fn event_for(direction: TransitionDirection, finished: bool) -> TransitionEvent {
    match (direction, finished) {
        (TransitionDirection::In, false) => TransitionEvent::IntroStart,
        (TransitionDirection::In, true) => TransitionEvent::IntroEnd,
        (TransitionDirection::Out, false) => TransitionEvent::OutroStart,
        (TransitionDirection::Out, true) => TransitionEvent::OutroEnd,
    }
}

struct TransitionState {
    /// Current interpolated position in `[0, 1]`.
    t: f64,
    running: Option<Program>,
    pending: Option<PendingProgram>,
    animation_name: Option<String>,
    listeners: Vec<Arc<dyn Fn(TransitionEvent) + Send + Sync>>,
    task: Option<TaskHandle>,
}

struct TransitionInner<E: TransitionTarget> {
    runtime: Runtime,
    target: E,
    config: TransitionConfig,
    state: Mutex<TransitionState>,
}

/// Per-element enter/exit state machine.
///
/// Cloning shares the machine; markup directives typically hold one clone
/// and event wiring another.
pub struct Transition<E: TransitionTarget> {
    inner: Arc<TransitionInner<E>>,
}

impl<E: TransitionTarget> Clone for Transition<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: TransitionTarget> Transition<E> {
    /// Create a machine for `target`.
    ///
    /// `entering` picks the initial position: `true` for an element that
    /// will animate in from 0, `false` for one sitting visible at 1.
    pub fn new(runtime: &Runtime, target: E, config: TransitionConfig, entering: bool) -> Self {
        Self {
            inner: Arc::new(TransitionInner {
                runtime: runtime.clone(),
                target,
                config,
                state: Mutex::new(TransitionState {
                    t: if entering { 0.0 } else { 1.0 },
                    running: None,
                    pending: None,
                    animation_name: None,
                    listeners: Vec::new(),
                    task: None,
                }),
            }),
        }
    }

    /// Register a lifecycle listener.
    pub fn on_event(&self, listener: impl Fn(TransitionEvent) + Send + Sync + 'static) {
        self.inner.state.lock().listeners.push(Arc::new(listener));
    }

    /// The element's current interpolated position.
    pub fn position(&self) -> f64 {
        self.inner.state.lock().t
    }

    /// Whether a program is running or queued.
    pub fn is_active(&self) -> bool {
        let state = self.inner.state.lock();
        state.running.is_some() || state.pending.is_some()
    }

    /// Request a leg in `direction`.
    ///
    /// Idle elements start immediately: the keyframe rule is generated,
    /// intros take their initial tick, the start event fires after the
    /// current flush settles, and a frame task drives the program. Active
    /// elements are redirected instead — only the pending slot is replaced,
    /// and the superseded leg gets no end event.
    pub fn go(&self, direction: TransitionDirection) {
        let now = self.inner.runtime.now_ms();
        let group = match direction {
            TransitionDirection::Out => {
                let group = self.inner.runtime.current_outro_group();
                if let Some(group) = &group {
                    group.join();
                }
                group
            }
            TransitionDirection::In => None,
        };
        let pending = PendingProgram {
            start: now + self.inner.config.delay,
            direction,
            group,
        };
        {
            let mut state = self.inner.state.lock();
            if state.running.is_some() || state.pending.is_some() {
                tracing::debug!(?direction, "transition redirected");
                state.pending = Some(pending);
                return;
            }
        }
        self.start_leg(pending);
    }

    /// Tear the machine down without events: clear generated styles and
    /// both program slots. The path taken when the element leaves the tree.
    pub fn end(&self) {
        Self::clear_animation(&self.inner);
        let mut state = self.inner.state.lock();
        state.running = None;
        state.pending = None;
        state.task = None;
    }

    fn start_leg(&self, pending: PendingProgram) {
        let inner = &self.inner;
        let config = &inner.config;
        let direction = pending.direction;
        let t = inner.state.lock().t;
        tracing::debug!(?direction, t, "transition started");

        if let Some(css) = &config.css {
            Self::clear_animation(inner);
            let name = inner.target.style_root().create_rule(
                &inner.target,
                t,
                direction.target(),
                config.duration,
                config.delay,
                config.easing,
                css.as_ref(),
            );
            inner.state.lock().animation_name = Some(name);
        }
        if direction == TransitionDirection::In {
            if let Some(tick) = &config.tick {
                (tick.as_ref())(0.0, 1.0);
            }
        }

        let program = Program::init(pending, t, config.duration);
        inner.state.lock().running = Some(program);

        // The start event fires once the mounting flush has settled.
        let weak = Arc::downgrade(inner);
        inner
            .runtime
            .scheduler()
            .add_render_callback(RenderCallback::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Self::dispatch(&inner, event_for(direction, false));
                }
            }));
        inner.runtime.scheduler().schedule_flush();

        let weak = Arc::downgrade(inner);
        let task = inner.runtime.frames().task(move |now| match weak.upgrade() {
            Some(inner) => Self::step(&inner, now),
            None => false,
        });
        inner.state.lock().task = Some(task);
    }

    /// One frame of progress. Returns `true` while any program remains.
    fn step(inner: &Arc<TransitionInner<E>>, now: f64) -> bool {
        let config = &inner.config;

        // Promote a due redirect, initializing from the current position so
        // the motion stays continuous.
        let promoted = {
            let mut state = inner.state.lock();
            if state.pending.as_ref().map_or(false, |p| now > p.start) {
                let pending = state.pending.take().expect("pending program is due");
                let program = Program::init(pending, state.t, config.duration);
                let info = (program.direction, state.t, program.b, program.duration);
                state.running = Some(program);
                Some(info)
            } else {
                None
            }
        };
        if let Some((direction, t, b, duration)) = promoted {
            tracing::debug!(?direction, t, "redirect promoted");
            Self::dispatch(inner, event_for(direction, false));
            if let Some(css) = &config.css {
                Self::clear_animation(inner);
                let name = inner.target.style_root().create_rule(
                    &inner.target,
                    t,
                    b,
                    duration,
                    0.0,
                    config.easing,
                    css.as_ref(),
                );
                inner.state.lock().animation_name = Some(name);
            }
        }

        enum Outcome {
            Finished {
                t: f64,
                direction: TransitionDirection,
                group: Option<OutroGroup>,
                redirected: bool,
            },
            Advanced {
                t: f64,
            },
            Idle,
        }

        let outcome = {
            let mut state = inner.state.lock();
            let state = &mut *state;
            match &state.running {
                Some(program) if now >= program.end => {
                    state.t = program.b;
                    let outcome = Outcome::Finished {
                        t: state.t,
                        direction: program.direction,
                        group: program.group.clone(),
                        redirected: state.pending.is_some(),
                    };
                    state.running = None;
                    outcome
                }
                Some(program) if now >= program.start => {
                    let p = (now - program.start) / program.duration;
                    state.t = program.a + program.d * (config.easing)(p);
                    Outcome::Advanced { t: state.t }
                }
                _ => Outcome::Idle,
            }
        };

        match outcome {
            Outcome::Finished {
                t,
                direction,
                group,
                redirected,
            } => {
                if let Some(tick) = &config.tick {
                    (tick.as_ref())(t, 1.0 - t);
                }
                tracing::debug!(?direction, "transition finished");
                Self::dispatch(inner, event_for(direction, true));
                if !redirected {
                    match direction {
                        // Finished enters drop their generated styles now.
                        TransitionDirection::In => Self::clear_animation(inner),
                        // Finished exits report to their group; the last one
                        // out triggers the deferred teardown.
                        TransitionDirection::Out => {
                            if let Some(group) = group {
                                group.leave();
                            }
                        }
                    }
                }
            }
            Outcome::Advanced { t } => {
                if let Some(tick) = &config.tick {
                    (tick.as_ref())(t, 1.0 - t);
                }
            }
            Outcome::Idle => {}
        }

        let state = inner.state.lock();
        state.running.is_some() || state.pending.is_some()
    }

    fn dispatch(inner: &Arc<TransitionInner<E>>, event: TransitionEvent) {
        let listeners = inner.state.lock().listeners.clone();
        tracing::trace!(?event, "transition event");
        for listener in listeners {
            (listener.as_ref())(event);
        }
    }

    fn clear_animation(inner: &Arc<TransitionInner<E>>) {
        let name = inner.state.lock().animation_name.take();
        if let Some(name) = name {
            inner
                .target
                .style_root()
                .delete_rule(&inner.target, Some(&name), inner.runtime.frames());
        }
    }
}

impl<E: TransitionTarget> std::fmt::Debug for Transition<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Transition")
            .field("t", &state.t)
            .field("running", &state.running.is_some())
            .field("pending", &state.pending.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::easing::linear;
    use crate::transition::testutil::TestElement;
    use crate::transition::StyleRoot;
    use crate::Runtime;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tick_recorder() -> (Arc<Mutex<Vec<f64>>>, Arc<dyn Fn(f64, f64) + Send + Sync>) {
        let ticks: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = ticks.clone();
        (ticks, Arc::new(move |t, _u| sink.lock().push(t)))
    }

    fn harness() -> (Runtime, crate::HeadlessHandles) {
        Runtime::headless()
    }

    #[test]
    fn intro_runs_to_completion_with_events() {
        let (runtime, handles) = harness();
        let root = StyleRoot::new();
        let element = TestElement::new(&root);
        let (ticks, tick) = tick_recorder();
        let transition = Transition::new(
            &runtime,
            element,
            TransitionConfig {
                duration: 100.0,
                easing: linear,
                tick: Some(tick),
                ..TransitionConfig::default()
            },
            true,
        );

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        transition.on_event(move |event| sink.lock().push(event));

        transition.go(TransitionDirection::In);
        // The initial tick applies immediately; the start event waits for
        // the flush.
        assert_eq!(*ticks.lock(), vec![0.0]);
        handles.microtasks.drain();
        assert_eq!(*events.lock(), vec![TransitionEvent::IntroStart]);

        handles.clock.advance(50.0);
        runtime.advance_frame();
        assert!((transition.position() - 0.5).abs() < 1e-9);

        handles.clock.advance(60.0);
        runtime.advance_frame();
        assert_eq!(transition.position(), 1.0);
        assert_eq!(
            *events.lock(),
            vec![TransitionEvent::IntroStart, TransitionEvent::IntroEnd]
        );
        assert!(!transition.is_active());
    }

    #[test]
    fn redirect_starts_from_the_current_position() {
        let (runtime, handles) = harness();
        let root = StyleRoot::new();
        let element = TestElement::new(&root);
        let (ticks, tick) = tick_recorder();
        let transition = Transition::new(
            &runtime,
            element,
            TransitionConfig {
                duration: 100.0,
                easing: linear,
                tick: Some(tick),
                ..TransitionConfig::default()
            },
            true,
        );

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        transition.on_event(move |event| sink.lock().push(event));

        transition.go(TransitionDirection::In);
        handles.microtasks.drain();

        handles.clock.advance(60.0);
        runtime.advance_frame();
        let mid = transition.position();
        assert!((mid - 0.6).abs() < 1e-9);

        // Redirect mid-flight; the intro never fires an end event.
        transition.go(TransitionDirection::Out);
        handles.clock.advance(1.0);
        runtime.advance_frame();
        assert_eq!(
            *events.lock(),
            vec![TransitionEvent::IntroStart, TransitionEvent::OutroStart]
        );
        // The exit leg took over from the interrupted position, not 1.0.
        assert!(transition.position() <= mid);
        assert!(transition.position() > 0.0);

        // Distance 0.6 at 100ms per unit sweep: about 60ms to finish.
        handles.clock.advance(70.0);
        runtime.advance_frame();
        assert_eq!(transition.position(), 0.0);
        assert_eq!(
            events.lock().last(),
            Some(&TransitionEvent::OutroEnd)
        );
        // Ticks never jumped outside the interrupted range.
        assert!(ticks.lock().iter().all(|t| *t <= mid + 1e-9));
    }

    #[test]
    fn redirect_while_pending_replaces_the_pending_slot() {
        let (runtime, handles) = harness();
        let root = StyleRoot::new();
        let element = TestElement::new(&root);
        let transition = Transition::new(
            &runtime,
            element,
            TransitionConfig {
                duration: 100.0,
                ..TransitionConfig::default()
            },
            true,
        );

        transition.go(TransitionDirection::In);
        transition.go(TransitionDirection::Out);
        transition.go(TransitionDirection::In);
        assert!(transition.is_active());

        // Only the latest redirect is honored once the running leg ends.
        handles.clock.advance(150.0);
        runtime.advance_frame();
        handles.clock.advance(1.0);
        runtime.advance_frame();
        handles.clock.advance(200.0);
        runtime.advance_frame();
        assert_eq!(transition.position(), 1.0);
        assert!(!transition.is_active());
    }

    #[test]
    fn end_clears_silently() {
        let (runtime, handles) = harness();
        let root = StyleRoot::new();
        let element = TestElement::new(&root);
        let transition = Transition::new(
            &runtime,
            element,
            TransitionConfig {
                duration: 100.0,
                ..TransitionConfig::default()
            },
            false,
        );

        let events = Arc::new(AtomicUsize::new(0));
        let counter = events.clone();
        transition.on_event(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        transition.go(TransitionDirection::Out);
        transition.end();
        assert!(!transition.is_active());

        // The frame task notices the cleared state and retires; no events
        // beyond the pending start dispatch are emitted.
        handles.clock.advance(200.0);
        runtime.advance_frame();
        assert_eq!(runtime.frames().task_count(), 0);
        handles.microtasks.drain();
        assert!(events.load(Ordering::SeqCst) <= 1);
    }

    #[test]
    fn css_legs_manage_keyframe_rules() {
        let (runtime, handles) = harness();
        let root = StyleRoot::new();
        let element = TestElement::new(&root);
        let transition = Transition::new(
            &runtime,
            element.clone(),
            TransitionConfig {
                duration: 100.0,
                css: Some(Arc::new(|t, _u| format!("opacity: {t};"))),
                ..TransitionConfig::default()
            },
            true,
        );

        transition.go(TransitionDirection::In);
        assert_eq!(root.rule_count(), 1);
        assert!(element.animation().contains("__ripple_"));

        handles.clock.advance(150.0);
        runtime.advance_frame();
        // Finished intro: animation detached, rule swept on the idle frame.
        assert_eq!(element.animation(), "");
        runtime.advance_frame();
        assert_eq!(root.rule_count(), 0);
    }
}
