//! Runtime Facade
//!
//! A [`Runtime`] owns exactly one of each shared resource: the update
//! scheduler, the frame task loop, the outro-group stack, and the clock.
//! Two UI trees handed the same runtime share one scheduler and one frame
//! loop; independent runtimes (say, one per test) never touch each other's
//! state — there are no process-wide singletons behind this type.

use std::sync::Arc;

use crate::frame::{Clock, FrameHost, FrameLoop, ManualClock, ManualFrames, MonotonicClock};
use crate::scheduler::{MicrotaskHost, Scheduler, TaskQueue};
use crate::transition::{OutroGroup, OutroStack};

struct RuntimeInner {
    scheduler: Scheduler,
    frames: FrameLoop,
    clock: Arc<dyn Clock>,
    outros: OutroStack,
}

/// One runtime instance: scheduler, frame loop, outro stack, clock.
///
/// Cloning shares the instance.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

/// Configures the hosts a [`Runtime`] is wired to.
#[derive(Default)]
pub struct RuntimeBuilder {
    microtasks: Option<Arc<dyn MicrotaskHost>>,
    frames: Option<Arc<dyn FrameHost>>,
    clock: Option<Arc<dyn Clock>>,
}

impl RuntimeBuilder {
    /// Defer flushes through `host` instead of the default [`TaskQueue`].
    pub fn microtask_host(mut self, host: Arc<dyn MicrotaskHost>) -> Self {
        self.microtasks = Some(host);
        self
    }

    /// Request animation frames from `host` instead of the default
    /// [`ManualFrames`].
    pub fn frame_host(mut self, host: Arc<dyn FrameHost>) -> Self {
        self.frames = Some(host);
        self
    }

    /// Source timestamps from `clock` instead of a [`MonotonicClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the runtime.
    pub fn build(self) -> Runtime {
        let microtasks = self
            .microtasks
            .unwrap_or_else(|| Arc::new(TaskQueue::new()));
        let frames = self.frames.unwrap_or_else(|| Arc::new(ManualFrames::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        Runtime {
            inner: Arc::new(RuntimeInner {
                scheduler: Scheduler::new(microtasks),
                frames: FrameLoop::new(frames),
                clock,
                outros: OutroStack::new(),
            }),
        }
    }
}

/// The typed host handles behind [`Runtime::headless`].
pub struct HeadlessHandles {
    pub microtasks: Arc<TaskQueue>,
    pub frame_host: Arc<ManualFrames>,
    pub clock: Arc<ManualClock>,
}

impl Runtime {
    /// A runtime on default hosts (job queue, manual frames, wall clock).
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start configuring a runtime.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// A fully deterministic runtime plus the handles that drive it:
    /// a drainable microtask queue, a manual frame host, and a manual
    /// clock. The standard harness for tests and headless embeddings.
    pub fn headless() -> (Self, HeadlessHandles) {
        let microtasks = Arc::new(TaskQueue::new());
        let frame_host = Arc::new(ManualFrames::new());
        let clock = Arc::new(ManualClock::new());
        let runtime = Self::builder()
            .microtask_host(microtasks.clone())
            .frame_host(frame_host.clone())
            .clock(clock.clone())
            .build();
        (
            runtime,
            HeadlessHandles {
                microtasks,
                frame_host,
                clock,
            },
        )
    }

    /// The runtime's update scheduler.
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// The runtime's frame task loop.
    pub fn frames(&self) -> &FrameLoop {
        &self.inner.frames
    }

    /// The runtime's clock.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.inner.clock)
    }

    /// Current clock reading in milliseconds.
    pub fn now_ms(&self) -> f64 {
        self.inner.clock.now_ms()
    }

    /// Step the frame loop once at the current clock reading.
    pub fn advance_frame(&self) {
        self.inner.frames.run_frame(self.now_ms());
    }

    /// Open an outro group. Exits requested from here on join it.
    pub fn group_outros(&self) {
        self.inner.outros.open();
    }

    /// Close the current outro group. Deferred callbacks run now if no
    /// member is still exiting, otherwise when the last one finishes.
    pub fn check_outros(&self) {
        self.inner.outros.close();
    }

    /// The innermost open outro group, if any.
    pub fn current_outro_group(&self) -> Option<OutroGroup> {
        self.inner.outros.current()
    }

    /// Defer `callback` until the current outro group completes; with no
    /// group open it runs immediately.
    pub fn after_outros(&self, callback: impl FnOnce() + Send + 'static) {
        match self.current_outro_group() {
            Some(group) => group.defer(callback),
            None => callback(),
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("scheduler", &self.inner.scheduler)
            .field("frames", &self.inner.frames)
            .finish()
    }
}
