//! Frame Task Loop
//!
//! A generic scheduler for repeating animation work. Tasks are closures
//! invoked once per animation frame with the frame timestamp; a task that
//! returns `false` is finished and its completion callbacks run. While at
//! least one task is registered the loop keeps exactly one frame request
//! outstanding with its [`FrameHost`]; registering a task while the loop is
//! already running never issues a second concurrent request.
//!
//! The host drives the loop by calling [`FrameLoop::run_frame`] with the
//! current timestamp each time a requested frame fires. Hosts are free to
//! delay or skip frames under load; nothing here assumes a fixed rate.
//!
//! [`TaskHandle::abort`] removes a task without completing it — its done
//! callbacks never run. That asymmetry is deliberate: completion means the
//! task observed its own end, abort means somebody else withdrew it.

mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Counter for generating unique frame task IDs.
static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a frame task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        Self(TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Something that can deliver animation-frame callbacks.
///
/// `request_frame` asks for a single future call to
/// [`FrameLoop::run_frame`]; the loop re-requests after every frame it
/// still has work for.
pub trait FrameHost: Send + Sync {
    /// Request one animation-frame callback.
    fn request_frame(&self);
}

/// A frame host that records requests for the embedder to satisfy by hand.
#[derive(Default)]
pub struct ManualFrames {
    requested: AtomicBool,
}

impl ManualFrames {
    /// Create a host with no outstanding request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a frame request is outstanding.
    pub fn requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Consume the outstanding request, if any.
    pub fn take(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }
}

impl FrameHost for ManualFrames {
    fn request_frame(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Running,
    Done,
    Aborted,
}

struct TaskShared {
    state: Mutex<TaskStateInner>,
}

struct TaskStateInner {
    state: TaskState,
    on_done: Vec<Box<dyn FnOnce() + Send>>,
}

struct FrameTask {
    id: TaskId,
    tick: Box<dyn FnMut(f64) -> bool + Send>,
    shared: Arc<TaskShared>,
}

struct FrameLoopInner {
    host: Arc<dyn FrameHost>,
    tasks: Mutex<Vec<FrameTask>>,
    running: AtomicBool,
}

/// Handle to a registered frame task.
#[derive(Clone)]
pub struct TaskHandle {
    id: TaskId,
    frames: Weak<FrameLoopInner>,
    shared: Arc<TaskShared>,
}

impl TaskHandle {
    /// Get the task's unique ID.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Remove the task without completing it. Done callbacks are discarded
    /// and will never run. A no-op once the task has finished.
    pub fn abort(&self) {
        if let Some(frames) = self.frames.upgrade() {
            frames.tasks.lock().retain(|task| task.id != self.id);
        }
        let mut state = self.shared.state.lock();
        if state.state == TaskState::Running {
            state.state = TaskState::Aborted;
            state.on_done.clear();
            tracing::trace!(task = self.id.0, "frame task aborted");
        }
    }

    /// Run `callback` when the task finishes by returning `false` from its
    /// tick. Runs immediately if it already has; never runs if the task is
    /// aborted.
    pub fn on_done(&self, callback: impl FnOnce() + Send + 'static) {
        let run_now = {
            let mut state = self.shared.state.lock();
            match state.state {
                TaskState::Running => {
                    state.on_done.push(Box::new(callback));
                    None
                }
                TaskState::Done => Some(callback),
                TaskState::Aborted => None,
            }
        };
        if let Some(callback) = run_now {
            callback();
        }
    }

    /// Whether the task finished via its tick.
    pub fn is_done(&self) -> bool {
        self.shared.state.lock().state == TaskState::Done
    }

    /// Whether the task was aborted.
    pub fn is_aborted(&self) -> bool {
        self.shared.state.lock().state == TaskState::Aborted
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("state", &self.shared.state.lock().state)
            .finish()
    }
}

/// The per-runtime frame task loop.
///
/// Cloning shares the instance: all transitions and tweens of one runtime
/// step through the same registry and the same host.
#[derive(Clone)]
pub struct FrameLoop {
    inner: Arc<FrameLoopInner>,
}

impl FrameLoop {
    /// Create a loop over `host`.
    pub fn new(host: Arc<dyn FrameHost>) -> Self {
        Self {
            inner: Arc::new(FrameLoopInner {
                host,
                tasks: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Register a repeating task.
    ///
    /// `tick` receives each frame's timestamp and keeps the task alive by
    /// returning `true`. Registration while the loop is already running
    /// joins the in-flight frame cycle without a second request.
    pub fn task(&self, tick: impl FnMut(f64) -> bool + Send + 'static) -> TaskHandle {
        let id = TaskId::next();
        let shared = Arc::new(TaskShared {
            state: Mutex::new(TaskStateInner {
                state: TaskState::Running,
                on_done: Vec::new(),
            }),
        });
        self.inner.tasks.lock().push(FrameTask {
            id,
            tick: Box::new(tick),
            shared: Arc::clone(&shared),
        });
        tracing::trace!(task = id.0, "frame task registered");
        if !self.inner.running.swap(true, Ordering::SeqCst) {
            self.inner.host.request_frame();
        }
        TaskHandle {
            id,
            frames: Arc::downgrade(&self.inner),
            shared,
        }
    }

    /// Step every registered task with the frame timestamp `now_ms`.
    ///
    /// Tasks registered by a tick during this call are stepped in the same
    /// frame. After the pass the loop re-requests a frame if tasks remain,
    /// otherwise it goes idle.
    pub fn run_frame(&self, now_ms: f64) {
        let mut index = 0;
        loop {
            let task = {
                let mut tasks = self.inner.tasks.lock();
                if index < tasks.len() {
                    Some(tasks.remove(index))
                } else {
                    None
                }
            };
            let Some(mut task) = task else {
                break;
            };
            let keep = (task.tick)(now_ms);
            if task.shared.state.lock().state == TaskState::Aborted {
                // Aborted from inside its own tick; drop it.
                continue;
            }
            if keep {
                self.inner.tasks.lock().insert(index, task);
                index += 1;
            } else {
                let callbacks = {
                    let mut state = task.shared.state.lock();
                    state.state = TaskState::Done;
                    std::mem::take(&mut state.on_done)
                };
                tracing::trace!(task = task.id.0, "frame task finished");
                for callback in callbacks {
                    callback();
                }
            }
        }

        if self.inner.tasks.lock().is_empty() {
            self.inner.running.store(false, Ordering::SeqCst);
        } else {
            self.inner.host.request_frame();
        }
    }

    /// Number of registered tasks.
    pub fn task_count(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    /// Whether the loop currently holds a frame request.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for FrameLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameLoop")
            .field("tasks", &self.task_count())
            .field("running", &self.is_running())
            .finish()
    }
}
