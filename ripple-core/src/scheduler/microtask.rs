//! Microtask Host
//!
//! The scheduler defers its flush to "after the current turn" through the
//! host's microtask mechanism. Embedders with a real event loop implement
//! [`MicrotaskHost`] over it; [`TaskQueue`] is the default host — a FIFO the
//! embedder drains at its turn boundary.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// One deferred job.
pub type Microtask = Box<dyn FnOnce() + Send>;

/// Something that can run a job after the current synchronous turn.
pub trait MicrotaskHost: Send + Sync {
    /// Enqueue `job` to run when the turn completes.
    fn enqueue(&self, job: Microtask);
}

/// Default microtask host: a FIFO job queue drained by the embedder.
#[derive(Default)]
pub struct TaskQueue {
    jobs: Mutex<VecDeque<Microtask>>,
}

impl TaskQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run queued jobs until none remain, including jobs enqueued while
    /// draining.
    pub fn drain(&self) {
        loop {
            let job = self.jobs.lock().pop_front();
            match job {
                Some(job) => job(),
                None => break,
            }
        }
    }

    /// Number of jobs currently waiting.
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Whether no jobs are waiting.
    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

impl MicrotaskHost for TaskQueue {
    fn enqueue(&self, job: Microtask) {
        self.jobs.lock().push_back(job);
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.len())
            .finish()
    }
}
