//! Update Scheduler
//!
//! The scheduler batches component reconciliation. Marking a component dirty
//! queues it; the first mark of a turn schedules one flush through the
//! host's microtask mechanism; the flush drains everything that is dirty by
//! the time it runs.
//!
//! # Flush algorithm
//!
//! 1. Walk the dirty queue in insertion order (generated code marks parents
//!    before children): run each component's before-update hooks, then its
//!    reconciliation closure with the dirty mask.
//! 2. Run deferred binding callbacks (element-reference writes), last
//!    registered first.
//! 3. Run render-complete callbacks, each at most once per flush — a
//!    callback re-armed during its own execution is skipped for the rest of
//!    this flush. These may dirty more components, which restarts step 1.
//! 4. With nothing left dirty, run the one-shot after-flush callbacks and
//!    clear the per-flush seen set.
//!
//! # Reentrancy
//!
//! Exactly one flush is in flight per scheduler instance. A `flush` call
//! made while one is running returns immediately; because the queue and its
//! cursor are shared rather than stack-local, components dirtied mid-flush
//! are still picked up by the active run. A panic anywhere in the flush
//! clears all scheduler state and resumes unwinding — no partial retry.

mod component;
mod microtask;

pub use component::{Component, ComponentId, DirtyMask};
pub use microtask::{Microtask, MicrotaskHost, TaskQueue};

use std::collections::HashSet;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Counter for generating unique render-callback IDs.
static RENDER_CALLBACK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A render-complete callback with a stable identity.
///
/// The identity is what the per-flush seen set deduplicates on: re-adding a
/// clone of an already-run callback within one flush is a no-op.
#[derive(Clone)]
pub struct RenderCallback {
    id: u64,
    run: Arc<dyn Fn() + Send + Sync>,
}

impl RenderCallback {
    /// Wrap `run` with a fresh identity.
    pub fn new(run: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            id: RENDER_CALLBACK_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            run: Arc::new(run),
        }
    }
}

impl std::fmt::Debug for RenderCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCallback").field("id", &self.id).finish()
    }
}

struct SchedulerState {
    dirty: Vec<Component>,
    cursor: usize,
    flushing: bool,
    scheduled: bool,
    binding_callbacks: Vec<Box<dyn FnOnce() + Send>>,
    render_callbacks: Vec<RenderCallback>,
    after_flush: Vec<Box<dyn FnOnce() + Send>>,
    seen: HashSet<u64>,
}

struct SchedulerInner {
    host: Arc<dyn MicrotaskHost>,
    state: Mutex<SchedulerState>,
}

/// The per-runtime update scheduler.
///
/// Cloning shares the instance; independent `Scheduler` values never share
/// state, which is what allows multiple runtimes in one process.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Create a scheduler deferring flushes through `host`.
    pub fn new(host: Arc<dyn MicrotaskHost>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                host,
                state: Mutex::new(SchedulerState {
                    dirty: Vec::new(),
                    cursor: 0,
                    flushing: false,
                    scheduled: false,
                    binding_callbacks: Vec::new(),
                    render_callbacks: Vec::new(),
                    after_flush: Vec::new(),
                    seen: HashSet::new(),
                }),
            }),
        }
    }

    pub(crate) fn enqueue(&self, component: Component) {
        self.inner.state.lock().dirty.push(component);
        self.schedule_flush();
    }

    /// Arrange exactly one flush after the current turn.
    ///
    /// Idempotent: further calls before that flush runs are no-ops.
    pub fn schedule_flush(&self) {
        let arm = {
            let mut state = self.inner.state.lock();
            if state.scheduled {
                false
            } else {
                state.scheduled = true;
                true
            }
        };
        if arm {
            let scheduler = self.clone();
            self.inner.host.enqueue(Box::new(move || scheduler.flush()));
        }
    }

    /// Add a render-complete callback for the current or next flush.
    pub fn add_render_callback(&self, callback: RenderCallback) {
        self.inner.state.lock().render_callbacks.push(callback);
    }

    /// Defer an "apply last" callback to the binding stage of the current or
    /// next flush.
    pub fn add_binding_callback(&self, callback: impl FnOnce() + Send + 'static) {
        self.inner
            .state
            .lock()
            .binding_callbacks
            .push(Box::new(callback));
    }

    /// Run `callback` once, after the next flush fully settles.
    pub fn after_flush(&self, callback: impl FnOnce() + Send + 'static) {
        self.inner.state.lock().after_flush.push(Box::new(callback));
        self.schedule_flush();
    }

    /// Process everything currently dirty.
    ///
    /// Reentrant calls return immediately; the active run observes newly
    /// dirtied components through the shared queue. On panic, all scheduler
    /// state is cleared and unwinding resumes.
    pub fn flush(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.flushing {
                return;
            }
            state.flushing = true;
        }
        let outcome = catch_unwind(AssertUnwindSafe(|| self.run_flush()));
        if let Err(payload) = outcome {
            self.clear_after_panic();
            resume_unwind(payload);
        }
    }

    fn run_flush(&self) {
        tracing::debug!(
            dirty = self.inner.state.lock().dirty.len(),
            "flush started"
        );
        loop {
            // Step 1: drain the dirty queue through the shared cursor.
            loop {
                let component = {
                    let mut state = self.inner.state.lock();
                    if state.cursor < state.dirty.len() {
                        let component = state.dirty[state.cursor].clone();
                        state.cursor += 1;
                        Some(component)
                    } else {
                        None
                    }
                };
                match component {
                    Some(component) => component.run_update(),
                    None => break,
                }
            }
            {
                let mut state = self.inner.state.lock();
                state.dirty.clear();
                state.cursor = 0;
            }

            // Step 2: binding callbacks, last registered first.
            loop {
                let callback = self.inner.state.lock().binding_callbacks.pop();
                match callback {
                    Some(callback) => callback(),
                    None => break,
                }
            }

            // Step 3: render-complete callbacks, deduplicated per flush. The
            // list may grow while it is walked.
            let mut index = 0;
            loop {
                let callback = {
                    let state = self.inner.state.lock();
                    state.render_callbacks.get(index).cloned()
                };
                let Some(callback) = callback else {
                    break;
                };
                let fresh = self.inner.state.lock().seen.insert(callback.id);
                if fresh {
                    (callback.run.as_ref())();
                }
                index += 1;
            }
            self.inner.state.lock().render_callbacks.clear();

            if self.inner.state.lock().dirty.is_empty() {
                break;
            }
        }

        // Step 4: one-shot after-flush callbacks, last registered first.
        loop {
            let callback = self.inner.state.lock().after_flush.pop();
            match callback {
                Some(callback) => callback(),
                None => break,
            }
        }

        let mut state = self.inner.state.lock();
        state.scheduled = false;
        state.flushing = false;
        state.seen.clear();
        tracing::debug!("flush finished");
    }

    fn clear_after_panic(&self) {
        let mut state = self.inner.state.lock();
        state.dirty.clear();
        state.cursor = 0;
        state.flushing = false;
        state.scheduled = false;
        state.binding_callbacks.clear();
        state.render_callbacks.clear();
        state.after_flush.clear();
        state.seen.clear();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Scheduler")
            .field("dirty", &state.dirty.len())
            .field("flushing", &state.flushing)
            .field("scheduled", &state.scheduled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler_with_queue() -> (Scheduler, Arc<TaskQueue>) {
        let queue = Arc::new(TaskQueue::new());
        (Scheduler::new(queue.clone()), queue)
    }

    #[test]
    fn schedule_flush_is_idempotent_per_turn() {
        let (scheduler, queue) = scheduler_with_queue();
        let component = Component::new(&scheduler);
        component.set_update(|_| {});
        component.mark_dirty(0);
        component.mark_dirty(1);
        assert_eq!(queue.len(), 1);
        queue.drain();
        // A fresh turn arms a fresh flush.
        component.mark_dirty(2);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn flush_passes_the_accumulated_dirty_mask() {
        let (scheduler, _queue) = scheduler_with_queue();
        let component = Component::new(&scheduler);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        component.set_update(move |mask: &DirtyMask| {
            sink.lock().push((mask.contains(0), mask.contains(3), mask.contains(7)));
        });
        component.mark_dirty(0);
        component.mark_dirty(3);
        scheduler.flush();
        assert_eq!(*seen.lock(), vec![(true, true, false)]);

        // The mask is reusable and starts clean on the next turn.
        component.mark_dirty(7);
        scheduler.flush();
        assert_eq!(*seen.lock(), vec![(true, true, false), (false, false, true)]);
    }

    #[test]
    fn components_dirtied_mid_flush_run_in_the_same_flush() {
        let (scheduler, _queue) = scheduler_with_queue();
        let first = Component::new(&scheduler);
        let second = Component::new(&scheduler);
        let order = Arc::new(Mutex::new(Vec::new()));

        let second_handle = second.clone();
        let first_sink = order.clone();
        first.set_update(move |_| {
            first_sink.lock().push("first");
            second_handle.mark_dirty(0);
        });
        let second_sink = order.clone();
        second.set_update(move |_| {
            second_sink.lock().push("second");
        });

        first.mark_dirty(0);
        scheduler.flush();
        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[test]
    fn before_update_runs_ahead_of_reconciliation_in_queue_order() {
        let (scheduler, _queue) = scheduler_with_queue();
        let parent = Component::new(&scheduler);
        let child = Component::new(&scheduler);
        let order = Arc::new(Mutex::new(Vec::new()));

        for (component, name) in [(&parent, "parent"), (&child, "child")] {
            let pre = order.clone();
            component.before_update(move || pre.lock().push(format!("{name}:before")));
            let upd = order.clone();
            component.set_update(move |_| upd.lock().push(format!("{name}:update")));
        }

        parent.mark_dirty(0);
        child.mark_dirty(0);
        scheduler.flush();
        assert_eq!(
            *order.lock(),
            vec!["parent:before", "parent:update", "child:before", "child:update"]
        );
    }

    #[test]
    fn render_callbacks_run_once_per_flush() {
        let (scheduler, _queue) = scheduler_with_queue();
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        let callback = RenderCallback::new(move || *counter.lock() += 1);

        scheduler.add_render_callback(callback.clone());
        scheduler.add_render_callback(callback.clone());
        scheduler.flush();
        assert_eq!(*hits.lock(), 1);

        // The seen set resets between flushes.
        scheduler.add_render_callback(callback);
        scheduler.flush();
        assert_eq!(*hits.lock(), 2);
    }

    #[test]
    fn render_callback_rearmed_during_its_own_run_is_skipped_this_flush() {
        let (scheduler, _queue) = scheduler_with_queue();
        let component = Component::new(&scheduler);
        component.set_update(|_| {});
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        let trigger = component.clone();
        component.after_update(move || {
            *counter.lock() += 1;
            // Dirties the component again, which re-arms this hook within
            // the same flush.
            if *counter.lock() == 1 {
                trigger.mark_dirty(0);
            }
        });

        component.mark_dirty(0);
        scheduler.flush();
        assert_eq!(*hits.lock(), 1);

        component.mark_dirty(0);
        scheduler.flush();
        assert_eq!(*hits.lock(), 2);
    }

    #[test]
    fn binding_callbacks_run_in_reverse_registration_order() {
        let (scheduler, _queue) = scheduler_with_queue();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["outer", "inner"] {
            let order = order.clone();
            scheduler.add_binding_callback(move || order.lock().push(tag));
        }
        scheduler.flush();
        assert_eq!(*order.lock(), vec!["inner", "outer"]);
    }

    #[test]
    fn after_flush_callbacks_run_once_when_everything_settles() {
        let (scheduler, _queue) = scheduler_with_queue();
        let component = Component::new(&scheduler);
        let order = Arc::new(Mutex::new(Vec::new()));
        let upd = order.clone();
        component.set_update(move |_| upd.lock().push("update"));
        let post = order.clone();
        scheduler.after_flush(move || post.lock().push("settled"));

        component.mark_dirty(0);
        scheduler.flush();
        assert_eq!(*order.lock(), vec!["update", "settled"]);

        // One-shot: a later flush does not re-run it.
        component.mark_dirty(0);
        scheduler.flush();
        assert_eq!(*order.lock(), vec!["update", "settled", "update"]);
    }

    #[test]
    fn initial_mount_render_callbacks_run_child_before_parent() {
        let (scheduler, _queue) = scheduler_with_queue();
        let parent = Component::new(&scheduler);
        let child = Component::new(&scheduler);
        let order = Arc::new(Mutex::new(Vec::new()));

        let child_sink = order.clone();
        child.after_update(move || child_sink.lock().push("child"));
        let parent_sink = order.clone();
        parent.after_update(move || parent_sink.lock().push("parent"));

        // Generated code mounts depth-first: children complete first.
        child.mount();
        parent.mount();
        scheduler.flush();
        assert_eq!(*order.lock(), vec!["child", "parent"]);
    }

    #[test]
    fn panic_during_flush_clears_all_state() {
        let (scheduler, _queue) = scheduler_with_queue();
        let component = Component::new(&scheduler);
        component.set_update(|_| panic!("reconciliation failed"));
        component.mark_dirty(0);

        let result = catch_unwind(AssertUnwindSafe(|| scheduler.flush()));
        assert!(result.is_err());

        // The batch is gone; a fresh flush has nothing to do and does not
        // re-panic.
        scheduler.flush();
    }
}
