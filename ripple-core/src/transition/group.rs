//! Outro Groups
//!
//! When a set of sibling elements is replaced, every sibling animates out
//! and the actual removal must wait until the *last* one finishes. An outro
//! group is the meeting point: each exit joins the group, teardown callbacks
//! queue on it, and the callbacks run exactly once — when the member count
//! reaches zero, or immediately at close time if nothing joined.
//!
//! Groups form a stack per runtime: opening a group while one is open
//! pushes a frame with a parent pointer, so nested replacements coordinate
//! independently.

use std::sync::Arc;

use parking_lot::Mutex;

struct GroupState {
    pending: usize,
    callbacks: Vec<Box<dyn FnOnce() + Send>>,
    parent: Option<OutroGroup>,
}

/// A set of sibling exits whose completion gates shared teardown.
///
/// Cloning shares the group.
#[derive(Clone)]
pub struct OutroGroup {
    inner: Arc<Mutex<GroupState>>,
}

impl OutroGroup {
    fn new(parent: Option<OutroGroup>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(GroupState {
                pending: 0,
                callbacks: Vec::new(),
                parent,
            })),
        }
    }

    /// Number of members still animating out.
    pub fn pending(&self) -> usize {
        self.inner.lock().pending
    }

    /// Queue a callback to run when every member has finished.
    pub fn defer(&self, callback: impl FnOnce() + Send + 'static) {
        self.inner.lock().callbacks.push(Box::new(callback));
    }

    /// A new member's exit has started.
    pub(crate) fn join(&self) {
        self.inner.lock().pending += 1;
    }

    /// A member's exit has finished. Each member leaves exactly once; the
    /// last one out runs the queued callbacks.
    pub(crate) fn leave(&self) {
        let callbacks = {
            let mut state = self.inner.lock();
            debug_assert!(state.pending > 0, "outro group leave without join");
            state.pending = state.pending.saturating_sub(1);
            if state.pending == 0 {
                std::mem::take(&mut state.callbacks)
            } else {
                Vec::new()
            }
        };
        if !callbacks.is_empty() {
            tracing::debug!("outro group complete, running deferred teardown");
        }
        for callback in callbacks {
            callback();
        }
    }

    fn parent(&self) -> Option<OutroGroup> {
        self.inner.lock().parent.clone()
    }

    /// Drain the callbacks if nothing joined (or everything already left).
    fn take_if_idle(&self) -> Vec<Box<dyn FnOnce() + Send>> {
        let mut state = self.inner.lock();
        if state.pending == 0 {
            std::mem::take(&mut state.callbacks)
        } else {
            Vec::new()
        }
    }
}

impl std::fmt::Debug for OutroGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("OutroGroup")
            .field("pending", &state.pending)
            .field("callbacks", &state.callbacks.len())
            .finish()
    }
}

/// The per-runtime stack of open outro groups.
#[derive(Default)]
pub(crate) struct OutroStack {
    current: Mutex<Option<OutroGroup>>,
}

impl OutroStack {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Push a fresh group; exits started from here on join it.
    pub(crate) fn open(&self) {
        let mut current = self.current.lock();
        let parent = current.take();
        *current = Some(OutroGroup::new(parent));
    }

    /// Pop the current group. If no member is still pending, its callbacks
    /// run now, synchronously; otherwise the last member to leave runs them.
    ///
    /// # Panics
    ///
    /// Panics when no group is open — opens and closes must pair up.
    pub(crate) fn close(&self) {
        let group = {
            let mut current = self.current.lock();
            let group = current
                .take()
                .expect("outro group closed while none is open");
            *current = group.parent();
            group
        };
        let callbacks = group.take_if_idle();
        for callback in callbacks {
            callback();
        }
    }

    /// The innermost open group, if any.
    pub(crate) fn current(&self) -> Option<OutroGroup> {
        self.current.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn empty_group_runs_callbacks_synchronously_at_close() {
        let stack = OutroStack::new();
        let hits = Arc::new(AtomicUsize::new(0));
        stack.open();
        let counter = hits.clone();
        stack
            .current()
            .expect("group is open")
            .defer(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        stack.close();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callbacks_wait_for_every_member() {
        let stack = OutroStack::new();
        let hits = Arc::new(AtomicUsize::new(0));
        stack.open();
        let group = stack.current().expect("group is open");
        group.join();
        group.join();
        group.join();
        let counter = hits.clone();
        group.defer(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        stack.close();
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        group.leave();
        group.leave();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        group.leave();
        // Exactly once, after the final member.
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn groups_nest_with_parent_pointers() {
        let stack = OutroStack::new();
        stack.open();
        let outer = stack.current().expect("outer open");
        stack.open();
        let inner = stack.current().expect("inner open");
        assert!(!Arc::ptr_eq(&outer.inner, &inner.inner));

        stack.close();
        let back = stack.current().expect("outer restored");
        assert!(Arc::ptr_eq(&outer.inner, &back.inner));
        stack.close();
        assert!(stack.current().is_none());
    }
}
