//! Component Records
//!
//! A component record is what the scheduler flushes: a reusable dirty
//! bitmask, a reconciliation closure, and the four lifecycle lists
//! (before-update, after-update, mount, destroy). Generated view code owns
//! one record per component instance and calls [`Component::mark_dirty`]
//! whenever local state it rendered from changes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::{RenderCallback, Scheduler};

/// Counter for generating unique component IDs.
static COMPONENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a component record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(u64);

impl ComponentId {
    fn next() -> Self {
        Self(COMPONENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Reusable dirty bitmask over a component's reactive fields.
///
/// Field indices address single bits across 32-bit words; the mask grows to
/// fit the highest field ever marked and is cleared (not shrunk) after each
/// flush.
#[derive(Debug, Default, Clone)]
pub struct DirtyMask {
    words: SmallVec<[u32; 2]>,
}

impl DirtyMask {
    /// Set the bit for `field`.
    pub fn mark(&mut self, field: u32) {
        let word = (field / 32) as usize;
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (field % 32);
    }

    /// Whether the bit for `field` is set.
    pub fn contains(&self, field: u32) -> bool {
        let word = (field / 32) as usize;
        self.words
            .get(word)
            .map_or(false, |w| w & (1 << (field % 32)) != 0)
    }

    /// Whether any bit is set.
    pub fn any(&self) -> bool {
        self.words.iter().any(|w| *w != 0)
    }

    /// The raw mask words.
    pub fn words(&self) -> &[u32] {
        &self.words
    }
}

struct ComponentState {
    dirty: DirtyMask,
    queued: bool,
    mounted: bool,
    destroyed: bool,
    update: Option<Box<dyn FnMut(&DirtyMask) + Send>>,
    before_update: Vec<Arc<dyn Fn() + Send + Sync>>,
    after_update: Vec<RenderCallback>,
    on_mount: Vec<Box<dyn FnOnce() + Send>>,
    on_destroy: Vec<Box<dyn FnOnce() + Send>>,
}

struct ComponentInner {
    id: ComponentId,
    scheduler: Scheduler,
    state: Mutex<ComponentState>,
}

/// A schedulable component record.
///
/// Cloning shares the record; the scheduler holds clones while the component
/// is queued.
#[derive(Clone)]
pub struct Component {
    inner: Arc<ComponentInner>,
}

impl Component {
    /// Create a record owned by `scheduler`.
    pub fn new(scheduler: &Scheduler) -> Self {
        Self {
            inner: Arc::new(ComponentInner {
                id: ComponentId::next(),
                scheduler: scheduler.clone(),
                state: Mutex::new(ComponentState {
                    dirty: DirtyMask::default(),
                    queued: false,
                    mounted: false,
                    destroyed: false,
                    update: None,
                    before_update: Vec::new(),
                    after_update: Vec::new(),
                    on_mount: Vec::new(),
                    on_destroy: Vec::new(),
                }),
            }),
        }
    }

    /// Get the component's unique ID.
    pub fn id(&self) -> ComponentId {
        self.inner.id
    }

    /// Install the reconciliation closure, called with the dirty mask during
    /// each flush the component takes part in.
    pub fn set_update(&self, update: impl FnMut(&DirtyMask) + Send + 'static) {
        self.inner.state.lock().update = Some(Box::new(update));
    }

    /// Register a hook that runs just before each reconciliation.
    pub fn before_update(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.inner.state.lock().before_update.push(Arc::new(hook));
    }

    /// Register a render-complete hook, re-armed after every reconciliation.
    pub fn after_update(&self, hook: impl Fn() + Send + Sync + 'static) {
        let callback = RenderCallback::new(hook);
        self.inner.state.lock().after_update.push(callback);
    }

    /// Register a hook that runs once when the component mounts.
    pub fn on_mount(&self, hook: impl FnOnce() + Send + 'static) {
        self.inner.state.lock().on_mount.push(Box::new(hook));
    }

    /// Register a hook that runs once when the component is destroyed.
    pub fn on_destroy(&self, hook: impl FnOnce() + Send + 'static) {
        self.inner.state.lock().on_destroy.push(Box::new(hook));
    }

    /// Mark a reactive field dirty and queue the component for the next
    /// flush.
    ///
    /// The bit is always set; the component is enqueued only if it is not
    /// already queued, so repeated marks within a turn fold into one
    /// reconciliation.
    pub fn mark_dirty(&self, field: u32) {
        let enqueue = {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                return;
            }
            state.dirty.mark(field);
            if state.queued {
                false
            } else {
                state.queued = true;
                true
            }
        };
        if enqueue {
            tracing::trace!(component = self.inner.id.raw(), field, "component dirtied");
            self.inner.scheduler.enqueue(self.clone());
        }
    }

    /// Run mount hooks and arm the render-complete hooks for the first pass.
    ///
    /// Call order matters: generated code mounts children before their
    /// parent, which is what makes first-pass render callbacks run
    /// child-before-parent.
    pub fn mount(&self) {
        let (hooks, callbacks) = {
            let mut state = self.inner.state.lock();
            if state.mounted || state.destroyed {
                return;
            }
            state.mounted = true;
            (
                std::mem::take(&mut state.on_mount),
                state.after_update.clone(),
            )
        };
        for hook in hooks {
            hook();
        }
        for callback in callbacks {
            self.inner.scheduler.add_render_callback(callback);
        }
        self.inner.scheduler.schedule_flush();
    }

    /// Run destroy hooks and drop the component from future flushes.
    pub fn destroy(&self) {
        let hooks = {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.update = None;
            std::mem::take(&mut state.on_destroy)
        };
        tracing::trace!(component = self.inner.id.raw(), "component destroyed");
        for hook in hooks {
            hook();
        }
    }

    /// Whether [`destroy`](Component::destroy) has run.
    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    /// One flush step: before-update hooks, reconciliation with the dirty
    /// mask, then re-arm the render-complete hooks.
    pub(crate) fn run_update(&self) {
        let (hooks, mask, update) = {
            let mut state = self.inner.state.lock();
            state.queued = false;
            if state.destroyed {
                return;
            }
            (
                state.before_update.clone(),
                std::mem::take(&mut state.dirty),
                state.update.take(),
            )
        };
        for hook in hooks {
            (hook.as_ref())();
        }
        if let Some(mut update) = update {
            update(&mask);
            let mut state = self.inner.state.lock();
            if !state.destroyed && state.update.is_none() {
                state.update = Some(update);
            }
        }
        let callbacks = self.inner.state.lock().after_update.clone();
        for callback in callbacks {
            self.inner.scheduler.add_render_callback(callback);
        }
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Component")
            .field("id", &self.inner.id)
            .field("queued", &state.queued)
            .field("mounted", &state.mounted)
            .field("destroyed", &state.destroyed)
            .field("dirty", &state.dirty.any())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirty_mask_marks_and_queries_bits() {
        let mut mask = DirtyMask::default();
        assert!(!mask.any());

        mask.mark(0);
        mask.mark(31);
        mask.mark(40);

        assert!(mask.contains(0));
        assert!(mask.contains(31));
        assert!(mask.contains(40));
        assert!(!mask.contains(1));
        assert!(!mask.contains(63));
        assert_eq!(mask.words().len(), 2);
    }

    #[test]
    fn component_ids_are_unique() {
        let scheduler = Scheduler::new(Arc::new(super::super::TaskQueue::new()));
        let a = Component::new(&scheduler);
        let b = Component::new(&scheduler);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn destroyed_component_ignores_marks() {
        let scheduler = Scheduler::new(Arc::new(super::super::TaskQueue::new()));
        let component = Component::new(&scheduler);
        component.destroy();
        component.mark_dirty(0);
        scheduler.flush();
        assert!(component.is_destroyed());
    }
}
