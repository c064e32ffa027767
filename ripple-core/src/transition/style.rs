//! Keyframe Style Registry
//!
//! Transitions that declare a `css` function run as generated keyframe
//! animations. Each document (or shadow root) owns one [`StyleRoot`]: rules
//! are content-addressed by hashing the generated keyframe text, so two
//! elements animating identically share one rule. A count of active
//! animation references decides lifetime — when the last reference clears,
//! rule and sheet detachment is deferred to a later idle animation frame
//! and skipped entirely if new animations have started by then.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::easing::EasingFn;
use crate::frame::FrameLoop;

/// Milliseconds per keyframe sample; one sample per frame at 60fps.
const SAMPLE_STEP_MS: f64 = 16.666;

/// An element that keyframe animations can attach to.
///
/// The runtime only needs the element's animation shorthand and the style
/// container that owns its generated rules; everything else about the
/// element belongs to the embedder.
pub trait TransitionTarget: Send + Sync + 'static {
    /// The style container (document or shadow root) for this element.
    fn style_root(&self) -> StyleRoot;

    /// Current value of the element's animation shorthand.
    fn animation(&self) -> String;

    /// Replace the element's animation shorthand.
    fn set_animation(&self, value: &str);
}

struct StyleRootState {
    /// Rule name to keyframe body, in insertion order.
    rules: IndexMap<String, String>,
    /// Animation references currently alive across all elements.
    active: usize,
    sheet_attached: bool,
    cleanup_queued: bool,
}

/// Per-document registry of generated keyframe rules.
///
/// Cloning shares the registry.
#[derive(Clone)]
pub struct StyleRoot {
    inner: Arc<Mutex<StyleRootState>>,
}

impl StyleRoot {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StyleRootState {
                rules: IndexMap::new(),
                active: 0,
                sheet_attached: false,
                cleanup_queued: false,
            })),
        }
    }

    /// Generate a keyframe rule for one leg and attach it to `target`.
    ///
    /// The rule samples `css(t, 1 - t)` along the eased sweep from `a` to
    /// `b` once per frame interval. Identical content reuses the existing
    /// rule. Returns the rule name for a later [`delete_rule`].
    ///
    /// [`delete_rule`]: StyleRoot::delete_rule
    pub fn create_rule<E: TransitionTarget + ?Sized>(
        &self,
        target: &E,
        a: f64,
        b: f64,
        duration: f64,
        delay: f64,
        easing: EasingFn,
        css: &(dyn Fn(f64, f64) -> String + Send + Sync),
    ) -> String {
        let mut body = String::from("{\n");
        if duration > 0.0 {
            let step = SAMPLE_STEP_MS / duration;
            let mut p = 0.0;
            while p < 1.0 {
                let t = a + (b - a) * easing(p);
                body.push_str(&format!("{}%{{{}}}\n", p * 100.0, css(t, 1.0 - t)));
                p += step;
            }
        }
        body.push_str(&format!("100% {{{}}}\n}}", css(b, 1.0 - b)));

        let name = format!("__ripple_{:x}", content_hash(&body));
        {
            let mut state = self.inner.lock();
            if !state.rules.contains_key(&name) {
                state.rules.insert(name.clone(), body);
                tracing::trace!(rule = %name, "keyframe rule inserted");
            }
            state.sheet_attached = true;
            state.active += 1;
        }

        let previous = target.animation();
        let entry = format!("{name} {duration}ms linear {delay}ms 1 both");
        let next = if previous.is_empty() {
            entry
        } else {
            format!("{previous}, {entry}")
        };
        target.set_animation(&next);
        name
    }

    /// Detach generated animations from `target`.
    ///
    /// With `name` given, only that animation is removed; with `None`, every
    /// generated animation on the element is. When the last active
    /// reference clears, rule cleanup is queued on `frames` for a later
    /// idle frame.
    pub fn delete_rule<E: TransitionTarget + ?Sized>(
        &self,
        target: &E,
        name: Option<&str>,
        frames: &FrameLoop,
    ) {
        let previous = target.animation();
        if previous.is_empty() {
            return;
        }
        let entries: Vec<&str> = previous.split(", ").collect();
        let kept: Vec<&str> = entries
            .iter()
            .copied()
            .filter(|entry| match name {
                Some(name) => !entry.contains(name),
                None => !entry.contains("__ripple"),
            })
            .collect();
        let deleted = entries.len() - kept.len();
        if deleted == 0 {
            return;
        }
        target.set_animation(&kept.join(", "));

        let idle = {
            let mut state = self.inner.lock();
            state.active = state.active.saturating_sub(deleted);
            state.active == 0
        };
        if idle {
            self.queue_cleanup(frames);
        }
    }

    /// Queue rule/sheet detachment for a later idle frame. The sweep checks
    /// again at that point and keeps everything if animations restarted.
    fn queue_cleanup(&self, frames: &FrameLoop) {
        {
            let mut state = self.inner.lock();
            if state.cleanup_queued {
                return;
            }
            state.cleanup_queued = true;
        }
        let root = self.clone();
        // First tick only arms the sweep: a task registered mid-frame is
        // stepped in that same frame, and the detachment must land on a
        // later one.
        let mut armed = false;
        let _ = frames.task(move |_now| {
            if !armed {
                armed = true;
                return true;
            }
            let mut state = root.inner.lock();
            state.cleanup_queued = false;
            if state.active == 0 {
                let dropped = state.rules.len();
                state.rules.clear();
                state.sheet_attached = false;
                tracing::trace!(dropped, "keyframe rules detached");
            }
            false
        });
    }

    /// Number of rules currently attached.
    pub fn rule_count(&self) -> usize {
        self.inner.lock().rules.len()
    }

    /// Animation references currently alive.
    pub fn active_references(&self) -> usize {
        self.inner.lock().active
    }

    /// Whether the generated stylesheet is attached.
    pub fn sheet_attached(&self) -> bool {
        self.inner.lock().sheet_attached
    }

    /// The keyframe body for `name`, if attached.
    pub fn rule_body(&self, name: &str) -> Option<String> {
        self.inner.lock().rules.get(name).cloned()
    }
}

impl Default for StyleRoot {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StyleRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("StyleRoot")
            .field("rules", &state.rules.len())
            .field("active", &state.active)
            .field("sheet_attached", &state.sheet_attached)
            .finish()
    }
}

fn content_hash(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}
