//! Transition Coordination
//!
//! This module implements enter/exit effects for elements: the per-element
//! state machine with interruption and redirection, outro groups that
//! synchronize sibling exits, and the content-addressed keyframe style
//! registry.
//!
//! # Concepts
//!
//! ## Programs
//!
//! A program is one transition leg with concrete timing. Redirecting an
//! active element queues a pending program; promotion initializes it from
//! the element's current interpolated position, which keeps interrupted
//! motion continuous.
//!
//! ## Outro groups
//!
//! Sibling exits that must finish together join a group; teardown deferred
//! on the group runs exactly once, when the last member finishes. Groups
//! open and close through the owning [`Runtime`](crate::Runtime).
//!
//! ## Keyframe styles
//!
//! Legs configured with a `css` function compile to keyframe rules. Rules
//! are content-addressed per style root and reference-counted; detachment
//! waits for a later idle animation frame.

mod coordinator;
mod group;
mod program;
mod style;

pub use coordinator::{Transition, TransitionConfig, TransitionEvent};
pub use group::OutroGroup;
pub(crate) use group::OutroStack;
pub use program::TransitionDirection;
pub use style::{StyleRoot, TransitionTarget};
