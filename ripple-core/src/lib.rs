//! Ripple Core
//!
//! This crate provides the core runtime for the Ripple reactive UI
//! framework. It implements:
//!
//! - Reactive stores (writable, readable, derived) with batched delivery
//! - The dirty-component update scheduler and flush loop
//! - A generic animation-frame task loop
//! - Enter/exit transition coordination with interruption, redirection,
//!   and group-synchronized completion
//! - Tweened value stores with structural interpolation
//!
//! Generated view components, the settings domain model, HTTP, and routing
//! live elsewhere and consume these contracts.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `store`: reactive containers and the pending notification queue
//! - `scheduler`: component records, dirty tracking, and the flush loop
//! - `frame`: the frame task loop, frame hosts, and clocks
//! - `transition`: the per-element transition state machine, outro groups,
//!   and the keyframe style registry
//! - `tween`: value stores that animate between writes
//! - `easing`: the easing function library
//!
//! A [`Runtime`] instance ties one scheduler, one frame loop, one outro
//! stack, and one clock together; everything stateful hangs off it rather
//! than off process-wide globals, so independent runtimes coexist in one
//! process.
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::store::{writable, derived, StoreExt, batch};
//!
//! let width = writable(320.0);
//! let height = writable(200.0);
//! let area = derived((width.clone(), height.clone()), |(w, h)| w * h);
//!
//! let sub = area.subscribe(|a| println!("area: {a}"));
//!
//! // One recompute, one delivery, despite two writes.
//! batch(|| {
//!     width.set(640.0);
//!     height.set(400.0);
//! });
//! sub.unsubscribe();
//! ```

pub mod easing;
pub mod frame;
pub mod scheduler;
pub mod store;
pub mod transition;
pub mod tween;

mod runtime;

pub use runtime::{HeadlessHandles, Runtime, RuntimeBuilder};
