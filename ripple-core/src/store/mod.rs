//! Store Engine
//!
//! This module implements the reactive containers the rest of the runtime —
//! and all generated view code — is built on.
//!
//! # Concepts
//!
//! ## Writable stores
//!
//! A [`Writable`] holds a value and a set of subscriber pairs. Writing a
//! genuinely new value first invalidates every subscriber, then delivers
//! the value through the pending notification queue, which coalesces
//! repeated writes and absorbs reentrant ones.
//!
//! ## Readable stores
//!
//! A [`Readable`] is a writable whose only producer is its activation
//! closure — the shape used for clocks, media queries, and anything else
//! the view can watch but never write.
//!
//! ## Derived stores
//!
//! A [`Derived`] computes its value from a tuple of input stores. It
//! subscribes to its inputs lazily, and a per-input pending bitmask
//! guarantees one recompute per turn no matter how many inputs changed.
//!
//! ## Turns
//!
//! [`batch`] marks the turn boundary. Inside a batch only invalidations
//! propagate; deliveries wait for the outermost batch to exit, which is
//! what the coalescing guarantees are stated against.

mod derived;
mod queue;
mod readable;
mod subscribe;
mod value;
mod writable;

pub use derived::{derived, derived_with, Cleanup, Derived, SourceSink, Sources};
pub use queue::{batch, pending_deliveries};
pub use readable::{readable, Readable};
pub use subscribe::{
    InvalidateCallback, Store, StoreExt, Subscription, Teardown, ValueCallback,
};
pub use value::StoreValue;
pub use writable::{writable, writable_with, Setter, StartFn, Writable};
