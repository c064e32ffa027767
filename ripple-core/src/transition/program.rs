//! Transition Programs
//!
//! A program is the concrete timing of one transition leg: where the
//! element's animated position starts, where it is headed, and over which
//! window of frame time. A pending program is a leg that has not started
//! yet — either waiting out its delay, or queued behind a running leg as a
//! redirect.
//!
//! Programs are immutable once initialized. A redirect never rewrites a
//! running program; it queues a pending one, and promotion builds a fresh
//! program whose start position is the element's *current* interpolated
//! value, which is what keeps redirected motion visually continuous.

use serde::{Deserialize, Serialize};

use super::group::OutroGroup;

/// Which way a transition leg moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionDirection {
    /// Entering: animated position heads to 1.
    In,
    /// Exiting: animated position heads to 0.
    Out,
}

impl TransitionDirection {
    /// The position this direction ends at.
    pub fn target(self) -> f64 {
        match self {
            TransitionDirection::In => 1.0,
            TransitionDirection::Out => 0.0,
        }
    }
}

/// A leg that has not started yet.
pub(crate) struct PendingProgram {
    /// Frame time at which the leg becomes due.
    pub(crate) start: f64,
    pub(crate) direction: TransitionDirection,
    /// Exits carry the outro group they joined at request time.
    pub(crate) group: Option<OutroGroup>,
}

/// One in-flight transition leg.
pub(crate) struct Program {
    /// Position the leg started from.
    pub(crate) a: f64,
    /// Position the leg ends at.
    pub(crate) b: f64,
    /// Signed distance `b - a`.
    pub(crate) d: f64,
    /// Leg length in milliseconds, already scaled by distance.
    pub(crate) duration: f64,
    pub(crate) start: f64,
    pub(crate) end: f64,
    pub(crate) direction: TransitionDirection,
    pub(crate) group: Option<OutroGroup>,
}

impl Program {
    /// Initialize a leg from the current position `t`.
    ///
    /// The configured duration covers a full 0-to-1 sweep; a leg starting
    /// mid-way (a redirect) covers less distance and is shortened
    /// proportionally, so redirected motion keeps its speed.
    pub(crate) fn init(pending: PendingProgram, t: f64, base_duration: f64) -> Self {
        let b = pending.direction.target();
        let d = b - t;
        let duration = base_duration * d.abs();
        Self {
            a: t,
            b,
            d,
            duration,
            start: pending.start,
            end: pending.start + duration,
            direction: pending.direction,
            group: pending.group,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(direction: TransitionDirection, start: f64) -> PendingProgram {
        PendingProgram {
            start,
            direction,
            group: None,
        }
    }

    #[test]
    fn full_sweep_keeps_the_configured_duration() {
        let program = Program::init(pending(TransitionDirection::In, 100.0), 0.0, 300.0);
        assert_eq!(program.a, 0.0);
        assert_eq!(program.b, 1.0);
        assert_eq!(program.d, 1.0);
        assert_eq!(program.duration, 300.0);
        assert_eq!(program.end, 400.0);
    }

    #[test]
    fn partial_sweep_scales_duration_by_distance() {
        // Redirected at t = 0.6, heading back out: 60% of the distance.
        let program = Program::init(pending(TransitionDirection::Out, 50.0), 0.6, 300.0);
        assert_eq!(program.a, 0.6);
        assert_eq!(program.b, 0.0);
        assert!((program.d + 0.6).abs() < 1e-12);
        assert!((program.duration - 180.0).abs() < 1e-9);
        assert!((program.end - 230.0).abs() < 1e-9);
    }

    #[test]
    fn directions_have_fixed_targets() {
        assert_eq!(TransitionDirection::In.target(), 1.0);
        assert_eq!(TransitionDirection::Out.target(), 0.0);
    }
}
