//! Easing Functions
//!
//! An easing function maps linear progress `p` in `[0, 1]` to eased progress
//! in the same range. Transitions and tweens accept any `EasingFn`; the
//! functions here cover the shapes the generated view code asks for.
//!
//! All functions satisfy `f(0) == 0` and `f(1) == 1`.

/// Signature shared by every easing function.
///
/// Plain function pointers keep easing configuration `Copy` and comparable;
/// capture-free closures coerce to this type.
pub type EasingFn = fn(f64) -> f64;

/// No easing: progress is passed through unchanged.
pub fn linear(p: f64) -> f64 {
    p
}

/// Quadratic acceleration from zero velocity.
pub fn quad_in(p: f64) -> f64 {
    p * p
}

/// Quadratic deceleration to zero velocity.
pub fn quad_out(p: f64) -> f64 {
    -p * (p - 2.0)
}

/// Quadratic acceleration until halfway, then deceleration.
pub fn quad_in_out(p: f64) -> f64 {
    if p < 0.5 {
        2.0 * p * p
    } else {
        -0.5 * ((2.0 * p - 1.0) * (2.0 * p - 3.0) - 1.0)
    }
}

/// Cubic acceleration from zero velocity.
pub fn cubic_in(p: f64) -> f64 {
    p * p * p
}

/// Cubic deceleration to zero velocity. The default feel for most
/// enter/exit effects.
pub fn cubic_out(p: f64) -> f64 {
    let f = p - 1.0;
    f * f * f + 1.0
}

/// Cubic acceleration until halfway, then deceleration.
pub fn cubic_in_out(p: f64) -> f64 {
    if p < 0.5 {
        4.0 * p * p * p
    } else {
        let f = 2.0 * p - 2.0;
        0.5 * f * f * f + 1.0
    }
}

/// Sinusoidal acceleration and deceleration.
pub fn sine_in_out(p: f64) -> f64 {
    0.5 * (1.0 - (p * std::f64::consts::PI).cos())
}

/// Exponential deceleration to zero velocity.
pub fn expo_out(p: f64) -> f64 {
    if p == 1.0 {
        1.0
    } else {
        1.0 - 2f64.powf(-10.0 * p)
    }
}

/// Damped oscillation past the target, settling at one.
pub fn elastic_out(p: f64) -> f64 {
    (-13.0 * std::f64::consts::FRAC_PI_2 * (p + 1.0)).sin() * 2f64.powf(-10.0 * p) + 1.0
}

/// Overshoot beyond the target before settling.
pub fn back_out(p: f64) -> f64 {
    let f = 1.0 - p;
    1.0 - (f * f * f - f * (f * std::f64::consts::PI).sin())
}
