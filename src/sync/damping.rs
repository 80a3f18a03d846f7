//! Frame-rate independent exponential damping.
//!
//! `damp(current, target, lambda, dt)` moves `current` by the fraction
//! `1 - e^(-lambda * dt)` of the remaining distance. Splitting an interval
//! into more frames gives the same result, so motion speed does not depend
//! on the render rate.

use std::f32::consts::LN_2;

use crate::scene::Vec3;

/// Distances below this snap onto the target so a converged value stays
/// exactly put instead of creeping forever. Scaled by the target's
/// magnitude once that exceeds 1.
pub const SNAP_EPSILON: f32 = 1e-4;

/// Decay rate for a given half-life: after `half_life` seconds half of the
/// remaining distance is covered.
pub fn rate_from_half_life(half_life_secs: f32) -> f32 {
    if half_life_secs <= 0.0 {
        f32::INFINITY
    } else {
        LN_2 / half_life_secs
    }
}

/// Fraction of the remaining distance covered during `dt` seconds.
pub fn damp_factor(rate: f32, dt_secs: f32) -> f32 {
    if dt_secs <= 0.0 {
        return 0.0;
    }
    if rate.is_infinite() {
        return 1.0;
    }
    1.0 - (-rate * dt_secs).exp()
}

/// Snap distance around `target`.
pub fn snap_epsilon(target: f32) -> f32 {
    SNAP_EPSILON * target.abs().max(1.0)
}

pub fn damp(current: f32, target: f32, rate: f32, dt_secs: f32) -> f32 {
    let factor = damp_factor(rate, dt_secs);
    if factor == 0.0 {
        return current;
    }
    let next = current + (target - current) * factor;
    // Near large targets the step can fall below one f32 ulp and round away.
    if next == current || (target - next).abs() < snap_epsilon(target) {
        target
    } else {
        next
    }
}

pub fn damp_vec3(current: Vec3, target: Vec3, rate: f32, dt_secs: f32) -> Vec3 {
    [
        damp(current[0], target[0], rate, dt_secs),
        damp(current[1], target[1], rate, dt_secs),
        damp(current[2], target[2], rate, dt_secs),
    ]
}

pub fn distance(a: Vec3, b: Vec3) -> f32 {
    let d = [a[0] - b[0], a[1] - b[1], a[2] - b[2]];
    (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
}
