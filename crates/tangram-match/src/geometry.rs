//! Planar angle and vector helpers shared across the engine.

use nalgebra::{Rotation2, Vector2};
use std::f64::consts::{PI, TAU};

pub(crate) type Vec2 = Vector2<f64>;

#[inline]
pub(crate) fn vec2(p: [f64; 2]) -> Vec2 {
    Vec2::new(p[0], p[1])
}

#[inline]
pub(crate) fn to_array(v: Vec2) -> [f64; 2] {
    [v.x, v.y]
}

/// Wrap an angle into `(-π, π]`.
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % TAU;
    if a <= -PI {
        a += TAU;
    } else if a > PI {
        a -= TAU;
    }
    a
}

/// Smallest absolute difference between two angles modulo `period`.
///
/// Result lies in `[0, period / 2]`.
pub fn symmetric_angle_diff(a: f64, b: f64, period: f64) -> f64 {
    let d = (a - b).rem_euclid(period);
    d.min(period - d)
}

/// Signed wrap of `a - b` modulo `period` into `(-period/2, period/2]`.
pub(crate) fn signed_periodic_diff(a: f64, b: f64, period: f64) -> f64 {
    let d = (a - b).rem_euclid(period);
    if d > 0.5 * period {
        d - period
    } else {
        d
    }
}

/// Rotate `v` by `angle`, optionally reflecting across the x axis first.
#[inline]
pub(crate) fn rotate_reflect(v: Vec2, angle: f64, reflect: bool) -> Vec2 {
    let v = if reflect { Vec2::new(v.x, -v.y) } else { v };
    Rotation2::new(angle) * v
}

/// Shoelace signed area (positive for counter-clockwise winding).
pub(crate) fn signed_area(vertices: &[[f64; 2]]) -> f64 {
    let n = vertices.len();
    let mut acc = 0.0;
    for i in 0..n {
        let a = vertices[i];
        let b = vertices[(i + 1) % n];
        acc += a[0] * b[1] - a[1] * b[0];
    }
    0.5 * acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn normalize_angle_maps_into_half_open_interval() {
        assert_abs_diff_eq!(normalize_angle(PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(normalize_angle(-PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(normalize_angle(3.0 * TAU + 0.5), 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(normalize_angle(-TAU - 0.5), -0.5, epsilon = 1e-9);
    }

    #[test]
    fn symmetric_difference_respects_period() {
        let d = symmetric_angle_diff(0.05, FRAC_PI_2 - 0.05, FRAC_PI_2);
        assert_abs_diff_eq!(d, 0.1, epsilon = 1e-12);
        let d = symmetric_angle_diff(0.1, PI + 0.1, PI);
        assert_abs_diff_eq!(d, 0.0, epsilon = 1e-12);
        let d = symmetric_angle_diff(0.1, PI + 0.1, TAU);
        assert_abs_diff_eq!(d, PI, epsilon = 1e-12);
    }

    #[test]
    fn signed_diff_wraps_across_zero() {
        assert_abs_diff_eq!(signed_periodic_diff(0.1, TAU - 0.1, TAU), 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(signed_periodic_diff(TAU - 0.1, 0.1, TAU), -0.2, epsilon = 1e-12);
    }

    #[test]
    fn rotate_reflect_applies_mirror_before_rotation() {
        let v = rotate_reflect(Vec2::new(0.0, 1.0), FRAC_PI_2, true);
        assert_abs_diff_eq!(v.x, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(v.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn shoelace_area_sign_follows_winding() {
        let ccw = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        assert_abs_diff_eq!(signed_area(&ccw), 0.5, epsilon = 1e-12);
        let cw = [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0]];
        assert_abs_diff_eq!(signed_area(&cw), -0.5, epsilon = 1e-12);
    }
}
