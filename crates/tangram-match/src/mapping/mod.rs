//! Rigid mapping from observed space into a puzzle's target frame.
//!
//! A mapping is a rotation Θ, translation T and mirror parity p expressed
//! about a pivot (the anchor's observed position at fit time):
//!
//! `mapped = R(Θ)·M^p·(obs − pivot) + pivot + T`, with `M = diag(1, −1)`.
//!
//! Feature angles map as `Θ + (p ? −f : f)`. Mappings are stored in the
//! anchor's frame and re-expressed about the anchor's current pose each
//! frame, so moving the whole assembly never requires a refit.

mod optimizer;
mod solver;

pub(crate) use solver::{refine_mapping, single_pair, Correspondence, Hypothesis};

use std::collections::BTreeSet;

use crate::geometry::{normalize_angle, rotate_reflect, Vec2};
use crate::piece::{PieceId, TargetId};

/// Reasons a least-squares refit was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveError {
    TooFewPairs { got: usize },
    /// Observed centers are (nearly) coincident.
    Degenerate { spread: f64 },
    NonFinite,
}

impl std::fmt::Display for SolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewPairs { got } => write!(f, "too few pairs: need 2, got {}", got),
            Self::Degenerate { spread } => {
                write!(f, "degenerate correspondences: spread {:.3e}", spread)
            }
            Self::NonFinite => write!(f, "fit produced non-finite parameters"),
        }
    }
}

impl std::error::Error for SolveError {}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RigidMapping {
    pub(crate) rotation_delta: f64,
    pub(crate) translation: Vec2,
    pub(crate) pivot: Vec2,
    /// Anchor's continuous feature angle at fit time.
    pub(crate) anchor_feature: f64,
    pub(crate) mirror_parity: bool,
    pub(crate) version: u64,
    pub(crate) anchor: PieceId,
    pub(crate) anchor_target: TargetId,
    /// Pieces used as correspondences (always includes the anchor).
    pub(crate) pair_ids: BTreeSet<PieceId>,
    pub(crate) residual_rms: f64,
}

impl RigidMapping {
    #[inline]
    pub(crate) fn pair_count(&self) -> usize {
        self.pair_ids.len()
    }

    /// Re-express the mapping about the anchor's current pose.
    pub(crate) fn follow_anchor(&self, anchor_pos: Vec2, anchor_feature: f64) -> FrameTransform {
        let delta = self.anchor_feature - anchor_feature;
        let sign = if self.mirror_parity { -1.0 } else { 1.0 };
        FrameTransform {
            rotation: normalize_angle(self.rotation_delta + sign * delta),
            translation: self.pivot + self.translation - anchor_pos,
            pivot: anchor_pos,
            parity: self.mirror_parity,
        }
    }
}

/// A mapping instantiated for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FrameTransform {
    pub(crate) rotation: f64,
    pub(crate) translation: Vec2,
    pub(crate) pivot: Vec2,
    pub(crate) parity: bool,
}

impl FrameTransform {
    #[inline]
    pub(crate) fn map_point(&self, p: Vec2) -> Vec2 {
        rotate_reflect(p - self.pivot, self.rotation, self.parity) + self.pivot + self.translation
    }

    #[inline]
    pub(crate) fn map_feature(&self, feature: f64) -> f64 {
        if self.parity {
            self.rotation - feature
        } else {
            self.rotation + feature
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn mapping(rotation: f64, parity: bool) -> RigidMapping {
        RigidMapping {
            rotation_delta: rotation,
            translation: Vec2::new(-400.0, -400.0),
            pivot: Vec2::new(500.0, 500.0),
            anchor_feature: 30f64.to_radians(),
            mirror_parity: parity,
            version: 1,
            anchor: PieceId(1),
            anchor_target: TargetId(0),
            pair_ids: [PieceId(1)].into_iter().collect(),
            residual_rms: 0.0,
        }
    }

    #[test]
    fn anchor_maps_onto_pivot_plus_translation() {
        let m = mapping(-30f64.to_radians(), false);
        let ft = m.follow_anchor(Vec2::new(500.0, 500.0), 30f64.to_radians());
        let p = ft.map_point(Vec2::new(500.0, 500.0));
        assert_abs_diff_eq!(p.x, 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.y, 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ft.map_feature(30f64.to_radians()), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn following_a_moved_anchor_moves_the_frame() {
        for parity in [false, true] {
            let m = mapping(0.4, parity);
            let before = m.follow_anchor(Vec2::new(500.0, 500.0), 30f64.to_radians());
            let member = Vec2::new(560.0, 480.0);
            let member_feature = 1.2;

            // Rigidly move everything by rotation phi about the origin plus a shift.
            let phi: f64 = 0.7;
            let shift = Vec2::new(-35.0, 210.0);
            let moved = |p: Vec2| rotate_reflect(p, phi, false) + shift;

            let after = m.follow_anchor(moved(Vec2::new(500.0, 500.0)), 30f64.to_radians() + phi);
            let a = before.map_point(member);
            let b = after.map_point(moved(member));
            assert_abs_diff_eq!(a.x, b.x, epsilon = 1e-9);
            assert_abs_diff_eq!(a.y, b.y, epsilon = 1e-9);
            let fa = before.map_feature(member_feature);
            let fb = after.map_feature(member_feature + phi);
            assert_abs_diff_eq!(normalize_angle(fa - fb), 0.0, epsilon = 1e-9);
        }
    }
}
