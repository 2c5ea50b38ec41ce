use crate::config::ResolvedTolerance;
use crate::geometry::{symmetric_angle_diff, vec2};
use crate::mapping::FrameTransform;
use crate::observation::PieceObservation;
use crate::puzzle::TargetPiece;

/// Why a piece does not sit on its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    WrongPosition,
    WrongRotation,
    NeedsFlip,
    WrongPieceType,
}

/// Outcome of comparing one mapped observation against one target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PieceCheck {
    pub(crate) position_error: f64,
    /// Minimal symmetric feature-angle difference (radians).
    pub(crate) rotation_error: f64,
    pub(crate) position_ok: bool,
    pub(crate) rotation_ok: bool,
    pub(crate) mirror_ok: bool,
    /// `position_error / tol + rotation_error / tol`; lower is better.
    pub(crate) score: f64,
}

impl PieceCheck {
    #[inline]
    pub(crate) fn passes(&self) -> bool {
        self.position_ok && self.rotation_ok && self.mirror_ok
    }

    /// Highest-priority failure, `None` when the check passes.
    pub(crate) fn failure_reason(&self) -> Option<FailureReason> {
        if !self.mirror_ok {
            Some(FailureReason::NeedsFlip)
        } else if !self.rotation_ok {
            Some(FailureReason::WrongRotation)
        } else if !self.position_ok {
            Some(FailureReason::WrongPosition)
        } else {
            None
        }
    }
}

/// Compare `obs`, mapped through `transform`, against `target`.
///
/// The caller guarantees matching shapes. The mirror condition only applies
/// to mirrorable shapes.
pub(crate) fn check_piece(
    obs: &PieceObservation,
    target: &TargetPiece,
    transform: &FrameTransform,
    tol: &ResolvedTolerance,
) -> PieceCheck {
    let mapped = transform.map_point(vec2(obs.position));
    let position_error = (mapped - vec2(target.position)).norm();
    let rotation_error = symmetric_angle_diff(
        transform.map_feature(obs.feature_angle()),
        target.feature_angle(),
        target.shape().symmetry_period(),
    );
    let mirror_ok =
        !target.shape().is_mirrorable() || (obs.is_mirrored ^ transform.parity) == target.is_mirrored;

    PieceCheck {
        position_error,
        rotation_error,
        position_ok: position_error <= tol.position,
        rotation_ok: rotation_error <= tol.rotation,
        mirror_ok,
        score: position_error / tol.position + rotation_error / tol.rotation,
    }
}
