use std::collections::BTreeSet;

use super::optimizer::minimize_angle;
use super::{RigidMapping, SolveError};
use crate::config::SolverConfig;
use crate::geometry::{normalize_angle, rotate_reflect, symmetric_angle_diff, vec2, Vec2};
use crate::observation::PieceObservation;
use crate::piece::{PieceId, PieceShape, TargetId};
use crate::puzzle::TargetPiece;

/// One observed piece paired with the target it is bound to.
#[derive(Debug, Clone)]
pub(crate) struct Correspondence {
    pub(crate) piece: PieceId,
    pub(crate) observed: Vec2,
    pub(crate) observed_feature: f64,
    pub(crate) observed_mirrored: bool,
    pub(crate) target: Vec2,
    pub(crate) target_feature: f64,
    pub(crate) target_mirrored: bool,
    pub(crate) shape: PieceShape,
    pub(crate) weight: f64,
}

impl Correspondence {
    pub(crate) fn new(obs: &PieceObservation, target: &TargetPiece) -> Self {
        Self {
            piece: obs.id,
            observed: vec2(obs.position),
            observed_feature: obs.feature_angle(),
            observed_mirrored: obs.is_mirrored,
            target: vec2(target.position),
            target_feature: target.feature_angle(),
            target_mirrored: target.is_mirrored,
            shape: obs.shape(),
            weight: obs.weight().max(1e-3),
        }
    }
}

/// A candidate explanation of the anchor: which target it occupies, under
/// which parity, and which of its symmetric orientations (`turn` multiples of
/// the shape's symmetry period).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Hypothesis {
    pub(crate) anchor: PieceId,
    pub(crate) target: TargetId,
    pub(crate) parity: bool,
    pub(crate) turn: u32,
}

/// Mapping that puts the anchor exactly onto `target`.
pub(crate) fn single_pair(
    hyp: &Hypothesis,
    anchor_pos: Vec2,
    anchor_feature: f64,
    target: &TargetPiece,
    version: u64,
) -> RigidMapping {
    let sign = if hyp.parity { -1.0 } else { 1.0 };
    let period = target.shape().symmetry_period();
    let rotation_delta =
        normalize_angle(target.feature_angle() - sign * anchor_feature + hyp.turn as f64 * period);
    RigidMapping {
        rotation_delta,
        translation: vec2(target.position) - anchor_pos,
        pivot: anchor_pos,
        anchor_feature,
        mirror_parity: hyp.parity,
        version,
        anchor: hyp.anchor,
        anchor_target: hyp.target,
        pair_ids: BTreeSet::from([hyp.anchor]),
        residual_rms: 0.0,
    }
}

struct ParityFit {
    parity: bool,
    rotation: f64,
    cost: f64,
}

/// Weighted least-squares refit over all correspondences.
///
/// Returns `Ok(None)` when `pairs` adds nothing beyond `current.pair_ids`,
/// so repeated calls with the same correspondences leave the mapping (and
/// its version) untouched. The pivot moves to the anchor's current pose.
pub(crate) fn refine_mapping(
    current: &RigidMapping,
    pairs: &[Correspondence],
    anchor_pos: Vec2,
    anchor_feature: f64,
    unit_length: f64,
    config: &SolverConfig,
) -> Result<Option<RigidMapping>, SolveError> {
    let ids: BTreeSet<PieceId> = pairs.iter().map(|c| c.piece).collect();
    if ids.is_subset(&current.pair_ids) {
        return Ok(None);
    }
    if pairs.len() < 2 {
        return Err(SolveError::TooFewPairs { got: pairs.len() });
    }

    let w_sum: f64 = pairs.iter().map(|c| c.weight).sum();
    let c_o = pairs.iter().map(|c| c.observed * c.weight).sum::<Vec2>() / w_sum;
    let c_t = pairs.iter().map(|c| c.target * c.weight).sum::<Vec2>() / w_sum;
    let spread = (pairs
        .iter()
        .map(|c| c.weight * (c.observed - c_o).norm_squared())
        .sum::<f64>()
        / w_sum)
        .sqrt();
    if !spread.is_finite() || spread < config.min_spread_units * unit_length {
        return Err(SolveError::Degenerate { spread });
    }

    let centered: Vec<(Vec2, Vec2)> = pairs
        .iter()
        .map(|c| (c.observed - c_o, c.target - c_t))
        .collect();
    let w_rot = config.rotation_weight * unit_length * unit_length;

    let cost = |theta: f64, parity: bool| -> f64 {
        let sign = if parity { -1.0 } else { 1.0 };
        pairs
            .iter()
            .zip(&centered)
            .map(|(c, (o, t))| {
                let pos = (rotate_reflect(*o, theta, parity) - t).norm_squared();
                let ang = symmetric_angle_diff(
                    theta + sign * c.observed_feature,
                    c.target_feature,
                    c.shape.symmetry_period(),
                );
                c.weight * (pos + w_rot * ang * ang)
            })
            .sum()
    };

    let fixed = pairs
        .iter()
        .find(|c| c.shape.is_mirrorable())
        .map(|c| c.observed_mirrored ^ c.target_mirrored);
    let parities: Vec<bool> = match fixed {
        Some(p) => vec![p],
        None => vec![current.mirror_parity, !current.mirror_parity],
    };

    let step = config.coarse_step_deg.to_radians();
    let tol = config.fine_tolerance_deg.to_radians();
    let mut best: Option<ParityFit> = None;
    for parity in parities {
        let (rotation, c) = minimize_angle(|t| cost(t, parity), step, tol, config.max_golden_evals);
        if best.as_ref().map_or(true, |b| c < b.cost) {
            best = Some(ParityFit {
                parity,
                rotation,
                cost: c,
            });
        }
    }
    let Some(best) = best else {
        return Err(SolveError::NonFinite);
    };

    let rotation = normalize_angle(best.rotation);
    let pivot = anchor_pos;
    let translation = c_t - (rotate_reflect(c_o - pivot, rotation, best.parity) + pivot);
    let pos_sq: f64 = pairs
        .iter()
        .zip(&centered)
        .map(|(c, (o, t))| c.weight * (rotate_reflect(*o, rotation, best.parity) - t).norm_squared())
        .sum();
    let residual_rms = (pos_sq / w_sum).sqrt();

    if !(rotation.is_finite()
        && translation.x.is_finite()
        && translation.y.is_finite()
        && residual_rms.is_finite())
    {
        return Err(SolveError::NonFinite);
    }

    let mut pair_ids = ids;
    pair_ids.insert(current.anchor);
    Ok(Some(RigidMapping {
        rotation_delta: rotation,
        translation,
        pivot,
        anchor_feature,
        mirror_parity: best.parity,
        version: current.version + 1,
        anchor: current.anchor,
        anchor_target: current.anchor_target,
        pair_ids,
        residual_rms,
    }))
}
