//! Anchor election and anchor hypotheses.
//!
//! The anchor is the member every other piece in its group is measured
//! against. A stable, already validated and central piece makes the best
//! reference.

use std::cmp::Ordering;
use std::f64::consts::TAU;

use crate::mapping::Hypothesis;
use crate::observation::PieceObservation;
use crate::piece::PieceId;
use crate::puzzle::TargetPiece;

/// Speeds closer than this count as equally still.
const SPEED_EPS: f64 = 1e-3;
/// Dwell times closer than this (seconds) count as equal.
const DWELL_EPS: f64 = 1e-6;
const DIST_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
pub(crate) struct AnchorCandidate {
    pub(crate) id: PieceId,
    pub(crate) validated: bool,
    pub(crate) speed: f64,
    pub(crate) dwell: f64,
    /// Distance to the group centroid.
    pub(crate) centrality: f64,
}

fn bucket_cmp(a: f64, b: f64, eps: f64) -> Ordering {
    if (a - b).abs() <= eps {
        Ordering::Equal
    } else {
        a.total_cmp(&b)
    }
}

/// `Less` when `a` is the better anchor.
fn preference(a: &AnchorCandidate, b: &AnchorCandidate) -> Ordering {
    b.validated
        .cmp(&a.validated)
        .then_with(|| bucket_cmp(a.speed, b.speed, SPEED_EPS))
        .then_with(|| bucket_cmp(b.dwell, a.dwell, DWELL_EPS))
        .then_with(|| bucket_cmp(a.centrality, b.centrality, DIST_EPS))
        .then_with(|| a.id.cmp(&b.id))
}

/// Pick the anchor: validated, then slowest, then longest dwell, then most
/// central, then lowest id.
pub(crate) fn elect_anchor(candidates: &[AnchorCandidate]) -> Option<PieceId> {
    // Linear scan: the bucketed comparison is not a strict total order.
    let mut best: Option<&AnchorCandidate> = None;
    for c in candidates {
        best = match best {
            Some(b) if preference(b, c) != Ordering::Greater => Some(b),
            _ => Some(c),
        };
    }
    best.map(|c| c.id)
}

/// Number of distinct orientations of a shape under its symmetry.
pub(crate) fn symmetric_turns(period: f64) -> u32 {
    (TAU / period).round().max(1.0) as u32
}

/// Every admissible way `anchor` could sit on one of `targets`.
///
/// The parallelogram's parity is fixed by its mirror flags; other shapes try
/// both parities. Symmetric shapes contribute one hypothesis per
/// indistinguishable orientation.
pub(crate) fn anchor_hypotheses<'a>(
    anchor: &PieceObservation,
    targets: impl Iterator<Item = &'a TargetPiece>,
    parity_hint: Option<bool>,
) -> Vec<Hypothesis> {
    let shape = anchor.shape();
    let turns = symmetric_turns(shape.symmetry_period());
    let mut out = Vec::new();
    for t in targets.filter(|t| t.shape() == shape) {
        let parities: Vec<bool> = if shape.is_mirrorable() {
            vec![anchor.is_mirrored ^ t.is_mirrored]
        } else {
            match parity_hint {
                Some(p) => vec![p, !p],
                None => vec![false, true],
            }
        };
        for parity in parities {
            for turn in 0..turns {
                out.push(Hypothesis {
                    anchor: anchor.id,
                    target: t.id,
                    parity,
                    turn,
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::{PieceShape, PieceType, TargetId};
    use std::f64::consts::{FRAC_PI_2, PI};

    fn cand(id: u32, validated: bool, speed: f64, dwell: f64, centrality: f64) -> AnchorCandidate {
        AnchorCandidate {
            id: PieceId(id),
            validated,
            speed,
            dwell,
            centrality,
        }
    }

    #[test]
    fn validated_member_wins() {
        let c = [cand(1, false, 0.0, 9.0, 0.0), cand(2, true, 5.0, 0.0, 50.0)];
        assert_eq!(elect_anchor(&c), Some(PieceId(2)));
    }

    #[test]
    fn stability_then_dwell_then_centrality_then_id() {
        let c = [cand(1, false, 3.0, 9.0, 0.0), cand(2, false, 0.0, 1.0, 50.0)];
        assert_eq!(elect_anchor(&c), Some(PieceId(2)));
        let c = [cand(1, false, 0.0, 1.0, 0.0), cand(2, false, 0.0, 4.0, 50.0)];
        assert_eq!(elect_anchor(&c), Some(PieceId(2)));
        let c = [cand(1, false, 0.0, 4.0, 30.0), cand(2, false, 0.0, 4.0, 10.0)];
        assert_eq!(elect_anchor(&c), Some(PieceId(2)));
        let c = [cand(3, false, 0.0, 4.0, 10.0), cand(2, false, 0.0, 4.0, 10.0)];
        assert_eq!(elect_anchor(&c), Some(PieceId(2)));
        assert_eq!(elect_anchor(&[]), None);
    }

    #[test]
    fn turn_counts_follow_symmetry() {
        assert_eq!(symmetric_turns(PieceShape::Square.symmetry_period()), 4);
        assert_eq!(symmetric_turns(PieceShape::Parallelogram.symmetry_period()), 2);
        assert_eq!(symmetric_turns(TAU), 1);
        assert_eq!(symmetric_turns(FRAC_PI_2), 4);
        assert_eq!(symmetric_turns(PI), 2);
    }

    #[test]
    fn parallelogram_hypotheses_fix_parity() {
        let obs = PieceObservation::new(PieceId(1), PieceType::Parallelogram, [0.0, 0.0], 0.0, true, 0.0);
        let target = TargetPiece {
            id: TargetId(6),
            piece_type: PieceType::Parallelogram,
            position: [0.0, 0.0],
            rotation: 0.0,
            is_mirrored: false,
        };
        let hyps = anchor_hypotheses(&obs, [&target].into_iter(), None);
        assert_eq!(hyps.len(), 2);
        assert!(hyps.iter().all(|h| h.parity));
    }

    #[test]
    fn triangle_hypotheses_cover_both_duplicates_and_parities() {
        let obs = PieceObservation::new(PieceId(1), PieceType::LargeTriangleB, [0.0, 0.0], 0.0, false, 0.0);
        let mk = |id: u32, kind: PieceType| TargetPiece {
            id: TargetId(id),
            piece_type: kind,
            position: [0.0, 0.0],
            rotation: 0.0,
            is_mirrored: false,
        };
        let targets = [
            mk(0, PieceType::LargeTriangleA),
            mk(1, PieceType::LargeTriangleB),
            mk(5, PieceType::Square),
        ];
        let hyps = anchor_hypotheses(&obs, targets.iter(), Some(true));
        assert_eq!(hyps.len(), 4);
        assert!(hyps[0].parity, "hint parity is tried first");
    }
}
