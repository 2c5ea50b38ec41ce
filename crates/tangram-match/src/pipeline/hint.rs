use std::collections::BTreeSet;

use super::EngineState;
use crate::config::ResolvedTolerance;
use crate::piece::{PieceId, TargetId};
use crate::puzzle::{Puzzle, TargetPiece};
use crate::validate::{check_piece, FailureReason, ValidationStatus};

/// Where to look next: the most promising open target and the piece closest
/// to fitting it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Hint {
    pub target: TargetPiece,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub piece: Option<PieceId>,
    /// What keeps `piece` from sitting on `target`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_error: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_error: Option<f64>,
}

/// Closest failing (piece, target) pair among mapped, not yet validated
/// pieces and targets without a validated piece. Falls back to the first open
/// target when there is none; `None` once the puzzle is complete.
pub(crate) fn best_hint(
    state: &EngineState,
    puzzle: &Puzzle,
    tolerance: &ResolvedTolerance,
) -> Option<Hint> {
    let validated: BTreeSet<TargetId> = state.validated_targets().collect();
    let open: Vec<&TargetPiece> = puzzle
        .targets()
        .iter()
        .filter(|t| !validated.contains(&t.id))
        .collect();
    let first_open = *open.first()?;

    let mut best: Option<(f64, Hint)> = None;
    for group in &state.groups {
        let Some(transform) = state.transforms.get(&group.id) else {
            continue;
        };
        for &member in &group.members {
            if state.status(member) == ValidationStatus::Validated {
                continue;
            }
            let Some(piece) = state.tracker.get(member) else {
                continue;
            };
            for target in open.iter().filter(|t| t.shape() == piece.obs.shape()) {
                let check = check_piece(&piece.obs, target, transform, tolerance);
                // A passing piece only needs to stay put.
                if check.passes() {
                    continue;
                }
                if best.as_ref().is_some_and(|(s, _)| *s <= check.score) {
                    continue;
                }
                best = Some((
                    check.score,
                    Hint {
                        target: (*target).clone(),
                        piece: Some(member),
                        failure_reason: check.failure_reason(),
                        position_error: Some(check.position_error),
                        rotation_error: Some(check.rotation_error),
                    },
                ));
            }
        }
    }

    Some(best.map(|(_, h)| h).unwrap_or_else(|| Hint {
        target: first_open.clone(),
        piece: None,
        failure_reason: None,
        position_error: None,
        rotation_error: None,
    }))
}
