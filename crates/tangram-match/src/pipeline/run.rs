//! Frame orchestrator: track -> group -> group passes -> hysteresis -> report.

use std::collections::{BTreeMap, BTreeSet};

use super::group_pass::{run_group, FrameLedger, PassContext};
use super::result::{FrameStats, GroupReport, MappingSummary, PieceReport, ValidationResult};
use super::state::EngineState;
use crate::config::{EngineConfig, ValidationOptions};
use crate::geometry::to_array;
use crate::grouping::{
    cluster_pieces, group_confidence, group_state, migrate_groups, ClusterNode, ConstructionGroup,
    GroupId,
};
use crate::observation::NormalizedFrame;
use crate::piece::PieceId;
use crate::puzzle::Puzzle;
use crate::validate::{step, CheckEvent, PieceValidationState, ValidationStatus};

/// Process one normalized frame and report the outcome.
pub(crate) fn run_frame(
    state: &mut EngineState,
    frame: NormalizedFrame,
    puzzle: &Puzzle,
    config: &EngineConfig,
    options: &ValidationOptions,
) -> ValidationResult {
    state.frame_index += 1;
    let mut stats = FrameStats {
        n_observations: frame.observations.len(),
        n_dropped: frame.n_dropped,
        n_duplicates: frame.n_duplicates,
        ..FrameStats::default()
    };

    let update = state.tracker.update(&frame.observations, config);
    for id in &update.removed {
        if state.bindings.unbind_piece(*id).is_some() {
            stats.n_released += 1;
        }
        state.pieces.remove(id);
        tracing::debug!(piece = id.0, "piece left the scene");
    }
    for id in &update.appeared {
        if state.bindings.unbind_piece(*id).is_some() {
            stats.n_released += 1;
        }
        state.pieces.insert(*id, PieceValidationState::default());
    }

    let mut groups = regroup(state, config, options, &update.appeared);

    // Large, confident groups claim targets first.
    let mut order: Vec<usize> = (0..groups.len()).collect();
    order.sort_by(|&a, &b| {
        let (ga, gb) = (&groups[a], &groups[b]);
        gb.members
            .len()
            .cmp(&ga.members.len())
            .then_with(|| gb.confidence.total_cmp(&ga.confidence))
            .then_with(|| ga.id.cmp(&gb.id))
    });

    let prior = state.pieces.clone();
    let ctx = PassContext {
        puzzle,
        config,
        tolerance: options.tolerances().resolve(config.unit_length),
        tracker: &state.tracker,
        prior: &prior,
    };
    let mut ledger = FrameLedger {
        bindings: &mut state.bindings,
        passed: BTreeSet::new(),
        verdicts: BTreeMap::new(),
        stats,
    };
    let mut transforms = BTreeMap::new();
    for &i in &order {
        if let Some(t) = run_group(&ctx, &mut groups[i], &mut ledger) {
            transforms.insert(groups[i].id, t);
        }
    }
    let FrameLedger {
        verdicts, mut stats, ..
    } = ledger;

    for (id, piece_state) in state.pieces.iter_mut() {
        let verdict = verdicts.get(id);
        let event = verdict.map_or(CheckEvent::Hold, |v| v.event);
        let check = verdict.and_then(|v| v.check);
        let mut next = step(piece_state, event, &config.hysteresis);
        next.bound_target = state.bindings.target_of(*id);
        next.position_error = check.map(|c| c.position_error);
        next.rotation_error = check.map(|c| c.rotation_error);
        if next.status != piece_state.status {
            tracing::debug!(
                piece = id.0,
                from = ?piece_state.status,
                to = ?next.status,
                "validation status changed"
            );
        }
        *piece_state = next;
    }

    let n_targets = puzzle.n_targets().max(1) as f64;
    for group in &mut groups {
        let n_validated = group
            .members
            .iter()
            .filter(|&&m| {
                state
                    .pieces
                    .get(&m)
                    .is_some_and(|s| s.status == ValidationStatus::Validated && s.bound_target.is_some())
            })
            .count();
        group.state = group_state(
            group.members.len(),
            n_validated as f64 / n_targets,
            &config.grouping,
        );
    }

    stats.n_groups = groups.len();
    state.groups = groups;
    state.transforms = transforms;
    report(state, puzzle, stats)
}

/// Cluster the pieces seen this frame and carry group identity over from
/// last frame. Pieces in their missed-frame grace keep state and binding but
/// sit out grouping, so their stale poses are neither checked nor elected.
fn regroup(
    state: &mut EngineState,
    config: &EngineConfig,
    options: &ValidationOptions,
    appeared: &[PieceId],
) -> Vec<ConstructionGroup> {
    let prev_group: BTreeMap<PieceId, GroupId> = state
        .groups
        .iter()
        .flat_map(|g| g.members.iter().map(move |&m| (m, g.id)))
        .collect();
    let nodes: Vec<ClusterNode> = state
        .tracker
        .visible()
        .map(|(&id, p)| ClusterNode {
            id,
            position: p.obs.position,
            width: p.obs.shape().width_units() * config.unit_length,
            feature: p.continuous_feature,
            recent: state.tracker.is_recent(
                id,
                config.grouping.recency_window_secs,
                options.focus_piece,
            ),
            prev_group: prev_group.get(&id).copied(),
        })
        .collect();
    let clustering = cluster_pieces(&nodes, config.grouping.proximity_piece_widths);
    let components: Vec<Vec<PieceId>> = clustering
        .components
        .iter()
        .map(|c| c.iter().map(|&i| nodes[i].id).collect())
        .collect();

    let mut groups = migrate_groups(&components, &state.groups, &mut state.next_group_id);
    for (group, component) in groups.iter_mut().zip(&clustering.components) {
        group.confidence =
            group_confidence(&nodes, component, &clustering.edges, &config.grouping);
        group.last_activity = group
            .members
            .iter()
            .filter_map(|&m| state.tracker.get(m))
            .map(|p| p.last_moved)
            .fold(f64::NEG_INFINITY, f64::max);
        if let Some(anchor) = group.anchor {
            let restarted = appeared.contains(&anchor);
            let invalid = state.status(anchor) == ValidationStatus::Invalid;
            if restarted || invalid {
                tracing::debug!(group = group.id.0, anchor = anchor.0, restarted, invalid, "anchor demoted");
                group.demote();
            }
        }
    }
    groups
}

fn report(state: &EngineState, puzzle: &Puzzle, stats: FrameStats) -> ValidationResult {
    let pieces: Vec<PieceReport> = state
        .pieces
        .iter()
        .filter_map(|(&id, s)| {
            let tracked = state.tracker.get(id)?;
            Some(PieceReport {
                id,
                piece_type: tracked.obs.piece_type,
                status: s.status,
                bound_target: s.bound_target,
                failure_reason: s.last_failure_reason,
                group: state.group_of(id).map(|g| g.id),
                position_error: s.position_error,
                rotation_error: s.rotation_error,
                consecutive_pass: s.consecutive_pass,
                consecutive_fail: s.consecutive_fail,
            })
        })
        .collect();

    let groups = state
        .groups
        .iter()
        .map(|g| GroupReport {
            id: g.id,
            members: g.members.clone(),
            anchor: g.anchor,
            confidence: g.confidence,
            state: g.state,
            last_activity: g.last_activity,
            mapping: match (&g.mapping, state.transforms.get(&g.id)) {
                (Some(m), Some(t)) => Some(MappingSummary {
                    rotation: t.rotation,
                    translation: to_array(t.translation),
                    pivot: to_array(t.pivot),
                    mirror_parity: t.parity,
                    version: m.version,
                    pair_count: m.pair_count(),
                    anchor_target: m.anchor_target,
                    residual_rms: m.residual_rms,
                }),
                _ => None,
            },
        })
        .collect();

    let validated_target_ids = state.validated_target_ids();
    let is_complete =
        puzzle.n_targets() > 0 && validated_target_ids.len() == puzzle.n_targets();
    ValidationResult {
        frame_index: state.frame_index,
        timestamp: state.tracker.now(),
        pieces,
        groups,
        validated_target_ids,
        consumed_target_ids: state.bindings.consumed().collect(),
        is_complete,
        stats,
    }
}
