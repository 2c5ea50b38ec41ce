use std::f64::consts::FRAC_PI_4;

use super::cluster::{ClusterEdge, ClusterNode};
use super::GroupState;
use crate::config::GroupingConfig;
use crate::geometry::symmetric_angle_diff;

/// How close an angle difference is to a multiple of 45°, in `[0, 1]`.
fn alignment_score(feature_a: f64, feature_b: f64) -> f64 {
    let off = symmetric_angle_diff(feature_a, feature_b, FRAC_PI_4);
    (1.0 - off / (0.5 * FRAC_PI_4)).clamp(0.0, 1.0)
}

/// Blend of edge closeness, angular alignment and size.
///
/// `members` are node indices of one component; `edges` is the full edge list
/// of the clustering. A single piece scores 0.
pub(crate) fn group_confidence(
    nodes: &[ClusterNode],
    members: &[usize],
    edges: &[ClusterEdge],
    config: &GroupingConfig,
) -> f64 {
    if members.len() < 2 {
        return 0.0;
    }
    let mut n = 0usize;
    let mut proximity = 0.0;
    let mut alignment = 0.0;
    for e in edges {
        if members.binary_search_by_key(&nodes[e.a].id, |&i| nodes[i].id).is_err() {
            continue;
        }
        n += 1;
        proximity += (1.0 - e.distance / e.threshold).clamp(0.0, 1.0);
        alignment += alignment_score(nodes[e.a].feature, nodes[e.b].feature);
    }
    if n == 0 {
        return 0.0;
    }
    proximity /= n as f64;
    alignment /= n as f64;
    let count = ((members.len() - 1) as f64 / (config.count_saturation - 1) as f64).min(1.0);

    let total_w = config.proximity_weight + config.alignment_weight + config.count_weight;
    if total_w <= 0.0 {
        return 0.0;
    }
    let score = (config.proximity_weight * proximity
        + config.alignment_weight * alignment
        + config.count_weight * count)
        / total_w;
    score.clamp(0.0, 1.0)
}

pub(crate) fn group_state(
    n_members: usize,
    validated_fraction: f64,
    config: &GroupingConfig,
) -> GroupState {
    if n_members >= 2 && validated_fraction > config.completing_fraction {
        return GroupState::Completing;
    }
    match n_members {
        0 | 1 => GroupState::Scattered,
        2 => GroupState::Exploring,
        3 => GroupState::Constructing,
        _ => GroupState::Building,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::PieceId;
    use approx::assert_abs_diff_eq;

    fn node(id: u32, x: f64, feature: f64) -> ClusterNode {
        ClusterNode {
            id: PieceId(id),
            position: [x, 0.0],
            width: 50.0,
            feature,
            recent: true,
            prev_group: None,
        }
    }

    #[test]
    fn aligned_touching_pair_scores_higher_than_skewed_distant_pair() {
        let cfg = GroupingConfig::default();
        let tight = vec![node(1, 0.0, 0.0), node(2, 10.0, FRAC_PI_4)];
        let tight_edges = [ClusterEdge {
            a: 0,
            b: 1,
            distance: 10.0,
            threshold: 100.0,
        }];
        let loose = vec![node(1, 0.0, 0.0), node(2, 90.0, 0.3)];
        let loose_edges = [ClusterEdge {
            a: 0,
            b: 1,
            distance: 90.0,
            threshold: 100.0,
        }];
        let a = group_confidence(&tight, &[0, 1], &tight_edges, &cfg);
        let b = group_confidence(&loose, &[0, 1], &loose_edges, &cfg);
        assert!(a > b, "{a} vs {b}");
        assert!((0.0..=1.0).contains(&a));
    }

    #[test]
    fn singleton_confidence_is_zero() {
        let cfg = GroupingConfig::default();
        let nodes = vec![node(1, 0.0, 0.0)];
        assert_eq!(group_confidence(&nodes, &[0], &[], &cfg), 0.0);
    }

    #[test]
    fn alignment_peaks_on_multiples_of_45_degrees() {
        assert_abs_diff_eq!(alignment_score(0.0, 3.0 * FRAC_PI_4), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(alignment_score(0.0, 0.5 * FRAC_PI_4), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn state_follows_member_count_and_progress() {
        let cfg = GroupingConfig::default();
        assert_eq!(group_state(1, 0.0, &cfg), GroupState::Scattered);
        assert_eq!(group_state(2, 0.0, &cfg), GroupState::Exploring);
        assert_eq!(group_state(3, 0.2, &cfg), GroupState::Constructing);
        assert_eq!(group_state(5, 0.6, &cfg), GroupState::Building);
        assert_eq!(group_state(5, 0.72, &cfg), GroupState::Completing);
    }
}
