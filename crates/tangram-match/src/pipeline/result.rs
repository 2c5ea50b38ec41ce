use crate::grouping::{GroupId, GroupState};
use crate::piece::{PieceId, PieceType, TargetId};
use crate::validate::{FailureReason, ValidationStatus};

/// Per-piece outcome of one frame.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PieceReport {
    pub id: PieceId,
    pub piece_type: PieceType,
    pub status: ValidationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_target: Option<TargetId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupId>,
    /// Mapped center distance to the bound (or closest) target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_error: Option<f64>,
    /// Symmetric feature-angle error in radians.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_error: Option<f64>,
    pub consecutive_pass: u32,
    pub consecutive_fail: u32,
}

/// The group's mapping as applied in this frame.
///
/// `mapped = R(rotation)·M^parity·(obs − pivot) + pivot + translation`, with
/// the pivot at the anchor's current position.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MappingSummary {
    /// Rotation Θ in radians.
    pub rotation: f64,
    pub translation: [f64; 2],
    pub pivot: [f64; 2],
    pub mirror_parity: bool,
    pub version: u64,
    pub pair_count: usize,
    pub anchor_target: TargetId,
    /// RMS position residual of the last least-squares fit.
    pub residual_rms: f64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GroupReport {
    pub id: GroupId,
    pub members: Vec<PieceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<PieceId>,
    pub confidence: f64,
    pub state: GroupState,
    pub last_activity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<MappingSummary>,
}

/// Per-frame counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameStats {
    pub n_observations: usize,
    /// Malformed records dropped by normalization.
    pub n_dropped: usize,
    /// Records superseded by another record for the same piece.
    pub n_duplicates: usize,
    pub n_groups: usize,
    pub n_binds: usize,
    pub n_rebinds: usize,
    pub n_released: usize,
    pub n_refinements: usize,
    pub n_degenerate_fits: usize,
    pub n_anchor_changes: usize,
    pub n_ambiguous: usize,
}

/// Everything the engine concluded from one frame.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidationResult {
    /// 1-based frame counter since the last reset.
    pub frame_index: u64,
    /// Latest observation timestamp seen so far.
    pub timestamp: f64,
    /// Sorted by piece id.
    pub pieces: Vec<PieceReport>,
    pub groups: Vec<GroupReport>,
    /// Targets occupied by a validated piece, sorted.
    pub validated_target_ids: Vec<TargetId>,
    /// Targets with any bound piece, sorted.
    pub consumed_target_ids: Vec<TargetId>,
    /// Every target is occupied by a validated piece.
    pub is_complete: bool,
    pub stats: FrameStats,
}

impl ValidationResult {
    pub fn piece(&self, id: PieceId) -> Option<&PieceReport> {
        self.pieces
            .binary_search_by_key(&id, |p| p.id)
            .ok()
            .map(|i| &self.pieces[i])
    }

    pub fn group(&self, id: GroupId) -> Option<&GroupReport> {
        self.groups.iter().find(|g| g.id == id)
    }

    /// The group `piece` belongs to this frame.
    pub fn group_of(&self, piece: PieceId) -> Option<&GroupReport> {
        self.piece(piece)
            .and_then(|p| p.group)
            .and_then(|g| self.group(g))
    }

    pub fn n_validated(&self) -> usize {
        self.pieces
            .iter()
            .filter(|p| p.status == ValidationStatus::Validated)
            .count()
    }
}
