use std::collections::{BTreeMap, BTreeSet};

use crate::grouping::{ConstructionGroup, GroupId};
use crate::mapping::FrameTransform;
use crate::piece::{PieceId, TargetId};
use crate::tracking::MotionTracker;
use crate::validate::{BindingTable, PieceValidationState, ValidationStatus};

/// Everything the engine carries from one frame to the next.
#[derive(Debug, Default)]
pub(crate) struct EngineState {
    pub(crate) tracker: MotionTracker,
    pub(crate) groups: Vec<ConstructionGroup>,
    pub(crate) pieces: BTreeMap<PieceId, PieceValidationState>,
    pub(crate) bindings: BindingTable,
    /// Transform each mapped group applied in the last frame.
    pub(crate) transforms: BTreeMap<GroupId, FrameTransform>,
    pub(crate) next_group_id: u32,
    pub(crate) frame_index: u64,
}

impl EngineState {
    pub(crate) fn status(&self, id: PieceId) -> ValidationStatus {
        self.pieces.get(&id).map(|s| s.status).unwrap_or_default()
    }

    /// Targets occupied by a validated piece.
    pub(crate) fn validated_targets(&self) -> impl Iterator<Item = TargetId> + '_ {
        self.pieces
            .iter()
            .filter(|(_, s)| s.status == ValidationStatus::Validated)
            .filter_map(|(&id, _)| self.bindings.target_of(id))
    }

    pub(crate) fn validated_target_ids(&self) -> Vec<TargetId> {
        self.validated_targets()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub(crate) fn group_of(&self, id: PieceId) -> Option<&ConstructionGroup> {
        self.groups.iter().find(|g| g.contains(id))
    }

    /// Forget all pieces, groups, mappings and bindings.
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}
