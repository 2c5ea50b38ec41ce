//! Construction groups: clusters of pieces the user is assembling together.
//!
//! Groups are rebuilt every frame by union-find over proximity links, then
//! matched against last frame's groups so that anchors and mappings survive
//! growth, merges and splits.

mod cluster;
mod confidence;
mod migrate;

pub(crate) use cluster::{cluster_pieces, ClusterNode};
pub(crate) use confidence::{group_confidence, group_state};
pub(crate) use migrate::migrate_groups;

use crate::mapping::RigidMapping;
use crate::piece::PieceId;

/// Identifier of a construction group; stable while the group persists.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct GroupId(pub u32);

/// Advisory assembly phase of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupState {
    Scattered,
    Exploring,
    Constructing,
    Building,
    Completing,
}

#[derive(Debug, Clone)]
pub(crate) struct ConstructionGroup {
    pub(crate) id: GroupId,
    /// Sorted member ids.
    pub(crate) members: Vec<PieceId>,
    pub(crate) anchor: Option<PieceId>,
    pub(crate) mapping: Option<RigidMapping>,
    /// Last mapping version handed out; versions only grow within a group.
    pub(crate) mapping_version: u64,
    pub(crate) confidence: f64,
    pub(crate) state: GroupState,
    /// Most recent motion time of any member.
    pub(crate) last_activity: f64,
}

impl ConstructionGroup {
    pub(crate) fn new(id: GroupId, members: Vec<PieceId>) -> Self {
        Self {
            id,
            members,
            anchor: None,
            mapping: None,
            mapping_version: 0,
            confidence: 0.0,
            state: GroupState::Scattered,
            last_activity: 0.0,
        }
    }

    #[inline]
    pub(crate) fn contains(&self, id: PieceId) -> bool {
        self.members.binary_search(&id).is_ok()
    }

    /// Drop anchor-dependent state.
    pub(crate) fn demote(&mut self) {
        self.anchor = None;
        self.mapping = None;
    }

    pub(crate) fn next_version(&mut self) -> u64 {
        self.mapping_version += 1;
        self.mapping_version
    }
}
