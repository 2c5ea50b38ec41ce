use crate::geometry::Vec2;
use crate::mapping::RigidMapping;
use crate::observation::RawPose;
use crate::piece::{PieceId, PieceType, TargetId};

/// Identity-like mapping anchored on `anchor`.
pub(crate) fn dummy_mapping(anchor: PieceId) -> RigidMapping {
    RigidMapping {
        rotation_delta: 0.0,
        translation: Vec2::zeros(),
        pivot: Vec2::zeros(),
        anchor_feature: 0.0,
        mirror_parity: false,
        version: 1,
        anchor,
        anchor_target: TargetId(0),
        pair_ids: [anchor].into_iter().collect(),
        residual_rms: 0.0,
    }
}

pub(crate) fn touch(id: u32, kind: PieceType, pos: [f64; 2], rotation_deg: f64, t: f64) -> RawPose {
    RawPose::touch(id, kind, pos, rotation_deg.to_radians(), false, t)
}
