use crate::piece::{PieceId, PieceShape, PieceType};

/// One unprocessed pose record from a touch or vision source.
///
/// Every field except `timestamp` is optional; the normalizer decides which
/// combination is usable. A pose may be given explicitly (`position` +
/// `rotation` + `is_mirrored`), as a 2×3 affine transform, or as an outline.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RawPose {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub piece_type: Option<PieceType>,
    /// Detector class id; stands in for both `piece_type` and `id`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_mirrored: Option<bool>,
    /// Row-major `[[a, b, tx], [c, d, ty]]` mapping the canonical shape.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affine: Option<[[f64; 3]; 2]>,
    /// Outline vertices in either winding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertices: Option<Vec<[f64; 2]>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub timestamp: f64,
}

impl RawPose {
    /// Touch-drag source: explicit pose for a known piece.
    pub fn touch(
        id: u32,
        piece_type: PieceType,
        position: [f64; 2],
        rotation: f64,
        is_mirrored: bool,
        timestamp: f64,
    ) -> Self {
        Self {
            id: Some(id),
            piece_type: Some(piece_type),
            position: Some(position),
            rotation: Some(rotation),
            is_mirrored: Some(is_mirrored),
            timestamp,
            ..Self::default()
        }
    }

    /// Vision source: affine pose of a classified detection.
    pub fn detection(class_id: u32, affine: [[f64; 3]; 2], timestamp: f64, confidence: f64) -> Self {
        Self {
            class_id: Some(class_id),
            affine: Some(affine),
            confidence: Some(confidence),
            timestamp,
            ..Self::default()
        }
    }

    /// Vision source: classified polygon outline.
    pub fn polygon(
        class_id: u32,
        vertices: Vec<[f64; 2]>,
        timestamp: f64,
        confidence: f64,
    ) -> Self {
        Self {
            class_id: Some(class_id),
            vertices: Some(vertices),
            confidence: Some(confidence),
            timestamp,
            ..Self::default()
        }
    }

    pub fn with_velocity(mut self, velocity: [f64; 2]) -> Self {
        self.velocity = Some(velocity);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Identity this record will resolve to, if it carries one.
    pub(crate) fn piece_key(&self) -> Option<u32> {
        self.id.or(self.class_id)
    }
}

/// A validated, normalized pose for one piece in one frame.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PieceObservation {
    pub id: PieceId,
    pub piece_type: PieceType,
    pub position: [f64; 2],
    /// Radians in `(-π, π]`.
    pub rotation: f64,
    pub is_mirrored: bool,
    /// Seconds.
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl PieceObservation {
    /// Build an observation, normalizing rotation and the mirror flag.
    pub fn new(
        id: PieceId,
        piece_type: PieceType,
        position: [f64; 2],
        rotation: f64,
        is_mirrored: bool,
        timestamp: f64,
    ) -> Self {
        Self {
            id,
            piece_type,
            position,
            rotation: crate::geometry::normalize_angle(rotation),
            is_mirrored: is_mirrored && piece_type.is_mirrorable(),
            timestamp,
            velocity: None,
            confidence: None,
        }
    }

    #[inline]
    pub fn shape(&self) -> PieceShape {
        self.piece_type.shape()
    }

    pub(crate) fn feature_angle(&self) -> f64 {
        self.rotation + self.shape().feature_offset()
    }

    /// Confidence used for weighting; missing confidence counts as certain.
    pub(crate) fn weight(&self) -> f64 {
        self.confidence.unwrap_or(1.0)
    }
}
