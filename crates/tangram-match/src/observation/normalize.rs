use std::collections::BTreeMap;
use std::f64::consts::PI;

use super::raw::{PieceObservation, RawPose};
use crate::piece::{pose_from_vertices, PieceId, PieceShape, PieceType};

const MIN_AFFINE_DET: f64 = 1e-12;

/// Reasons a raw record cannot become an observation.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizeError {
    MissingId,
    MissingType,
    UnknownClass { class_id: u32 },
    ClassMismatch { class_id: u32, piece_type: PieceType },
    MissingPose,
    NonFinite { field: &'static str },
    DegenerateAffine { det: f64 },
    BadOutline { n_vertices: usize },
}

impl std::fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingId => write!(f, "record has neither id nor class id"),
            Self::MissingType => write!(f, "record has neither piece type nor class id"),
            Self::UnknownClass { class_id } => write!(f, "unknown class id {}", class_id),
            Self::ClassMismatch {
                class_id,
                piece_type,
            } => write!(
                f,
                "class id {} disagrees with piece type {:?}",
                class_id, piece_type
            ),
            Self::MissingPose => {
                write!(f, "record has no position/rotation, affine or outline")
            }
            Self::NonFinite { field } => write!(f, "non-finite value in '{}'", field),
            Self::DegenerateAffine { det } => {
                write!(f, "affine linear part is singular (det = {:.3e})", det)
            }
            Self::BadOutline { n_vertices } => {
                write!(f, "outline with {} vertices does not match the piece shape", n_vertices)
            }
        }
    }
}

impl std::error::Error for NormalizeError {}

/// Output of [`normalize_frame`].
#[derive(Debug, Clone, Default)]
pub struct NormalizedFrame {
    /// One observation per piece id, sorted by id.
    pub observations: Vec<PieceObservation>,
    /// Records dropped as malformed.
    pub n_dropped: usize,
    /// Records superseded by a same-id record with higher confidence.
    pub n_duplicates: usize,
}

/// Normalize one raw record.
pub fn normalize_pose(raw: &RawPose) -> Result<PieceObservation, NormalizeError> {
    let piece_type = resolve_type(raw)?;
    let id = raw.piece_key().map(PieceId).ok_or(NormalizeError::MissingId)?;
    check_finite(raw.timestamp, "timestamp")?;

    let (position, rotation, mirrored) = if let (Some(position), Some(rotation)) =
        (raw.position, raw.rotation)
    {
        (position, rotation, raw.is_mirrored.unwrap_or(false))
    } else if let Some(affine) = raw.affine {
        let (translation, rotation, mirrored) = pose_from_affine(&affine, piece_type.shape())?;
        (raw.position.unwrap_or(translation), rotation, mirrored)
    } else if let Some(vertices) = raw.vertices.as_deref() {
        let (center, rotation, mirrored) = pose_from_vertices(piece_type.shape(), vertices)
            .ok_or(NormalizeError::BadOutline {
                n_vertices: vertices.len(),
            })?;
        (raw.position.unwrap_or(center), rotation, mirrored)
    } else {
        return Err(NormalizeError::MissingPose);
    };

    check_finite(position[0], "position")?;
    check_finite(position[1], "position")?;
    check_finite(rotation, "rotation")?;

    let mut obs = PieceObservation::new(id, piece_type, position, rotation, mirrored, raw.timestamp);
    if let Some(v) = raw.velocity {
        check_finite(v[0], "velocity")?;
        check_finite(v[1], "velocity")?;
        obs.velocity = Some(v);
    }
    if let Some(c) = raw.confidence {
        check_finite(c, "confidence")?;
        obs.confidence = Some(c.clamp(0.0, 1.0));
    }
    Ok(obs)
}

/// Normalize a frame's worth of raw records.
///
/// Malformed records are dropped with a warning. When an id appears more
/// than once the highest-confidence record wins; ties go to the later one.
pub fn normalize_frame(raws: &[RawPose]) -> NormalizedFrame {
    let mut by_id: BTreeMap<PieceId, PieceObservation> = BTreeMap::new();
    let mut out = NormalizedFrame::default();

    for (index, raw) in raws.iter().enumerate() {
        let obs = match normalize_pose(raw) {
            Ok(obs) => obs,
            Err(err) => {
                tracing::warn!(index, key = ?raw.piece_key(), %err, "dropping malformed pose record");
                out.n_dropped += 1;
                continue;
            }
        };
        match by_id.get(&obs.id) {
            Some(prev) => {
                out.n_duplicates += 1;
                if obs.weight() >= prev.weight() {
                    by_id.insert(obs.id, obs);
                }
            }
            None => {
                by_id.insert(obs.id, obs);
            }
        }
    }

    out.observations = by_id.into_values().collect();
    out
}

fn resolve_type(raw: &RawPose) -> Result<PieceType, NormalizeError> {
    match (raw.piece_type, raw.class_id) {
        (Some(piece_type), Some(class_id)) => {
            if PieceType::from_class_id(class_id) == Some(piece_type) {
                Ok(piece_type)
            } else {
                Err(NormalizeError::ClassMismatch {
                    class_id,
                    piece_type,
                })
            }
        }
        (Some(piece_type), None) => Ok(piece_type),
        (None, Some(class_id)) => {
            PieceType::from_class_id(class_id).ok_or(NormalizeError::UnknownClass { class_id })
        }
        (None, None) => Err(NormalizeError::MissingType),
    }
}

/// Decompose `[[a, b, tx], [c, d, ty]]` into translation, rotation and mirror.
///
/// A reflection on a shape that is symmetric under it is folded into the
/// rotation: triangles are symmetric about their apex axis, so the reflected
/// canonical triangle equals the canonical one turned by π; the square is
/// symmetric about the x axis.
fn pose_from_affine(
    affine: &[[f64; 3]; 2],
    shape: PieceShape,
) -> Result<([f64; 2], f64, bool), NormalizeError> {
    if affine.iter().flatten().any(|v| !v.is_finite()) {
        return Err(NormalizeError::NonFinite { field: "affine" });
    }
    let [[a, b, tx], [c, d, ty]] = *affine;
    let det = a * d - b * c;
    if det.abs() < MIN_AFFINE_DET {
        return Err(NormalizeError::DegenerateAffine { det });
    }
    let reflected = det < 0.0;
    let rotation = c.atan2(a);
    let (rotation, mirrored) = match (reflected, shape) {
        (true, PieceShape::Parallelogram) => (rotation, true),
        (true, PieceShape::Square) => (rotation, false),
        (true, _) => (rotation + PI, false),
        (false, _) => (rotation, false),
    };
    Ok(([tx, ty], rotation, mirrored))
}

#[inline]
fn check_finite(v: f64, field: &'static str) -> Result<(), NormalizeError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(NormalizeError::NonFinite { field })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn touch_record_is_normalized() {
        let raw = RawPose::touch(3, PieceType::Square, [10.0, 20.0], 3.0 * PI, true, 0.5);
        let obs = normalize_pose(&raw).unwrap();
        assert_eq!(obs.id, PieceId(3));
        assert_abs_diff_eq!(obs.rotation, PI, epsilon = 1e-9);
        assert!(!obs.is_mirrored, "non-mirrorable kinds are never mirrored");
    }

    #[test]
    fn negative_determinant_marks_parallelogram_mirrored() {
        let angle: f64 = 0.3;
        let (s, c) = angle.sin_cos();
        // R(angle) * diag(1, -1)
        let affine = [[c, s, 100.0], [s, -c, 50.0]];
        let obs = normalize_pose(&RawPose::detection(6, affine, 1.0, 0.9)).unwrap();
        assert_eq!(obs.piece_type, PieceType::Parallelogram);
        assert_eq!(obs.id, PieceId(6));
        assert!(obs.is_mirrored);
        assert_abs_diff_eq!(obs.rotation, angle, epsilon = 1e-12);
        assert_eq!(obs.position, [100.0, 50.0]);

        let plain = [[c, -s, 100.0], [s, c, 50.0]];
        let obs = normalize_pose(&RawPose::detection(6, plain, 1.0, 0.9)).unwrap();
        assert!(!obs.is_mirrored);
    }

    #[test]
    fn reflected_triangle_turns_half_a_revolution() {
        let affine = [[1.0, 0.0, 0.0], [0.0, -1.0, 0.0]];
        let obs = normalize_pose(&RawPose::detection(3, affine, 0.0, 1.0)).unwrap();
        assert!(!obs.is_mirrored);
        assert_abs_diff_eq!(obs.rotation, PI, epsilon = 1e-12);
    }

    #[test]
    fn polygon_record_uses_outline() {
        let verts: Vec<[f64; 2]> = PieceShape::MediumTriangle
            .canonical_vertices(50.0, false)
            .into_iter()
            .map(|v| [-v[1] + 7.0, v[0] - 3.0])
            .collect();
        let obs = normalize_pose(&RawPose::polygon(2, verts, 0.0, 0.8)).unwrap();
        assert_eq!(obs.piece_type, PieceType::MediumTriangle);
        assert_abs_diff_eq!(obs.rotation, FRAC_PI_2, epsilon = 1e-9);
        assert_abs_diff_eq!(obs.position[0], 7.0, epsilon = 1e-9);
        assert_abs_diff_eq!(obs.position[1], -3.0, epsilon = 1e-9);
    }

    #[test]
    fn malformed_records_are_dropped_and_frame_continues() {
        let good = RawPose::touch(1, PieceType::Square, [0.0, 0.0], 0.0, false, 0.0);
        let no_pose = RawPose {
            id: Some(2),
            piece_type: Some(PieceType::Square),
            ..RawPose::default()
        };
        let nan = RawPose::touch(4, PieceType::Square, [f64::NAN, 0.0], 0.0, false, 0.0);
        let unknown = RawPose::detection(42, [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], 0.0, 1.0);
        let singular = RawPose::detection(5, [[0.0, 0.0, 0.0], [0.0, 0.0, 0.0]], 0.0, 1.0);

        let frame = normalize_frame(&[no_pose, good, nan, unknown, singular]);
        assert_eq!(frame.n_dropped, 4);
        assert_eq!(frame.observations.len(), 1);
        assert_eq!(frame.observations[0].id, PieceId(1));
    }

    #[test]
    fn duplicate_ids_keep_highest_confidence() {
        let low = RawPose::touch(1, PieceType::Square, [0.0, 0.0], 0.0, false, 0.0).with_confidence(0.2);
        let high = RawPose::touch(1, PieceType::Square, [5.0, 0.0], 0.0, false, 0.0).with_confidence(0.9);
        let later_low = RawPose::touch(1, PieceType::Square, [9.0, 0.0], 0.0, false, 0.0).with_confidence(0.5);

        let frame = normalize_frame(&[low, high, later_low]);
        assert_eq!(frame.observations.len(), 1);
        assert_eq!(frame.n_duplicates, 2);
        assert_eq!(frame.observations[0].position, [5.0, 0.0]);
    }

    #[test]
    fn class_and_type_must_agree() {
        let mut raw = RawPose::touch(1, PieceType::Square, [0.0, 0.0], 0.0, false, 0.0);
        raw.class_id = Some(0);
        assert!(matches!(
            normalize_pose(&raw),
            Err(NormalizeError::ClassMismatch { class_id: 0, .. })
        ));
    }
}
