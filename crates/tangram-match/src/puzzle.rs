//! Target silhouettes.
//!
//! Puzzle JSON follows the `tangram-match.puzzle.v1` schema: a name plus an
//! ordered list of target slots in the puzzle's local frame. Positions and
//! rotations are only meaningful relative to each other; the engine never
//! compares them against absolute observed coordinates.

use std::collections::{HashMap, HashSet};
use std::f64::consts::SQRT_2;
use std::path::Path;

use crate::piece::{pose_from_vertices, PieceShape, PieceType, TargetId};

const PUZZLE_SCHEMA_V1: &str = "tangram-match.puzzle.v1";

const STANDARD_NAME: &str = "standard_square";

/// Standard seven-piece square on a `[0, 4]²` grid (square side √2).
const STANDARD_OUTLINES: [(PieceType, &[[f64; 2]]); 7] = [
    (PieceType::LargeTriangleA, &[[0.0, 0.0], [4.0, 0.0], [2.0, 2.0]]),
    (PieceType::LargeTriangleB, &[[0.0, 0.0], [2.0, 2.0], [0.0, 4.0]]),
    (PieceType::MediumTriangle, &[[4.0, 4.0], [2.0, 4.0], [4.0, 2.0]]),
    (PieceType::SmallTriangleA, &[[4.0, 0.0], [4.0, 2.0], [3.0, 1.0]]),
    (PieceType::SmallTriangleB, &[[2.0, 2.0], [3.0, 3.0], [1.0, 3.0]]),
    (
        PieceType::Square,
        &[[2.0, 2.0], [3.0, 1.0], [4.0, 2.0], [3.0, 3.0]],
    ),
    (
        PieceType::Parallelogram,
        &[[1.0, 3.0], [3.0, 3.0], [2.0, 4.0], [0.0, 4.0]],
    ),
];

/// One slot of the target silhouette.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetPiece {
    pub id: TargetId,
    pub piece_type: PieceType,
    /// Center in puzzle-local coordinates.
    pub position: [f64; 2],
    /// Rotation in radians.
    pub rotation: f64,
    #[serde(default)]
    pub is_mirrored: bool,
}

impl TargetPiece {
    #[inline]
    pub fn shape(&self) -> PieceShape {
        self.piece_type.shape()
    }

    pub(crate) fn feature_angle(&self) -> f64 {
        self.rotation + self.shape().feature_offset()
    }
}

/// Errors raised while building a [`Puzzle`].
#[derive(Debug, Clone, PartialEq)]
pub enum PuzzleError {
    UnsupportedSchema { found: String },
    EmptyName,
    NoTargets,
    DuplicateTarget { id: TargetId },
    NonFinitePose { id: TargetId },
    MirroredNonMirrorable { id: TargetId },
    InvalidUnit { unit: f64 },
}

impl std::fmt::Display for PuzzleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedSchema { found } => write!(
                f,
                "unsupported puzzle schema '{}' (expected '{}')",
                found, PUZZLE_SCHEMA_V1
            ),
            Self::EmptyName => write!(f, "puzzle name must not be empty"),
            Self::NoTargets => write!(f, "puzzle must contain at least one target"),
            Self::DuplicateTarget { id } => write!(f, "duplicate target id {}", id.0),
            Self::NonFinitePose { id } => write!(f, "target {} has a non-finite pose", id.0),
            Self::MirroredNonMirrorable { id } => {
                write!(f, "target {} is mirrored but its kind is not mirrorable", id.0)
            }
            Self::InvalidUnit { unit } => write!(f, "unit length must be finite and > 0, got {}", unit),
        }
    }
}

impl std::error::Error for PuzzleError {}

/// An immutable target silhouette.
#[derive(Debug, Clone)]
pub struct Puzzle {
    name: String,
    targets: Vec<TargetPiece>,

    /// Fast lookup: target ID -> index into `targets`.
    id_to_idx: HashMap<TargetId, usize>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct PuzzleSpecV1 {
    schema: String,
    name: String,
    targets: Vec<TargetPiece>,
}

impl Puzzle {
    pub fn new(name: impl Into<String>, targets: Vec<TargetPiece>) -> Result<Self, PuzzleError> {
        let name = name.into();
        validate_targets(&name, &targets)?;
        let id_to_idx = targets.iter().enumerate().map(|(i, t)| (t.id, i)).collect();
        Ok(Self {
            name,
            targets,
            id_to_idx,
        })
    }

    /// The classic square silhouette; `unit` is the side of the square piece.
    pub fn standard(unit: f64) -> Result<Self, PuzzleError> {
        if !unit.is_finite() || unit <= 0.0 {
            return Err(PuzzleError::InvalidUnit { unit });
        }
        let scale = unit / SQRT_2;
        let mut targets = Vec::with_capacity(STANDARD_OUTLINES.len());
        for (idx, (kind, outline)) in STANDARD_OUTLINES.iter().enumerate() {
            let id = TargetId(idx as u32);
            let scaled: Vec<[f64; 2]> = outline
                .iter()
                .map(|v| [v[0] * scale, v[1] * scale])
                .collect();
            let (position, rotation, is_mirrored) = pose_from_vertices(kind.shape(), &scaled)
                .ok_or(PuzzleError::NonFinitePose { id })?;
            targets.push(TargetPiece {
                id,
                piece_type: *kind,
                position,
                rotation,
                is_mirrored,
            });
        }
        Self::new(STANDARD_NAME, targets)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn targets(&self) -> &[TargetPiece] {
        &self.targets
    }

    pub fn n_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn target(&self, id: TargetId) -> Option<&TargetPiece> {
        self.id_to_idx.get(&id).map(|&idx| &self.targets[idx])
    }

    /// Targets sharing `shape`, in puzzle order.
    pub fn targets_of_shape(&self, shape: PieceShape) -> impl Iterator<Item = &TargetPiece> + '_ {
        self.targets.iter().filter(move |t| t.shape() == shape)
    }

    /// Load a puzzle from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn from_json_str(data: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let spec: PuzzleSpecV1 = serde_json::from_str(data)?;
        Self::from_spec(spec).map_err(Into::into)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        let spec = PuzzleSpecV1 {
            schema: PUZZLE_SCHEMA_V1.to_string(),
            name: self.name.clone(),
            targets: self.targets.clone(),
        };
        serde_json::to_string_pretty(&spec)
    }

    fn from_spec(spec: PuzzleSpecV1) -> Result<Self, PuzzleError> {
        if spec.schema != PUZZLE_SCHEMA_V1 {
            return Err(PuzzleError::UnsupportedSchema { found: spec.schema });
        }
        Self::new(spec.name, spec.targets)
    }
}

fn validate_targets(name: &str, targets: &[TargetPiece]) -> Result<(), PuzzleError> {
    if name.trim().is_empty() {
        return Err(PuzzleError::EmptyName);
    }
    if targets.is_empty() {
        return Err(PuzzleError::NoTargets);
    }

    let mut seen = HashSet::with_capacity(targets.len());
    for t in targets {
        if !seen.insert(t.id) {
            return Err(PuzzleError::DuplicateTarget { id: t.id });
        }
        if !(t.position[0].is_finite() && t.position[1].is_finite() && t.rotation.is_finite()) {
            return Err(PuzzleError::NonFinitePose { id: t.id });
        }
        if t.is_mirrored && !t.piece_type.is_mirrorable() {
            return Err(PuzzleError::MirroredNonMirrorable { id: t.id });
        }
    }
    Ok(())
}
