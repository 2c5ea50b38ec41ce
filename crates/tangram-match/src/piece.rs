//! Piece identities, kinds and canonical shape geometry.
//!
//! Every kind maps onto one of five [`PieceShape`]s. Two shapes (large and
//! small triangle) are shared by two kinds each; those are the duplicated
//! pieces the instance binder has to disambiguate.

use std::f64::consts::{FRAC_PI_2, PI, SQRT_2, TAU};
use std::fmt;

use crate::geometry::{normalize_angle, signed_area};

/// Stable identifier of a physical (or on-screen) piece.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct PieceId(pub u32);

impl fmt::Display for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "piece#{}", self.0)
    }
}

/// Identifier of one target slot in a puzzle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct TargetId(pub u32);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target#{}", self.0)
    }
}

/// The seven tangram piece kinds.
///
/// Declaration order matches the vision class ids `0..=6`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PieceType {
    LargeTriangleA,
    LargeTriangleB,
    MediumTriangle,
    SmallTriangleA,
    SmallTriangleB,
    Square,
    Parallelogram,
}

impl PieceType {
    pub const ALL: [PieceType; 7] = [
        Self::LargeTriangleA,
        Self::LargeTriangleB,
        Self::MediumTriangle,
        Self::SmallTriangleA,
        Self::SmallTriangleB,
        Self::Square,
        Self::Parallelogram,
    ];

    pub fn shape(self) -> PieceShape {
        match self {
            Self::LargeTriangleA | Self::LargeTriangleB => PieceShape::LargeTriangle,
            Self::MediumTriangle => PieceShape::MediumTriangle,
            Self::SmallTriangleA | Self::SmallTriangleB => PieceShape::SmallTriangle,
            Self::Square => PieceShape::Square,
            Self::Parallelogram => PieceShape::Parallelogram,
        }
    }

    /// Class id emitted by the vision detector for this kind.
    pub fn class_id(self) -> u32 {
        self as u32
    }

    pub fn from_class_id(class_id: u32) -> Option<Self> {
        Self::ALL.get(class_id as usize).copied()
    }

    #[inline]
    pub fn is_mirrorable(self) -> bool {
        self.shape().is_mirrorable()
    }
}

/// Geometric shape class shared by one or two piece kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PieceShape {
    LargeTriangle,
    MediumTriangle,
    SmallTriangle,
    Square,
    Parallelogram,
}

impl PieceShape {
    #[inline]
    pub fn is_triangle(self) -> bool {
        matches!(
            self,
            Self::LargeTriangle | Self::MediumTriangle | Self::SmallTriangle
        )
    }

    #[inline]
    pub fn is_mirrorable(self) -> bool {
        self == Self::Parallelogram
    }

    /// Angle between the piece's rotation and its feature direction.
    ///
    /// Triangles point at the right-angle apex; the square and the
    /// parallelogram use their (long) edge direction.
    pub fn feature_offset(self) -> f64 {
        if self.is_triangle() {
            FRAC_PI_2
        } else {
            0.0
        }
    }

    /// Rotational symmetry period of the feature angle.
    pub fn symmetry_period(self) -> f64 {
        match self {
            Self::Square => FRAC_PI_2,
            Self::Parallelogram => PI,
            _ => TAU,
        }
    }

    /// Leg length of a triangle (in square-side units).
    fn leg_units(self) -> f64 {
        match self {
            Self::LargeTriangle => 2.0,
            Self::MediumTriangle => SQRT_2,
            _ => 1.0,
        }
    }

    /// Largest vertex-to-vertex extent, in square-side units.
    pub fn width_units(self) -> f64 {
        match self {
            Self::Square => SQRT_2,
            Self::Parallelogram => 5.0_f64.sqrt(),
            tri => tri.leg_units() * SQRT_2,
        }
    }

    /// Canonical outline at rotation 0, centered on the origin.
    ///
    /// Triangles lie with the hypotenuse along +x and the apex toward +y.
    /// The parallelogram has its long side along +x and the short side at
    /// +45°; the mirrored variant is reflected across the x axis.
    pub fn canonical_vertices(self, unit: f64, mirrored: bool) -> Vec<[f64; 2]> {
        let mut verts = match self {
            Self::Square => {
                let h = 0.5 * unit;
                vec![[-h, -h], [h, -h], [h, h], [-h, h]]
            }
            Self::Parallelogram => {
                let a = SQRT_2 * unit;
                let s = unit / SQRT_2;
                let cx = 0.5 * (a + s);
                let cy = 0.5 * s;
                vec![
                    [-cx, -cy],
                    [a - cx, -cy],
                    [a + s - cx, s - cy],
                    [s - cx, s - cy],
                ]
            }
            tri => {
                let h = tri.leg_units() * SQRT_2 * unit;
                vec![
                    [-0.5 * h, -h / 6.0],
                    [0.5 * h, -h / 6.0],
                    [0.0, h / 3.0],
                ]
            }
        };
        if mirrored && self.is_mirrorable() {
            for v in &mut verts {
                v[1] = -v[1];
            }
            verts.reverse();
        }
        verts
    }
}

/// Pose recovered from an outline: `(center, rotation, is_mirrored)`.
pub type OutlinePose = ([f64; 2], f64, bool);

/// Recover the pose of a piece from its outline vertices.
///
/// Vertex order may be clockwise or counter-clockwise. Returns `None` for a
/// wrong vertex count or a degenerate outline.
pub fn pose_from_vertices(shape: PieceShape, vertices: &[[f64; 2]]) -> Option<OutlinePose> {
    let n = if shape.is_triangle() { 3 } else { 4 };
    if vertices.len() != n || vertices.iter().flatten().any(|c| !c.is_finite()) {
        return None;
    }
    if signed_area(vertices).abs() < 1e-9 {
        return None;
    }

    let center = {
        let (sx, sy) = vertices
            .iter()
            .fold((0.0, 0.0), |(sx, sy), v| (sx + v[0], sy + v[1]));
        [sx / n as f64, sy / n as f64]
    };

    let edge = |from: usize, to: usize| {
        [
            vertices[to][0] - vertices[from][0],
            vertices[to][1] - vertices[from][1],
        ]
    };
    let len2 = |e: [f64; 2]| e[0] * e[0] + e[1] * e[1];

    match shape {
        PieceShape::Square => {
            let e = edge(0, 1);
            Some((center, normalize_angle(e[1].atan2(e[0])), false))
        }
        PieceShape::Parallelogram => {
            for i in 0..4 {
                let e1 = edge(i, (i + 1) % 4);
                let e2 = edge(i, (i + 3) % 4);
                if e1[0] * e2[0] + e1[1] * e2[1] <= 0.0 {
                    continue;
                }
                let (long, short) = if len2(e1) >= len2(e2) { (e1, e2) } else { (e2, e1) };
                let cross = long[0] * short[1] - long[1] * short[0];
                return Some((center, normalize_angle(long[1].atan2(long[0])), cross < 0.0));
            }
            None
        }
        _ => {
            // The apex is the vertex opposite the longest edge.
            let apex = (0..3)
                .max_by(|&a, &b| {
                    let ea = len2(edge((a + 1) % 3, (a + 2) % 3));
                    let eb = len2(edge((b + 1) % 3, (b + 2) % 3));
                    ea.total_cmp(&eb)
                })
                .unwrap_or(0);
            let dx = vertices[apex][0] - center[0];
            let dy = vertices[apex][1] - center[1];
            Some((center, normalize_angle(dy.atan2(dx) - FRAC_PI_2), false))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn transform(verts: &[[f64; 2]], angle: f64, offset: [f64; 2]) -> Vec<[f64; 2]> {
        let (s, c) = angle.sin_cos();
        verts
            .iter()
            .map(|v| [c * v[0] - s * v[1] + offset[0], s * v[0] + c * v[1] + offset[1]])
            .collect()
    }

    #[test]
    fn class_ids_follow_declaration_order() {
        for (i, kind) in PieceType::ALL.iter().enumerate() {
            assert_eq!(kind.class_id(), i as u32);
            assert_eq!(PieceType::from_class_id(i as u32), Some(*kind));
        }
        assert_eq!(PieceType::from_class_id(7), None);
    }

    #[test]
    fn only_parallelogram_is_mirrorable() {
        let mirrorable: Vec<_> = PieceType::ALL
            .iter()
            .filter(|k| k.is_mirrorable())
            .collect();
        assert_eq!(mirrorable, vec![&PieceType::Parallelogram]);
    }

    #[test]
    fn canonical_outlines_recover_identity_pose() {
        let shapes = [
            PieceShape::LargeTriangle,
            PieceShape::MediumTriangle,
            PieceShape::SmallTriangle,
            PieceShape::Square,
            PieceShape::Parallelogram,
        ];
        for shape in shapes {
            let verts = shape.canonical_vertices(50.0, false);
            let (center, rotation, mirrored) = pose_from_vertices(shape, &verts).unwrap();
            assert_abs_diff_eq!(center[0], 0.0, epsilon = 1e-9);
            assert_abs_diff_eq!(center[1], 0.0, epsilon = 1e-9);
            assert_abs_diff_eq!(rotation, 0.0, epsilon = 1e-9);
            assert!(!mirrored, "{shape:?}");
        }
    }

    #[test]
    fn rotated_triangle_outline_recovers_rotation() {
        let verts = PieceShape::SmallTriangle.canonical_vertices(40.0, false);
        let moved = transform(&verts, 1.1, [300.0, -20.0]);
        let (center, rotation, _) = pose_from_vertices(PieceShape::SmallTriangle, &moved).unwrap();
        assert_abs_diff_eq!(center[0], 300.0, epsilon = 1e-9);
        assert_abs_diff_eq!(center[1], -20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(rotation, 1.1, epsilon = 1e-9);
    }

    #[test]
    fn parallelogram_mirror_is_detected_in_either_winding() {
        let verts = PieceShape::Parallelogram.canonical_vertices(50.0, true);
        let moved = transform(&verts, -0.4, [10.0, 10.0]);
        let (_, rotation, mirrored) = pose_from_vertices(PieceShape::Parallelogram, &moved).unwrap();
        assert!(mirrored);
        let period = PieceShape::Parallelogram.symmetry_period();
        let wrapped = (rotation + 0.4).rem_euclid(period);
        assert!(wrapped < 1e-9 || (period - wrapped) < 1e-9);

        let mut reversed = moved.clone();
        reversed.reverse();
        let (_, _, mirrored_rev) =
            pose_from_vertices(PieceShape::Parallelogram, &reversed).unwrap();
        assert!(mirrored_rev);
    }

    #[test]
    fn degenerate_or_miscounted_outlines_are_rejected() {
        assert!(pose_from_vertices(PieceShape::Square, &[[0.0, 0.0]; 4]).is_none());
        assert!(pose_from_vertices(PieceShape::SmallTriangle, &[[0.0, 0.0], [1.0, 0.0]]).is_none());
        assert!(pose_from_vertices(
            PieceShape::SmallTriangle,
            &[[0.0, 0.0], [1.0, f64::NAN], [0.0, 1.0]]
        )
        .is_none());
    }
}
