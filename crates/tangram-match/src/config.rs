//! Engine configuration and per-session validation options.
//!
//! Distances are expressed in multiples of `EngineConfig::unit_length` (the
//! side of the square piece) so that one config works across screen sizes
//! and camera distances.

use crate::piece::PieceId;

/// Tolerance tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn tolerances(self) -> ToleranceSet {
        match self {
            Self::Easy => ToleranceSet {
                position_units: 0.4,
                rotation_deg: 15.0,
            },
            Self::Medium => ToleranceSet {
                position_units: 0.25,
                rotation_deg: 10.0,
            },
            Self::Hard => ToleranceSet {
                position_units: 0.12,
                rotation_deg: 6.0,
            },
        }
    }
}

/// Position and rotation acceptance limits for a single piece.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToleranceSet {
    /// Maximum center distance, in unit lengths.
    pub position_units: f64,
    /// Maximum symmetric feature-angle difference, in degrees.
    pub rotation_deg: f64,
}

impl ToleranceSet {
    pub(crate) fn resolve(&self, unit_length: f64) -> ResolvedTolerance {
        ResolvedTolerance {
            position: (self.position_units * unit_length).max(f64::EPSILON),
            rotation: self.rotation_deg.to_radians().max(f64::EPSILON),
        }
    }
}

/// Tolerances converted to absolute distance and radians.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResolvedTolerance {
    pub(crate) position: f64,
    pub(crate) rotation: f64,
}

/// Options the host may change between frames.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ValidationOptions {
    pub difficulty: Difficulty,
    /// Replaces the tier's tolerances when set.
    pub tolerance_override: Option<ToleranceSet>,
    /// Piece currently held or dragged; always counts as recently moved.
    pub focus_piece: Option<PieceId>,
}

impl ValidationOptions {
    pub fn tolerances(&self) -> ToleranceSet {
        self.tolerance_override
            .unwrap_or_else(|| self.difficulty.tolerances())
    }
}

/// Construction-group clustering and scoring.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    /// Link distance as a multiple of the mean width of the two pieces.
    pub proximity_piece_widths: f64,
    /// A piece counts as recently moved for this long after its last motion.
    pub recency_window_secs: f64,
    /// Center displacement (unit lengths) that counts as motion.
    pub move_epsilon_units: f64,
    /// Rotation change (degrees) that counts as motion.
    pub rotation_epsilon_deg: f64,
    /// Validated fraction of puzzle targets above which a group is `Completing`.
    pub completing_fraction: f64,
    pub proximity_weight: f64,
    pub alignment_weight: f64,
    pub count_weight: f64,
    /// Member count at which the count score saturates.
    pub count_saturation: usize,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            proximity_piece_widths: 2.0,
            recency_window_secs: 2.0,
            move_epsilon_units: 0.02,
            rotation_epsilon_deg: 1.0,
            completing_fraction: 0.6,
            proximity_weight: 0.4,
            alignment_weight: 0.3,
            count_weight: 0.3,
            count_saturation: 4,
        }
    }
}

/// Rigid-mapping estimation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Coarse rotation grid step (degrees) for multi-pair fits.
    pub coarse_step_deg: f64,
    /// Golden-section stops once the bracket is narrower than this (degrees).
    pub fine_tolerance_deg: f64,
    /// Evaluation budget of the golden-section refinement.
    pub max_golden_evals: usize,
    /// Weight of the angular residual term relative to the positional one.
    ///
    /// Angular residuals (radians) are scaled by `unit_length` before weighting.
    pub rotation_weight: f64,
    /// Minimum RMS spread (unit lengths) of observed centers for a fit.
    pub min_spread_units: f64,
    /// Refit/re-evaluate passes allowed per group per frame.
    pub max_refine_passes: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            coarse_step_deg: 2.0,
            fine_tolerance_deg: 0.25,
            max_golden_evals: 40,
            rotation_weight: 1.0,
            min_spread_units: 1e-3,
            max_refine_passes: 2,
        }
    }
}

/// Duplicate-piece instance binding.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Required score advantage for a rebind, and the ambiguity band between
    /// two passing candidates.
    pub rebind_margin: f64,
    /// Let passing pieces claim targets held by uncorroborated pieces of
    /// other groups.
    pub allow_preemption: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            rebind_margin: 0.5,
            allow_preemption: true,
        }
    }
}

/// Flicker suppression.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct HysteresisConfig {
    /// Consecutive passes needed to reach `Validated`.
    pub confirm_frames: u32,
    /// Consecutive failures needed to drop a validated piece to `Invalid`.
    pub release_frames: u32,
    /// Upper bound for both counters.
    pub counter_cap: u32,
}

impl Default for HysteresisConfig {
    fn default() -> Self {
        Self {
            confirm_frames: 2,
            release_frames: 4,
            counter_cap: 5,
        }
    }
}

impl HysteresisConfig {
    /// Clamp to `1 <= confirm < release <= cap`.
    pub fn normalized(self) -> Self {
        let confirm_frames = self.confirm_frames.max(1);
        let release_frames = self.release_frames.max(confirm_frames + 1);
        let counter_cap = self.counter_cap.max(release_frames);
        Self {
            confirm_frames,
            release_frames,
            counter_cap,
        }
    }
}

/// Motion tracking across frames.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Frames a piece may be missing before it is forgotten. Bridges
    /// detector dropouts without losing validation state.
    pub max_missed_frames: u32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_missed_frames: 2,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Side of the square piece in observation units.
    pub unit_length: f64,
    pub grouping: GroupingConfig,
    pub solver: SolverConfig,
    pub binding: BindingConfig,
    pub hysteresis: HysteresisConfig,
    pub tracking: TrackingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            unit_length: 50.0,
            grouping: GroupingConfig::default(),
            solver: SolverConfig::default(),
            binding: BindingConfig::default(),
            hysteresis: HysteresisConfig::default(),
            tracking: TrackingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_unit_length(unit_length: f64) -> Self {
        Self {
            unit_length,
            ..Self::default()
        }
        .normalized()
    }

    /// Replace non-finite or non-positive scalars with defaults.
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        let mut out = self;
        if !out.unit_length.is_finite() || out.unit_length <= 0.0 {
            out.unit_length = defaults.unit_length;
        }
        let g = &mut out.grouping;
        if !g.proximity_piece_widths.is_finite() || g.proximity_piece_widths <= 0.0 {
            g.proximity_piece_widths = defaults.grouping.proximity_piece_widths;
        }
        if !g.recency_window_secs.is_finite() || g.recency_window_secs < 0.0 {
            g.recency_window_secs = defaults.grouping.recency_window_secs;
        }
        g.count_saturation = g.count_saturation.max(2);
        let s = &mut out.solver;
        if !s.coarse_step_deg.is_finite() || s.coarse_step_deg <= 0.0 {
            s.coarse_step_deg = defaults.solver.coarse_step_deg;
        }
        if !s.fine_tolerance_deg.is_finite() || s.fine_tolerance_deg <= 0.0 {
            s.fine_tolerance_deg = defaults.solver.fine_tolerance_deg;
        }
        s.max_golden_evals = s.max_golden_evals.max(4);
        if !s.rotation_weight.is_finite() || s.rotation_weight < 0.0 {
            s.rotation_weight = defaults.solver.rotation_weight;
        }
        if !out.binding.rebind_margin.is_finite() || out.binding.rebind_margin < 0.0 {
            out.binding.rebind_margin = defaults.binding.rebind_margin;
        }
        out.hysteresis = out.hysteresis.normalized();
        out
    }
}
