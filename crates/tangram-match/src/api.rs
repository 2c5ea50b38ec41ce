//! High-level validation API.
//!
//! [`Engine`] owns a puzzle, its configuration and all frame-to-frame state.
//! Feed it one frame of poses at a time; every call returns the full
//! [`ValidationResult`] for that frame.

use std::path::Path;

use crate::config::{EngineConfig, ValidationOptions};
use crate::observation::{normalize_frame, NormalizedFrame, ObservationReceiver, PieceObservation, RawPose};
use crate::piece::{PieceId, TargetId};
use crate::pipeline::{self, EngineState, Hint, ValidationResult};
use crate::puzzle::Puzzle;
use crate::validate::PieceValidationState;

/// Primary validation interface.
///
/// Create once per puzzle, then call [`Engine::process_frame`] for every
/// observation frame.
///
/// # Examples
///
/// ```
/// use tangram_match::{Engine, PieceType, Puzzle, RawPose};
///
/// let mut engine = Engine::new(Puzzle::standard(50.0).unwrap());
/// let frame = vec![RawPose::touch(1, PieceType::Square, [400.0, 300.0], 0.3, false, 0.0)];
/// let result = engine.process_frame(&frame);
/// assert_eq!(result.pieces.len(), 1);
/// ```
#[derive(Debug)]
pub struct Engine {
    puzzle: Puzzle,
    config: EngineConfig,
    options: ValidationOptions,
    state: EngineState,
}

impl Engine {
    /// Create an engine with default configuration.
    pub fn new(puzzle: Puzzle) -> Self {
        Self::with_config(puzzle, EngineConfig::default())
    }

    /// Create with full config control.
    pub fn with_config(puzzle: Puzzle, config: EngineConfig) -> Self {
        tracing::info!(
            puzzle = puzzle.name(),
            n_targets = puzzle.n_targets(),
            unit_length = config.unit_length,
            "engine created"
        );
        Self {
            puzzle,
            config: config.normalized(),
            options: ValidationOptions::default(),
            state: EngineState::default(),
        }
    }

    /// Load puzzle JSON and create an engine in one step.
    pub fn from_puzzle_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::new(Puzzle::from_json_file(path)?))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replace the configuration between frames. Values are normalized the
    /// same way as at construction.
    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config.normalized();
    }

    pub fn options(&self) -> &ValidationOptions {
        &self.options
    }

    /// Change difficulty, tolerance override or focus piece; applies from the
    /// next frame on.
    pub fn set_options(&mut self, options: ValidationOptions) {
        self.options = options;
    }

    pub fn puzzle(&self) -> &Puzzle {
        &self.puzzle
    }

    /// Swap the puzzle. All pieces, groups, mappings and bindings are
    /// cleared before the next frame.
    pub fn load_puzzle(&mut self, puzzle: Puzzle) {
        tracing::info!(puzzle = puzzle.name(), n_targets = puzzle.n_targets(), "puzzle loaded");
        self.puzzle = puzzle;
        self.state.reset();
    }

    /// Forget everything observed so far.
    pub fn reset(&mut self) {
        tracing::debug!(frame_index = self.state.frame_index, "engine reset");
        self.state.reset();
    }

    /// Normalize and process one frame of raw poses.
    pub fn process_frame(&mut self, poses: &[RawPose]) -> ValidationResult {
        let frame = normalize_frame(poses);
        self.run(frame)
    }

    /// Process one frame of already normalized observations.
    ///
    /// Observations are sorted by id; for repeated ids the last one wins.
    pub fn process_observations(&mut self, mut observations: Vec<PieceObservation>) -> ValidationResult {
        let n = observations.len();
        observations.reverse();
        observations.sort_by_key(|o| o.id);
        observations.dedup_by_key(|o| o.id);
        let frame = NormalizedFrame {
            n_duplicates: n - observations.len(),
            observations,
            n_dropped: 0,
        };
        self.run(frame)
    }

    /// Drain `feed` and process the newest queued frame; older queued frames
    /// are skipped.
    ///
    /// Returns `None` when nothing was pending.
    pub fn process_pending(&mut self, feed: &ObservationReceiver) -> Option<ValidationResult> {
        let poses = feed.drain()?;
        Some(self.process_frame(&poses))
    }

    fn run(&mut self, frame: NormalizedFrame) -> ValidationResult {
        pipeline::run_frame(&mut self.state, frame, &self.puzzle, &self.config, &self.options)
    }

    /// Current validation state of a tracked piece.
    pub fn piece_state(&self, id: PieceId) -> Option<&PieceValidationState> {
        self.state.pieces.get(&id)
    }

    /// Targets occupied by a validated piece, sorted.
    pub fn validated_target_ids(&self) -> Vec<TargetId> {
        self.state.validated_target_ids()
    }

    /// Targets with any bound piece, sorted.
    pub fn consumed_targets(&self) -> Vec<TargetId> {
        self.state.bindings.consumed().collect()
    }

    /// Most promising next placement, based on the last processed frame.
    pub fn hint(&self) -> Option<Hint> {
        let tolerance = self.options.tolerances().resolve(self.config.unit_length);
        pipeline::best_hint(&self.state, &self.puzzle, &tolerance)
    }
}
