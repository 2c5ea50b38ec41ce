//! Relative-geometry pose matching and validation for
//! seven-piece tangram assemblies.
//!
//! Pieces may be assembled anywhere on the play surface, at any rotation and
//! in either mirrored orientation. The engine never compares absolute
//! coordinates: it clusters pieces into construction groups, anchors each
//! group on one piece, estimates a rigid mapping (rotation, translation,
//! mirror) into the puzzle frame, and validates every member against the
//! target slots through that mapping. The frame stages are:
//!
//! 1. **Observation** – normalize touch or vision poses (explicit pose,
//!    affine transform or outline polygon).
//! 2. **Tracking** – motion history, dwell and unwrapped feature angles.
//! 3. **Grouping** – proximity clustering with group identity across frames.
//! 4. **Mapping** – anchor hypotheses, single-pair mapping, least-squares
//!    refinement.
//! 5. **Validation** – symmetry-aware checks, duplicate-piece binding,
//!    hysteresis.
//!
//! # Public API
//! - [`Engine`] and [`Puzzle`] as primary entry points
//! - [`EngineConfig`] / [`ValidationOptions`] for tuning
//! - [`RawPose`] and the observation feed for input, [`ValidationResult`]
//!   for output
//!
//! Mapping, binding and grouping internals are not part of the public surface.

mod anchor;
mod api;
mod config;
mod geometry;
mod grouping;
mod mapping;
mod observation;
mod piece;
mod pipeline;
mod puzzle;
mod tracking;
mod validate;

#[cfg(test)]
mod test_utils;

pub use api::Engine;
pub use config::{
    BindingConfig, Difficulty, EngineConfig, GroupingConfig, HysteresisConfig, SolverConfig,
    ToleranceSet, TrackingConfig, ValidationOptions,
};
pub use geometry::{normalize_angle, symmetric_angle_diff};
pub use grouping::{GroupId, GroupState};
pub use mapping::SolveError;
pub use observation::{
    normalize_frame, normalize_pose, observation_channel, FeedError, NormalizeError,
    NormalizedFrame, ObservationReceiver, ObservationSender, PieceObservation, RawPose,
};
pub use piece::{pose_from_vertices, OutlinePose, PieceId, PieceShape, PieceType, TargetId};
pub use pipeline::{
    FrameStats, GroupReport, Hint, MappingSummary, PieceReport, ValidationResult,
};
pub use puzzle::{Puzzle, PuzzleError, TargetPiece};
pub use validate::{FailureReason, PieceValidationState, ValidationStatus};
