//! Per-frame validation pipeline.
//!
//! This module wires the stages together:
//! normalize -> track motion -> cluster & migrate groups -> per-group pass
//! (anchor, mapping, binding, refinement) -> hysteresis -> report.
//!
//! Algorithmic primitives live in `crate::grouping`, `crate::mapping` and
//! `crate::validate`; the pipeline owns call order and the frame-to-frame
//! state.

mod group_pass;
mod hint;
mod result;
mod run;
mod state;

pub use hint::Hint;
pub use result::{FrameStats, GroupReport, MappingSummary, PieceReport, ValidationResult};

pub(crate) use hint::best_hint;
pub(crate) use run::run_frame;
pub(crate) use state::EngineState;
