//! Per-piece validation: symmetry-aware checks, duplicate-piece instance
//! binding and hysteresis.

mod binding;
mod check;
mod hysteresis;

pub(crate) use binding::{bind_members, BindContext, BindingTable, MemberInput, MemberOutcome};
pub(crate) use check::{check_piece, PieceCheck};
pub use check::FailureReason;
pub(crate) use hysteresis::{step, CheckEvent};
pub use hysteresis::{PieceValidationState, ValidationStatus};
