//! Flicker-resistant validation state machine.
//!
//! ```text
//!   Unvalidated --pass--> Provisional --N passes--> Validated
//!        ^                    |                        |
//!        +-------fail---------+                  M fails
//!                                                      v
//!                                 Provisional <--pass-- Invalid
//! ```

use super::check::FailureReason;
use crate::config::HysteresisConfig;
use crate::piece::TargetId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    #[default]
    Unvalidated,
    Provisional,
    Validated,
    Invalid,
}

impl ValidationStatus {
    /// Unvalidated and invalid pieces hold their binding only softly.
    #[inline]
    pub(crate) fn is_uncorroborated(self) -> bool {
        matches!(self, Self::Unvalidated | Self::Invalid)
    }
}

/// Per-frame input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CheckEvent {
    Pass,
    /// Passed, but against more than one equally good target or mapping.
    Ambiguous,
    Fail(FailureReason),
    /// No evidence either way this frame.
    Hold,
}

/// Validation state of one tracked piece.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PieceValidationState {
    pub status: ValidationStatus,
    pub consecutive_pass: u32,
    pub consecutive_fail: u32,
    pub bound_target: Option<TargetId>,
    pub last_failure_reason: Option<FailureReason>,
    /// Distance from the bound (or closest) target after mapping.
    pub position_error: Option<f64>,
    /// Symmetric feature-angle error (radians) against the same target.
    pub rotation_error: Option<f64>,
}

/// Apply one event. Pure; binding and error fields are carried over.
pub(crate) fn step(
    state: &PieceValidationState,
    event: CheckEvent,
    config: &HysteresisConfig,
) -> PieceValidationState {
    let mut next = state.clone();
    match event {
        CheckEvent::Pass => {
            next.consecutive_pass = (state.consecutive_pass + 1).min(config.counter_cap);
            next.consecutive_fail = 0;
            next.last_failure_reason = None;
            next.status = if state.status == ValidationStatus::Validated
                || next.consecutive_pass >= config.confirm_frames
            {
                ValidationStatus::Validated
            } else {
                ValidationStatus::Provisional
            };
        }
        CheckEvent::Ambiguous => {
            next.consecutive_fail = 0;
            next.last_failure_reason = None;
            if state.status != ValidationStatus::Validated {
                next.consecutive_pass = state
                    .consecutive_pass
                    .min(config.confirm_frames.saturating_sub(1));
                next.status = ValidationStatus::Provisional;
            }
        }
        CheckEvent::Fail(reason) => {
            next.consecutive_pass = 0;
            next.consecutive_fail = (state.consecutive_fail + 1).min(config.counter_cap);
            next.last_failure_reason = Some(reason);
            next.status = match state.status {
                ValidationStatus::Validated if next.consecutive_fail >= config.release_frames => {
                    ValidationStatus::Invalid
                }
                ValidationStatus::Validated => ValidationStatus::Validated,
                ValidationStatus::Provisional | ValidationStatus::Unvalidated => {
                    ValidationStatus::Unvalidated
                }
                ValidationStatus::Invalid => ValidationStatus::Invalid,
            };
        }
        CheckEvent::Hold => {}
    }
    next
}
