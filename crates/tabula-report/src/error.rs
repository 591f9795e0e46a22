//! Report controller errors

use crate::stall::StallKind;
use crate::state_machine::{ControllerState, TransitionError};
use serde::{Deserialize, Serialize};
use tabula_core::{RequestFailure, ValidationError};

/// Errors returned by [`crate::ReportController`] operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReportError {
    /// Input rejected locally
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Collaborator call failed; the user may retry
    #[error(transparent)]
    Request(#[from] RequestFailure),

    /// Operation would make an illegal state transition
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Operation is not available in the current state
    #[error("{operation} is not available while {state}")]
    NotAllowed {
        operation: &'static str,
        state: ControllerState,
    },

    /// No plan has been generated yet
    #[error("no report plan")]
    NoPlan,

    /// Another plan request or submission is in flight
    #[error("another report operation is in progress")]
    Busy,
}

/// Why an execution ended in `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// Executor reported `status: error`
    Executor(String),
    /// Synthesized locally after too many stalled polls
    StallTimeout(StallKind),
}

impl FailureReason {
    /// Message suitable for display
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Executor(message) => message,
            Self::StallTimeout(kind) => kind.message(),
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}
