use serde::{Deserialize, Serialize};

/// Report controller lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Idle,
    PlanRequested,
    PlanReady,
    Editing,
    Executing,
    Completed,
    Failed,
    Stopped,
}

impl ControllerState {
    /// States an execution ends in
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// No network operation or poller is in flight
    #[inline]
    #[must_use]
    pub fn is_settled(self) -> bool {
        !matches!(self, Self::PlanRequested | Self::Executing)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::PlanRequested => "plan_requested",
            Self::PlanReady => "plan_ready",
            Self::Editing => "editing",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition {from} -> {to}")]
pub struct TransitionError {
    pub from: ControllerState,
    pub to: ControllerState,
}

/// Validates a controller state transition.
pub fn validate_transition(from: ControllerState, to: ControllerState) -> Result<(), TransitionError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

pub fn allowed_transitions(from: ControllerState) -> Vec<ControllerState> {
    use ControllerState::*;
    match from {
        Idle => vec![PlanRequested],
        // A failed plan request returns to wherever it started from
        PlanRequested => vec![PlanReady, Idle, Completed, Failed, Stopped],
        PlanReady => vec![PlanRequested, Editing, Executing],
        Editing => vec![PlanReady],
        Executing => vec![Completed, Failed, Stopped],
        Completed | Failed | Stopped => vec![PlanRequested, PlanReady],
    }
}

fn allowed(from: ControllerState, to: ControllerState) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}
