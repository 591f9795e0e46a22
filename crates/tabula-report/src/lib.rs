//! Tabula Report - plan editing and asynchronous report execution
//!
//! Drives a multi-step report from prompt to final document:
//! - [`ReportPlan`] and its edit helpers (`edit_step`, `edit_filter`, ...)
//! - Raw JSON plan editing via [`parse_plan_json`]
//! - [`ReportController`]: request, edit, submit, poll, stop
//! - [`StallDetector`] for executions whose steps finish but the report never does
//! - [`normalize`] for loosely shaped workflow responses
//!
//! # Example
//!
//! ```rust,ignore
//! use tabula_report::{ControllerDeps, ReportController};
//!
//! let controller = ReportController::new(deps, "ana@example.com", config.polling);
//! controller.request_plan("Revenue by region", datasets, "gpt-4o-mini").await?;
//! controller.execute_plan().await?;
//! let done = controller.wait_for_settled().await;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod collaborators;
pub mod controller;
pub mod edit;
pub mod error;
pub mod json_view;
pub mod normalize;
pub mod plan;
pub mod progress;
pub mod stall;
pub mod state_machine;

pub use collaborators::{
    ConversationRecord, ConversationStore, PlanRequest, Planner, ReportExecutor,
    SavedConversation,
};
pub use controller::{
    ControllerDeps, ControllerSnapshot, ExecutionToken, JsonViewToggle, PollOutcome,
    ReportController,
};
pub use edit::{QueryFieldEdit, StepEdit};
pub use error::{FailureReason, ReportError};
pub use json_view::{parse_plan_json, render_plan_json};
pub use plan::{FilterValue, QueryStrategy, ReportPlan, ReportPlanStep};
pub use progress::{ExecutionProgress, ExecutionStatus, StepProgress, StepStatus, Submission};
pub use stall::{StallDetector, StallKind, StallVerdict};
pub use state_machine::{allowed_transitions, validate_transition, ControllerState, TransitionError};
