//! External collaborator contracts
//!
//! The controller only talks to the outside world through these traits;
//! `tabula-gateway` implements them over HTTP.

use crate::plan::ReportPlan;
use crate::progress::{ExecutionProgress, Submission};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tabula_core::{DatasetId, ReportId, RequestFailure};

/// Input to plan generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub prompt: String,
    pub dataset_ids: Vec<DatasetId>,
    pub model: String,
    pub email: String,
}

/// Generates report plans from a prompt
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan_report(&self, request: &PlanRequest) -> Result<ReportPlan, RequestFailure>;
}

/// Runs plans asynchronously and reports progress
#[async_trait]
pub trait ReportExecutor: Send + Sync {
    /// Submit a plan; returns once the executor accepted it
    async fn execute_plan(
        &self,
        plan: &ReportPlan,
        email: &str,
        model: &str,
    ) -> Result<Submission, RequestFailure>;

    /// Current progress of a submitted report
    async fn check_progress(&self, report_id: &ReportId) -> Result<ExecutionProgress, RequestFailure>;
}

/// Conversation history entry written when a report completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub email: String,
    pub prompt: String,
    pub response: String,
    pub model: String,
    pub dataset_id: String,
    pub dataset_name: String,
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_plan: Option<ReportPlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<ReportId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedConversation {
    #[serde(default)]
    pub id: String,
}

/// Persists conversation history
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn save_conversation(
        &self,
        record: &ConversationRecord,
    ) -> Result<SavedConversation, RequestFailure>;
}
