//! Execution progress as reported by the executor

use serde::{Deserialize, Serialize};
use tabula_core::ReportId;

/// Overall execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Starting,
    #[serde(alias = "complete", alias = "done")]
    Completed,
    #[serde(alias = "failed")]
    Error,
    /// Also any status the executor reports that is not listed here
    #[serde(alias = "running", alias = "processing", other)]
    InProgress,
}

impl ExecutionStatus {
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Per-step status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[serde(alias = "running", alias = "in_progress")]
    Started,
    #[serde(alias = "complete", alias = "done")]
    Completed,
    #[serde(alias = "failed")]
    Error,
}

impl StepStatus {
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepProgress {
    pub step_number: u32,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub dataset_id: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_result: Option<String>,
}

impl StepProgress {
    pub fn new(step_number: u32, status: StepStatus) -> Self {
        Self {
            step_number,
            purpose: String::new(),
            dataset_id: String::new(),
            status,
            step_result: None,
        }
    }
}

/// Snapshot of a running report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionProgress {
    pub report_id: ReportId,
    #[serde(default)]
    pub steps: Vec<StepProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_report: Option<String>,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ExecutionProgress {
    /// Placeholder progress right after submission
    pub fn starting(report_id: ReportId) -> Self {
        Self {
            report_id,
            steps: Vec::new(),
            final_report: None,
            status: ExecutionStatus::Starting,
            error_message: None,
        }
    }

    /// At least one step, and every step is completed or errored
    #[must_use]
    pub fn all_steps_terminal(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.status.is_terminal())
    }

    #[must_use]
    pub fn any_step_errored(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Error)
    }

    #[must_use]
    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }
}

/// Executor's acknowledgement of a submitted plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    #[serde(alias = "report_id")]
    pub report_id: ReportId,
    #[serde(default, alias = "total_steps")]
    pub total_steps: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_wire_progress() {
        let progress: ExecutionProgress = serde_json::from_str(
            r#"{"reportId":"r1","status":"in_progress","steps":[
                {"stepNumber":1,"status":"completed","stepResult":"ok"},
                {"stepNumber":2,"status":"started"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(progress.status, ExecutionStatus::InProgress);
        assert_eq!(progress.completed_steps(), 1);
        assert!(!progress.all_steps_terminal());
    }

    #[test]
    fn status_aliases() {
        let status: ExecutionStatus = serde_json::from_str(r#""failed""#).unwrap();
        assert_eq!(status, ExecutionStatus::Error);
        let step: StepStatus = serde_json::from_str(r#""running""#).unwrap();
        assert_eq!(step, StepStatus::Started);
    }

    #[test]
    fn unlisted_status_is_in_progress() {
        let status: ExecutionStatus = serde_json::from_str(r#""queued""#).unwrap();
        assert_eq!(status, ExecutionStatus::InProgress);
        assert_eq!(serde_json::to_string(&status).unwrap(), r#""in_progress""#);
    }

    #[test]
    fn no_steps_is_not_all_terminal() {
        let progress = ExecutionProgress::starting(ReportId::new("r1"));
        assert!(!progress.all_steps_terminal());
        assert!(!progress.status.is_terminal());
    }

    #[test]
    fn errored_step_detected() {
        let mut progress = ExecutionProgress::starting(ReportId::new("r1"));
        progress.steps = vec![
            StepProgress::new(1, StepStatus::Completed),
            StepProgress::new(2, StepStatus::Error),
        ];
        assert!(progress.all_steps_terminal());
        assert!(progress.any_step_errored());
    }

    #[test]
    fn submission_accepts_snake_case() {
        let submission: Submission =
            serde_json::from_str(r#"{"report_id":"r9","total_steps":2}"#).unwrap();
        assert_eq!(submission.report_id, ReportId::new("r9"));
        assert_eq!(submission.total_steps, 2);
    }
}
