use crate::scripted::{RecordingConversationStore, ScriptedExecutor, ScriptedPlanner};
use std::sync::Arc;
use tabula_core::{DatasetRef, PollingConfig, ReportId};
use tabula_report::{
    ControllerDeps, ExecutionProgress, ExecutionStatus, ReportController, ReportPlan,
    ReportPlanStep, StepProgress, StepStatus, Submission,
};

/// Linear plan of `steps` steps, each depending on the previous one
pub fn sample_plan(steps: u32) -> ReportPlan {
    let steps = (1..=steps)
        .map(|n| {
            let step = ReportPlanStep::new(n, format!("ds-{n}"), format!("Step {n}"));
            if n > 1 {
                step.with_dependencies(vec![n - 1])
            } else {
                step
            }
        })
        .collect();
    ReportPlan::new("plan-1", steps)
}

pub fn dataset_refs() -> Vec<DatasetRef> {
    vec![
        DatasetRef::new("ds-1", "Sales 2025"),
        DatasetRef::new("ds-2", "Headcount"),
    ]
}

pub fn submission(report_id: &str, total_steps: usize) -> Submission {
    Submission {
        report_id: ReportId::new(report_id),
        total_steps,
    }
}

/// Progress with one step per entry in `steps`
pub fn progress(report_id: &str, status: ExecutionStatus, steps: &[StepStatus]) -> ExecutionProgress {
    let mut progress = ExecutionProgress::starting(ReportId::new(report_id));
    progress.status = status;
    progress.steps = (1u32..)
        .zip(steps)
        .map(|(n, status)| StepProgress::new(n, *status))
        .collect();
    progress
}

/// Controller wired to scripted collaborators
pub struct ControllerHarness {
    pub controller: ReportController,
    pub planner: Arc<ScriptedPlanner>,
    pub executor: Arc<ScriptedExecutor>,
    pub conversations: Arc<RecordingConversationStore>,
}

impl ControllerHarness {
    pub fn new(planner: ScriptedPlanner, executor: ScriptedExecutor) -> Self {
        Self::with_config(
            planner,
            executor,
            RecordingConversationStore::new(),
            PollingConfig::default(),
        )
    }

    pub fn with_config(
        planner: ScriptedPlanner,
        executor: ScriptedExecutor,
        conversations: RecordingConversationStore,
        polling: PollingConfig,
    ) -> Self {
        let planner = Arc::new(planner);
        let executor = Arc::new(executor);
        let conversations = Arc::new(conversations);
        let deps = ControllerDeps {
            planner: planner.clone(),
            executor: executor.clone(),
            conversations: conversations.clone(),
        };
        Self {
            controller: ReportController::new(deps, "ana@example.com", polling),
            planner,
            executor,
            conversations,
        }
    }
}
