use pretty_assertions::assert_eq;
use std::time::Duration;
use tabula_core::{PollingConfig, RequestFailure, ValidationError};
use tabula_report::{
    ControllerState, ExecutionStatus, FailureReason, JsonViewToggle, PollOutcome, ReportError,
    StallKind, StepEdit,
};
use tabula_report::StepStatus::{Completed as Done, Error as Errored, Started};
use tabula_test_utils::{
    dataset_refs, progress, sample_plan, submission, ControllerHarness,
    RecordingConversationStore, ScriptedExecutor, ScriptedPlanner,
};

const PROMPT: &str = "Revenue by region for 2025";
const MODEL: &str = "gpt-4o-mini";

/// Poller effectively disabled so tests drive `poll_once` by hand
fn manual(stall_threshold: u32) -> PollingConfig {
    PollingConfig {
        interval_secs: 3_600,
        initial_delay_secs: 3_600,
        stall_threshold,
    }
}

fn planner() -> ScriptedPlanner {
    ScriptedPlanner::new().respond(Ok(sample_plan(3)))
}

async fn ready(harness: &ControllerHarness) {
    harness
        .controller
        .request_plan(PROMPT, dataset_refs(), MODEL)
        .await
        .unwrap();
}

async fn executing(harness: &ControllerHarness) {
    ready(harness).await;
    harness.controller.execute_plan().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_first_poll_updates_progress() {
    let executor = ScriptedExecutor::new()
        .submit(Ok(submission("r1", 3)))
        .progress(Ok(progress("r1", ExecutionStatus::InProgress, &[Done, Done, Started])));
    let h = ControllerHarness::new(planner(), executor);

    ready(&h).await;
    let report_id = h.controller.execute_plan().await.unwrap();
    assert_eq!(report_id.as_str(), "r1");

    let snapshot = h.controller.snapshot();
    assert_eq!(snapshot.state, ControllerState::Executing);
    assert_eq!(snapshot.progress.unwrap().status, ExecutionStatus::Starting);

    // catch-up poll fires 2s after submission
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(h.executor.poll_calls(), 1);

    let snapshot = h.controller.snapshot();
    assert_eq!(snapshot.state, ControllerState::Executing);
    assert_eq!(snapshot.stall_count, 0);
    assert_eq!(snapshot.progress.unwrap().completed_steps(), 2);

    // then every 5s from submission
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.executor.poll_calls(), 2);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.executor.poll_calls(), 3);

    h.controller.stop_execution().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stall_escalates_after_threshold() {
    let executor = ScriptedExecutor::new()
        .submit(Ok(submission("r1", 3)))
        .progress(Ok(progress("r1", ExecutionStatus::InProgress, &[Done, Done, Done])));
    let h = ControllerHarness::new(planner(), executor);
    executing(&h).await;

    let settled = h.controller.wait_for_settled().await;
    assert_eq!(settled.state, ControllerState::Failed);
    assert_eq!(
        settled.failure,
        Some(FailureReason::StallTimeout(StallKind::NoReportProduced))
    );
    assert_eq!(settled.stall_count, 24);
    assert_eq!(h.executor.poll_calls(), 24);

    // poller is gone: no 25th request
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.executor.poll_calls(), 24);
}

#[tokio::test(start_paused = true)]
async fn test_stall_with_errored_step() {
    let executor = ScriptedExecutor::new()
        .submit(Ok(submission("r1", 2)))
        .progress(Ok(progress("r1", ExecutionStatus::InProgress, &[Done, Errored])));
    let polling = PollingConfig {
        stall_threshold: 3,
        ..PollingConfig::default()
    };
    let h = ControllerHarness::with_config(
        planner(),
        executor,
        RecordingConversationStore::new(),
        polling,
    );
    executing(&h).await;

    let settled = h.controller.wait_for_settled().await;
    assert_eq!(
        settled.failure,
        Some(FailureReason::StallTimeout(StallKind::StepsErrored))
    );
    assert_eq!(h.executor.poll_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_do_not_touch_stall_counter() {
    let stuck = || Ok(progress("r1", ExecutionStatus::InProgress, &[Done]));
    let executor = ScriptedExecutor::new()
        .submit(Ok(submission("r1", 1)))
        .progress(stuck())
        .progress(stuck())
        .progress(Err(RequestFailure::Transport("timeout".into())))
        .progress(Ok(progress("other", ExecutionStatus::InProgress, &[Started])))
        .progress(stuck());
    let h = ControllerHarness::with_config(
        planner(),
        executor,
        RecordingConversationStore::new(),
        manual(3),
    );
    executing(&h).await;

    assert_eq!(h.controller.poll_once().await, PollOutcome::InProgress { stall_count: 1 });
    assert_eq!(h.controller.poll_once().await, PollOutcome::InProgress { stall_count: 2 });
    assert_eq!(h.controller.poll_once().await, PollOutcome::Retrying);
    assert_eq!(h.controller.snapshot().stall_count, 2);
    assert_eq!(h.controller.poll_once().await, PollOutcome::Retrying);
    assert_eq!(h.controller.snapshot().state, ControllerState::Executing);
    assert_eq!(h.controller.poll_once().await, PollOutcome::Failed);
    assert_eq!(h.controller.poll_once().await, PollOutcome::Inactive);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_then_completion() {
    let executor = ScriptedExecutor::new()
        .submit(Ok(submission("r1", 1)))
        .progress(Err(RequestFailure::Status {
            status: 502,
            body: "bad gateway".into(),
        }))
        .progress(Err(RequestFailure::Malformed("no progress status".into())))
        .progress(Ok({
            let mut done = progress("r1", ExecutionStatus::Completed, &[Done]);
            done.final_report = Some("# Revenue".into());
            done
        }));
    let h = ControllerHarness::new(planner(), executor);
    executing(&h).await;

    let settled = h.controller.wait_for_settled().await;
    assert_eq!(settled.state, ControllerState::Completed);
    assert_eq!(settled.final_report.as_deref(), Some("# Revenue"));
    assert_eq!(settled.failure, None);
    assert_eq!(h.executor.poll_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_progress_is_idempotent() {
    let executor = ScriptedExecutor::new()
        .submit(Ok(submission("r1", 3)))
        .progress(Ok(progress("r1", ExecutionStatus::InProgress, &[Done, Started, Started])));
    let h = ControllerHarness::with_config(
        planner(),
        executor,
        RecordingConversationStore::new(),
        manual(24),
    );
    executing(&h).await;

    h.controller.poll_once().await;
    let first = h.controller.snapshot();
    h.controller.poll_once().await;
    assert_eq!(h.controller.snapshot(), first);
}

#[tokio::test(start_paused = true)]
async fn test_stop_discards_in_flight_poller_response() {
    let mut finished = progress("r1", ExecutionStatus::Completed, &[Done, Done, Done]);
    finished.final_report = Some("late".into());
    let executor = ScriptedExecutor::new()
        .submit(Ok(submission("r1", 3)))
        .progress(Ok(finished));
    let h = ControllerHarness::new(planner(), executor);
    let release = h.executor.hold_next_poll();
    executing(&h).await;

    h.executor.wait_for_poll().await;
    h.controller.stop_execution().unwrap();
    assert_eq!(h.controller.state(), ControllerState::Stopped);

    // poller was aborted; the held request has nobody left to answer
    let _ = release.send(());
    tokio::time::sleep(Duration::from_secs(30)).await;

    let snapshot = h.controller.snapshot();
    assert_eq!(snapshot.state, ControllerState::Stopped);
    assert_eq!(snapshot.final_report, None);
    assert_eq!(h.executor.poll_calls(), 1);
    assert!(h.conversations.records().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_discards_in_flight_manual_poll() {
    let executor = ScriptedExecutor::new()
        .submit(Ok(submission("r1", 1)))
        .progress(Ok(progress("r1", ExecutionStatus::Completed, &[Done])));
    let h = ControllerHarness::with_config(
        planner(),
        executor,
        RecordingConversationStore::new(),
        manual(24),
    );
    executing(&h).await;
    let release = h.executor.hold_next_poll();

    let (controller, executor) = (&h.controller, &h.executor);
    let stop = async move {
        executor.wait_for_poll().await;
        controller.stop_execution().unwrap();
        release.send(()).unwrap();
    };
    let (outcome, ()) = tokio::join!(h.controller.poll_once(), stop);

    assert_eq!(outcome, PollOutcome::Inactive);
    assert_eq!(h.controller.state(), ControllerState::Stopped);
    assert_eq!(h.controller.snapshot().final_report, None);
}

#[tokio::test(start_paused = true)]
async fn test_completion_saves_conversation() {
    let mut done = progress("r1", ExecutionStatus::Completed, &[Done, Done, Done]);
    done.final_report = Some("# Revenue by region".into());
    let executor = ScriptedExecutor::new()
        .submit(Ok(submission("r1", 3)))
        .progress(Ok(progress("r1", ExecutionStatus::InProgress, &[Done, Started, Started])))
        .progress(Ok(done));
    let h = ControllerHarness::new(planner(), executor);
    executing(&h).await;

    let settled = h.controller.wait_for_settled().await;
    assert_eq!(settled.state, ControllerState::Completed);
    tokio::time::sleep(Duration::from_millis(10)).await;

    let records = h.conversations.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.email, "ana@example.com");
    assert_eq!(record.prompt, PROMPT);
    assert_eq!(record.model, MODEL);
    assert_eq!(record.response, "# Revenue by region");
    assert_eq!(record.dataset_id, "ds-1,ds-2");
    assert_eq!(record.report_id.as_ref().map(|id| id.as_str()), Some("r1"));
    assert!(record.duration_seconds >= 5.0);
}

#[tokio::test(start_paused = true)]
async fn test_conversation_failure_does_not_fail_report() {
    let executor = ScriptedExecutor::new()
        .submit(Ok(submission("r1", 1)))
        .progress(Ok(progress("r1", ExecutionStatus::Completed, &[Done])));
    let h = ControllerHarness::with_config(
        planner(),
        executor,
        RecordingConversationStore::failing(),
        PollingConfig::default(),
    );
    executing(&h).await;

    let settled = h.controller.wait_for_settled().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(settled.state, ControllerState::Completed);
    assert_eq!(h.controller.state(), ControllerState::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_executor_error_fails_report() {
    let mut failed = progress("r1", ExecutionStatus::Error, &[Done, Errored]);
    failed.error_message = Some("dataset ds-2 unavailable".into());
    let executor = ScriptedExecutor::new()
        .submit(Ok(submission("r1", 2)))
        .submit(Ok(submission("r2", 2)))
        .progress(Ok(failed))
        .progress(Ok(progress("r2", ExecutionStatus::Error, &[])));
    let h = ControllerHarness::with_config(
        planner(),
        executor,
        RecordingConversationStore::new(),
        manual(24),
    );
    executing(&h).await;

    assert_eq!(h.controller.poll_once().await, PollOutcome::Failed);
    assert_eq!(
        h.controller.snapshot().failure,
        Some(FailureReason::Executor("dataset ds-2 unavailable".into()))
    );

    h.controller.reopen_plan().unwrap();
    h.controller.execute_plan().await.unwrap();
    assert_eq!(h.controller.poll_once().await, PollOutcome::Failed);
    assert_eq!(
        h.controller.snapshot().failure.unwrap().message(),
        "Report execution failed"
    );
}

#[tokio::test(start_paused = true)]
async fn test_request_plan_validation_and_failure() {
    let planner = ScriptedPlanner::new()
        .respond(Err(RequestFailure::Status {
            status: 502,
            body: "upstream".into(),
        }))
        .respond(Ok(sample_plan(2)));
    let h = ControllerHarness::new(planner, ScriptedExecutor::new());

    let err = h
        .controller
        .request_plan("   ", dataset_refs(), MODEL)
        .await
        .unwrap_err();
    assert_eq!(err, ReportError::Validation(ValidationError::EmptyPrompt));
    let err = h
        .controller
        .request_plan(PROMPT, Vec::new(), MODEL)
        .await
        .unwrap_err();
    assert_eq!(err, ReportError::Validation(ValidationError::NoDatasetSelected));
    assert!(h.planner.requests().is_empty());

    let err = h
        .controller
        .request_plan(PROMPT, dataset_refs(), MODEL)
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::Request(RequestFailure::Status { status: 502, .. })));
    assert_eq!(h.controller.state(), ControllerState::Idle);

    let plan = h
        .controller
        .request_plan(PROMPT, dataset_refs(), MODEL)
        .await
        .unwrap();
    assert_eq!(plan.total_steps, 2);
    assert_eq!(h.controller.state(), ControllerState::PlanReady);

    let request = &h.planner.requests()[1];
    assert_eq!(request.email, "ana@example.com");
    assert_eq!(request.dataset_ids.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_submission_failure_keeps_plan_ready() {
    let executor = ScriptedExecutor::new().submit(Err(RequestFailure::Transport(
        "connection refused".into(),
    )));
    let h = ControllerHarness::new(planner(), executor);
    ready(&h).await;

    let err = h.controller.execute_plan().await.unwrap_err();
    assert!(matches!(err, ReportError::Request(RequestFailure::Transport(_))));
    assert_eq!(h.controller.state(), ControllerState::PlanReady);

    // edits are possible again once the submission is over
    h.controller
        .edit_step(0, StepEdit::Purpose("Load sales".into()))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.executor.poll_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_plan_is_not_submitted() {
    let h = ControllerHarness::new(planner(), ScriptedExecutor::new());
    ready(&h).await;

    h.controller
        .edit_step(0, StepEdit::Dependencies(vec![3]))
        .unwrap();
    let err = h.controller.execute_plan().await.unwrap_err();
    assert!(matches!(err, ReportError::Validation(ValidationError::InvalidPlan(_))));
    assert!(h.executor.submitted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_json_edit_missing_steps_rejected() {
    let h = ControllerHarness::new(planner(), ScriptedExecutor::new());
    ready(&h).await;
    let original = h.controller.snapshot().plan.unwrap();

    let JsonViewToggle::Opened(text) = h.controller.toggle_json_view().unwrap() else {
        panic!("expected editor to open");
    };
    assert!(text.contains("\"steps\""));
    assert_eq!(h.controller.state(), ControllerState::Editing);
    assert!(h.controller.edit_step(0, StepEdit::Purpose("x".into())).is_err());

    h.controller.set_json_text(r#"{"planId":"p2"}"#).unwrap();
    let err = h.controller.toggle_json_view().unwrap_err();
    assert_eq!(
        err,
        ReportError::Validation(ValidationError::plan_json("steps", "is required"))
    );
    assert_eq!(h.controller.state(), ControllerState::Editing);
    assert_eq!(h.controller.snapshot().plan.unwrap(), original);

    h.controller
        .set_json_text(r#"{"planId":"p2","steps":[{"stepNumber":1,"datasetId":"ds-9"}]}"#)
        .unwrap();
    let JsonViewToggle::Closed(plan) = h.controller.toggle_json_view().unwrap() else {
        panic!("expected editor to close");
    };
    assert_eq!(plan.total_steps, 1);
    let snapshot = h.controller.snapshot();
    assert_eq!(snapshot.state, ControllerState::PlanReady);
    assert_eq!(snapshot.json_text, None);
    assert_eq!(snapshot.plan.unwrap().plan_id, "p2");
}

#[tokio::test(start_paused = true)]
async fn test_discard_json_edits_keeps_plan() {
    let h = ControllerHarness::new(planner(), ScriptedExecutor::new());
    ready(&h).await;
    let original = h.controller.snapshot().plan;

    h.controller.toggle_json_view().unwrap();
    h.controller.set_json_text("not json").unwrap();
    h.controller.discard_json_edits().unwrap();

    assert_eq!(h.controller.state(), ControllerState::PlanReady);
    assert_eq!(h.controller.snapshot().plan, original);
}

#[tokio::test(start_paused = true)]
async fn test_edits_rejected_while_executing() {
    let executor = ScriptedExecutor::new()
        .submit(Ok(submission("r1", 3)))
        .progress(Ok(progress("r1", ExecutionStatus::InProgress, &[Started])));
    let h = ControllerHarness::with_config(
        planner(),
        executor,
        RecordingConversationStore::new(),
        manual(24),
    );
    executing(&h).await;

    let err = h
        .controller
        .edit_step(0, StepEdit::Purpose("changed".into()))
        .unwrap_err();
    assert!(matches!(
        err,
        ReportError::NotAllowed {
            state: ControllerState::Executing,
            ..
        }
    ));
    assert!(h
        .controller
        .request_plan(PROMPT, dataset_refs(), MODEL)
        .await
        .is_err());
    assert!(h.controller.reopen_plan().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_reopen_and_rerun_uses_new_execution() {
    let executor = ScriptedExecutor::new()
        .submit(Ok(submission("r1", 3)))
        .submit(Ok(submission("r2", 3)))
        .progress(Ok(progress("r2", ExecutionStatus::InProgress, &[Started])));
    let h = ControllerHarness::with_config(
        planner(),
        executor,
        RecordingConversationStore::new(),
        manual(24),
    );
    executing(&h).await;
    h.controller.stop_execution().unwrap();

    h.controller.reopen_plan().unwrap();
    let snapshot = h.controller.snapshot();
    assert_eq!(snapshot.state, ControllerState::PlanReady);
    assert_eq!(snapshot.progress, None);
    assert_eq!(snapshot.report_id, None);

    h.controller.remove_step(2).unwrap();
    let report_id = h.controller.execute_plan().await.unwrap();
    assert_eq!(report_id.as_str(), "r2");
    assert_eq!(h.executor.submitted()[1].total_steps, 2);
    assert_eq!(
        h.controller.poll_once().await,
        PollOutcome::InProgress { stall_count: 0 }
    );
}

#[tokio::test(start_paused = true)]
async fn test_subscribers_see_transitions() {
    let h = ControllerHarness::new(planner(), ScriptedExecutor::new());
    let mut updates = h.controller.subscribe();
    assert_eq!(updates.borrow_and_update().state, ControllerState::Idle);

    ready(&h).await;
    assert!(updates.has_changed().unwrap());
    assert_eq!(updates.borrow_and_update().state, ControllerState::PlanReady);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_polling() {
    let executor = ScriptedExecutor::new()
        .submit(Ok(submission("r1", 3)))
        .progress(Ok(progress("r1", ExecutionStatus::InProgress, &[Started])));
    let h = ControllerHarness::new(planner(), executor);
    executing(&h).await;

    h.controller.shutdown();
    assert_eq!(h.controller.state(), ControllerState::Stopped);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.executor.poll_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_drop_aborts_poller() {
    let executor = ScriptedExecutor::new()
        .submit(Ok(submission("r1", 3)))
        .progress(Ok(progress("r1", ExecutionStatus::InProgress, &[Started])));
    let ControllerHarness {
        controller,
        executor,
        planner: _planner,
        conversations: _conversations,
    } = ControllerHarness::new(planner(), executor);

    controller
        .request_plan(PROMPT, dataset_refs(), MODEL)
        .await
        .unwrap();
    controller.execute_plan().await.unwrap();
    drop(controller);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(executor.poll_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_plan_request_restores_state() {
    let planner = ScriptedPlanner::new()
        .hang()
        .respond(Ok(sample_plan(3)))
        .hang()
        .respond(Ok(sample_plan(2)));
    let h = ControllerHarness::new(planner, ScriptedExecutor::new());

    let abandoned = tokio::time::timeout(
        Duration::from_secs(30),
        h.controller.request_plan(PROMPT, dataset_refs(), MODEL),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(h.controller.state(), ControllerState::Idle);

    ready(&h).await;
    assert_eq!(h.controller.snapshot().plan.unwrap().len(), 3);

    // a dropped re-plan returns to the plan that was already there
    let abandoned = tokio::time::timeout(
        Duration::from_secs(30),
        h.controller.request_plan(PROMPT, dataset_refs(), MODEL),
    )
    .await;
    assert!(abandoned.is_err());
    let snapshot = h.controller.snapshot();
    assert_eq!(snapshot.state, ControllerState::PlanReady);
    assert_eq!(snapshot.plan.unwrap().len(), 3);

    let plan = h
        .controller
        .request_plan(PROMPT, dataset_refs(), MODEL)
        .await
        .unwrap();
    assert_eq!(plan.len(), 2);
    assert_eq!(h.planner.requests().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_submission_keeps_plan_editable() {
    let executor = ScriptedExecutor::new()
        .hang_submission()
        .submit(Ok(submission("r2", 3)));
    let h = ControllerHarness::with_config(
        planner(),
        executor,
        RecordingConversationStore::new(),
        manual(24),
    );
    ready(&h).await;

    let abandoned = tokio::time::timeout(Duration::from_secs(30), h.controller.execute_plan()).await;
    assert!(abandoned.is_err());
    assert_eq!(h.controller.state(), ControllerState::PlanReady);
    h.controller
        .edit_step(0, StepEdit::Purpose("Load sales".into()))
        .unwrap();

    let report_id = h.controller.execute_plan().await.unwrap();
    assert_eq!(report_id.as_str(), "r2");
    assert_eq!(h.executor.submitted().len(), 2);
    assert_eq!(h.executor.submitted()[1].steps[0].purpose, "Load sales");

    h.controller.stop_execution().unwrap();
}
