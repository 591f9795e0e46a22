//! Report Execution Controller
//!
//! Drives one report through plan generation, editing, submission and
//! progress polling. State lives behind a synchronous lock that is never
//! held across an await; every change is published on a watch channel.
//!
//! The only background work is the poller task of the active execution.
//! Each execution is identified by an [`ExecutionToken`]; poll results are
//! applied only while their token is still the active one, so responses
//! that arrive after a stop or a restart are dropped.

use crate::collaborators::{
    ConversationRecord, ConversationStore, PlanRequest, Planner, ReportExecutor,
};
use crate::edit::{QueryFieldEdit, StepEdit};
use crate::error::{FailureReason, ReportError};
use crate::json_view::{parse_plan_json, render_plan_json};
use crate::plan::{FilterValue, ReportPlan};
use crate::progress::{ExecutionProgress, ExecutionStatus};
use crate::stall::{StallDetector, StallVerdict};
use crate::state_machine::{validate_transition, ControllerState, TransitionError};
use parking_lot::Mutex;
use std::sync::Arc;
use tabula_core::{DatasetRef, PollingConfig, ReportId, RequestFailure, ValidationError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const GENERIC_FAILURE: &str = "Report execution failed";

/// Identity of one execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionToken {
    generation: u64,
    report_id: ReportId,
}

impl ExecutionToken {
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    #[must_use]
    pub fn report_id(&self) -> &ReportId {
        &self.report_id
    }
}

/// Published view of the controller
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSnapshot {
    pub state: ControllerState,
    pub plan: Option<ReportPlan>,
    /// Editor buffer while in `Editing`
    pub json_text: Option<String>,
    pub report_id: Option<ReportId>,
    pub progress: Option<ExecutionProgress>,
    pub final_report: Option<String>,
    pub failure: Option<FailureReason>,
    pub stall_count: u32,
}

/// Result of one poll attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No execution is active, or the response was stale
    Inactive,
    /// Fetch failed or answered for another report; polling continues
    Retrying,
    InProgress { stall_count: u32 },
    Completed,
    Failed,
}

impl PollOutcome {
    /// Polling for this execution is over
    #[inline]
    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Inactive | Self::Completed | Self::Failed)
    }
}

/// Outcome of [`ReportController::toggle_json_view`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonViewToggle {
    /// Editor opened with this text
    Opened(String),
    /// Buffer accepted as the new plan
    Closed(ReportPlan),
}

/// Collaborators the controller drives
#[derive(Clone)]
pub struct ControllerDeps {
    pub planner: Arc<dyn Planner>,
    pub executor: Arc<dyn ReportExecutor>,
    pub conversations: Arc<dyn ConversationStore>,
}

/// What the user asked for, kept for the conversation record
#[derive(Debug, Clone)]
struct ReportRequest {
    prompt: String,
    datasets: Vec<DatasetRef>,
    model: String,
}

struct ActiveExecution {
    token: ExecutionToken,
    stall: StallDetector,
    started_at: Instant,
    cancel: CancellationToken,
    poller: Option<JoinHandle<()>>,
}

impl ActiveExecution {
    fn release(self) {
        self.cancel.cancel();
        if let Some(handle) = self.poller {
            handle.abort();
        }
    }
}

struct Inner {
    state: ControllerState,
    plan: Option<ReportPlan>,
    json_text: Option<String>,
    request: Option<ReportRequest>,
    report_id: Option<ReportId>,
    progress: Option<ExecutionProgress>,
    final_report: Option<String>,
    failure: Option<FailureReason>,
    stall_count: u32,
    active: Option<ActiveExecution>,
    generation: u64,
    submitting: bool,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: ControllerState::Idle,
            plan: None,
            json_text: None,
            request: None,
            report_id: None,
            progress: None,
            final_report: None,
            failure: None,
            stall_count: 0,
            active: None,
            generation: 0,
            submitting: false,
        }
    }

    fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            state: self.state,
            plan: self.plan.clone(),
            json_text: self.json_text.clone(),
            report_id: self.report_id.clone(),
            progress: self.progress.clone(),
            final_report: self.final_report.clone(),
            failure: self.failure.clone(),
            stall_count: self.stall_count,
        }
    }

    fn transition(&mut self, to: ControllerState) -> Result<ControllerState, TransitionError> {
        validate_transition(self.state, to)?;
        let from = std::mem::replace(&mut self.state, to);
        tracing::debug!(%from, %to, "controller transition");
        Ok(from)
    }

    fn require(&self, operation: &'static str, states: &[ControllerState]) -> Result<(), ReportError> {
        if self.submitting || !states.contains(&self.state) {
            return Err(ReportError::NotAllowed {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn editable_plan(&mut self, operation: &'static str) -> Result<&mut ReportPlan, ReportError> {
        self.require(operation, &[ControllerState::PlanReady])?;
        self.plan.as_mut().ok_or(ReportError::NoPlan)
    }

    fn clear_execution(&mut self) {
        self.report_id = None;
        self.progress = None;
        self.final_report = None;
        self.failure = None;
        self.stall_count = 0;
    }

    fn release_active(&mut self) {
        if let Some(active) = self.active.take() {
            tracing::debug!(
                report_id = %active.token.report_id,
                generation = active.token.generation,
                "poller released"
            );
            active.release();
        }
    }

    fn is_active(&self, token: &ExecutionToken) -> bool {
        self.active.as_ref().is_some_and(|a| a.token == *token)
    }

    /// Move to a terminal state and drop the poller
    fn finish(&mut self, to: ControllerState) -> Result<Option<Instant>, TransitionError> {
        self.transition(to)?;
        let started_at = self.active.as_ref().map(|a| a.started_at);
        self.release_active();
        Ok(started_at)
    }

    fn apply_poll(
        &mut self,
        token: &ExecutionToken,
        fetched: Result<ExecutionProgress, RequestFailure>,
    ) -> (PollOutcome, Option<ConversationRecord>) {
        if !self.is_active(token) {
            tracing::debug!(report_id = %token.report_id, "discarding stale poll response");
            return (PollOutcome::Inactive, None);
        }

        let progress = match fetched {
            Ok(progress) => progress,
            Err(failure) => {
                tracing::debug!(report_id = %token.report_id, %failure, "poll failed, will retry");
                return (PollOutcome::Retrying, None);
            }
        };
        if progress.report_id != token.report_id {
            tracing::warn!(
                expected = %token.report_id,
                received = %progress.report_id,
                "progress for another report ignored"
            );
            return (PollOutcome::Retrying, None);
        }

        match progress.status {
            ExecutionStatus::Completed => {
                self.final_report = progress.final_report.clone();
                self.progress = Some(progress);
                return match self.finish(ControllerState::Completed) {
                    Ok(started_at) => {
                        tracing::info!(report_id = %token.report_id, "report completed");
                        (PollOutcome::Completed, self.conversation_record(started_at))
                    }
                    Err(err) => {
                        tracing::error!(%err, "completion rejected");
                        (PollOutcome::Inactive, None)
                    }
                };
            }
            ExecutionStatus::Error => {
                let message = progress
                    .error_message
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| GENERIC_FAILURE.to_string());
                self.progress = Some(progress);
                return self.fail(token, FailureReason::Executor(message));
            }
            ExecutionStatus::Starting | ExecutionStatus::InProgress => {}
        }

        let Some(active) = self.active.as_mut() else {
            return (PollOutcome::Inactive, None);
        };
        let verdict = active.stall.observe(&progress);
        self.stall_count = active.stall.consecutive();
        self.progress = Some(progress);

        match verdict {
            StallVerdict::TimedOut(kind) => self.fail(token, FailureReason::StallTimeout(kind)),
            StallVerdict::Stalled { consecutive } => {
                tracing::debug!(
                    report_id = %token.report_id,
                    stall_count = consecutive,
                    "all steps terminal, report pending"
                );
                (PollOutcome::InProgress { stall_count: consecutive }, None)
            }
            StallVerdict::Progressing => (PollOutcome::InProgress { stall_count: 0 }, None),
        }
    }

    fn fail(
        &mut self,
        token: &ExecutionToken,
        reason: FailureReason,
    ) -> (PollOutcome, Option<ConversationRecord>) {
        tracing::warn!(report_id = %token.report_id, reason = %reason, "report failed");
        self.failure = Some(reason);
        match self.finish(ControllerState::Failed) {
            Ok(_) => (PollOutcome::Failed, None),
            Err(err) => {
                tracing::error!(%err, "failure rejected");
                (PollOutcome::Inactive, None)
            }
        }
    }

    fn conversation_record(&self, started_at: Option<Instant>) -> Option<ConversationRecord> {
        let request = self.request.as_ref()?;
        let duration = started_at.map_or(0.0, |s| s.elapsed().as_secs_f64());
        let ids: Vec<&str> = request.datasets.iter().map(|d| d.id.as_str()).collect();
        let names: Vec<&str> = request.datasets.iter().map(|d| d.name.as_str()).collect();
        Some(ConversationRecord {
            email: String::new(),
            prompt: request.prompt.clone(),
            response: self.final_report.clone().unwrap_or_default(),
            model: request.model.clone(),
            dataset_id: ids.join(","),
            dataset_name: names.join(","),
            duration_seconds: duration,
            report_plan: self.plan.clone(),
            report_id: self.report_id.clone(),
        })
    }
}

struct Shared {
    inner: Mutex<Inner>,
    updates: watch::Sender<ControllerSnapshot>,
    poll_gate: tokio::sync::Mutex<()>,
    executor: Arc<dyn ReportExecutor>,
    conversations: Arc<dyn ConversationStore>,
    email: String,
    polling: PollingConfig,
}

impl Shared {
    /// Run `f` under the state lock and publish the resulting snapshot
    fn update<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut inner = self.inner.lock();
        let result = f(&mut inner);
        self.updates.send_replace(inner.snapshot());
        result
    }

    fn active_token(&self) -> Option<ExecutionToken> {
        self.inner.lock().active.as_ref().map(|a| a.token.clone())
    }

    async fn poll(&self, token: &ExecutionToken) -> PollOutcome {
        let _serial = self.poll_gate.lock().await;
        let active = self.inner.lock().is_active(token);
        if !active {
            return PollOutcome::Inactive;
        }

        let fetched = self.executor.check_progress(&token.report_id).await;
        let (outcome, record) = self.update(|inner| inner.apply_poll(token, fetched));
        if let Some(mut record) = record {
            record.email.clone_from(&self.email);
            self.save_conversation(record);
        }
        outcome
    }

    fn save_conversation(&self, record: ConversationRecord) {
        let store = Arc::clone(&self.conversations);
        tokio::spawn(async move {
            match store.save_conversation(&record).await {
                Ok(saved) => tracing::debug!(id = %saved.id, "conversation saved"),
                Err(failure) => tracing::warn!(%failure, "failed to save conversation"),
            }
        });
    }
}

/// Undo left behind by a collaborator call that may never finish
#[derive(Debug, Clone, Copy)]
enum Revert {
    /// Leave `PlanRequested` for the state the request started from
    Plan(ControllerState),
    /// Clear the in-flight submission flag
    Submit,
}

/// Applies its [`Revert`] when dropped while armed, so a caller that drops
/// `request_plan` or `execute_plan` mid-await leaves the controller usable
struct PendingCall<'a> {
    shared: &'a Shared,
    revert: Option<Revert>,
}

impl<'a> PendingCall<'a> {
    fn arm(shared: &'a Shared, revert: Revert) -> Self {
        Self {
            shared,
            revert: Some(revert),
        }
    }

    fn disarm(mut self) {
        self.revert = None;
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        let Some(revert) = self.revert.take() else {
            return;
        };
        self.shared.update(|inner| match revert {
            Revert::Plan(prior) => {
                if inner.state != ControllerState::PlanRequested {
                    return;
                }
                if let Err(err) = inner.transition(prior) {
                    tracing::error!(%err, "could not restore state after plan request");
                }
            }
            Revert::Submit => inner.submitting = false,
        });
    }
}

async fn run_poller(shared: Arc<Shared>, token: ExecutionToken, cancel: CancellationToken, started_at: Instant) {
    let polling = shared.polling;

    tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        () = tokio::time::sleep_until(started_at + polling.initial_delay()) => {}
    }
    if shared.poll(&token).await.is_finished() {
        return;
    }

    let period = polling.interval();
    let mut ticker = tokio::time::interval_at(started_at + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        if shared.poll(&token).await.is_finished() {
            return;
        }
    }
}

/// Client-side report execution controller
pub struct ReportController {
    shared: Arc<Shared>,
    planner: Arc<dyn Planner>,
    op_gate: tokio::sync::Mutex<()>,
}

impl ReportController {
    /// Create a controller acting on behalf of `email`
    pub fn new(deps: ControllerDeps, email: impl Into<String>, polling: PollingConfig) -> Self {
        let inner = Inner::new();
        let (updates, _) = watch::channel(inner.snapshot());
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(inner),
                updates,
                poll_gate: tokio::sync::Mutex::new(()),
                executor: deps.executor,
                conversations: deps.conversations,
                email: email.into(),
                polling,
            }),
            planner: deps.planner,
            op_gate: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> ControllerSnapshot {
        self.shared.updates.borrow().clone()
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.shared.inner.lock().state
    }

    /// Receiver notified on every state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ControllerSnapshot> {
        self.shared.updates.subscribe()
    }

    /// Wait until no plan request or execution is in flight
    pub async fn wait_for_settled(&self) -> ControllerSnapshot {
        let mut updates = self.subscribe();
        let settled = updates
            .wait_for(|s| s.state.is_settled())
            .await
            .map(|snapshot| snapshot.clone());
        match settled {
            Ok(snapshot) => snapshot,
            Err(_) => self.snapshot(),
        }
    }

    /// Ask the planner for a plan over `datasets`
    pub async fn request_plan(
        &self,
        prompt: &str,
        datasets: Vec<DatasetRef>,
        model: &str,
    ) -> Result<ReportPlan, ReportError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ValidationError::EmptyPrompt.into());
        }
        if datasets.is_empty() {
            return Err(ValidationError::NoDatasetSelected.into());
        }

        let _gate = self.op_gate.try_lock().map_err(|_| ReportError::Busy)?;
        let prior = self.shared.update(|inner| {
            inner.require(
                "request_plan",
                &[
                    ControllerState::Idle,
                    ControllerState::PlanReady,
                    ControllerState::Completed,
                    ControllerState::Failed,
                    ControllerState::Stopped,
                ],
            )?;
            Ok::<_, ReportError>(inner.transition(ControllerState::PlanRequested)?)
        })?;

        let request = PlanRequest {
            prompt: prompt.to_string(),
            dataset_ids: datasets.iter().map(|d| d.id.clone()).collect(),
            model: model.to_string(),
            email: self.shared.email.clone(),
        };
        tracing::info!(datasets = request.dataset_ids.len(), model, "requesting report plan");

        let pending = PendingCall::arm(&self.shared, Revert::Plan(prior));
        let planned = self.planner.plan_report(&request).await;
        match planned {
            Ok(plan) => {
                pending.disarm();
                self.shared.update(|inner| {
                    inner.transition(ControllerState::PlanReady)?;
                    inner.clear_execution();
                    inner.plan = Some(plan.clone());
                    inner.request = Some(ReportRequest {
                        prompt: request.prompt,
                        datasets,
                        model: request.model,
                    });
                    tracing::info!(plan_id = %plan.plan_id, steps = plan.len(), "report plan ready");
                    Ok(plan)
                })
            }
            Err(failure) => {
                tracing::warn!(%failure, "plan request failed");
                drop(pending);
                Err(failure.into())
            }
        }
    }

    pub fn edit_step(&self, index: usize, edit: StepEdit) -> Result<(), ReportError> {
        self.shared.update(|inner| {
            inner.editable_plan("edit_step")?.edit_step(index, edit)?;
            Ok(())
        })
    }

    pub fn edit_filter(
        &self,
        index: usize,
        key: &str,
        value: Option<FilterValue>,
    ) -> Result<(), ReportError> {
        self.shared.update(|inner| {
            inner.editable_plan("edit_filter")?.edit_filter(index, key, value)?;
            Ok(())
        })
    }

    pub fn edit_query_field(&self, index: usize, edit: QueryFieldEdit) -> Result<(), ReportError> {
        self.shared.update(|inner| {
            inner.editable_plan("edit_query_field")?.edit_query_field(index, edit)?;
            Ok(())
        })
    }

    pub fn remove_step(&self, index: usize) -> Result<(), ReportError> {
        self.shared.update(|inner| {
            inner.editable_plan("remove_step")?.remove_step(index)?;
            Ok(())
        })
    }

    /// Open the JSON editor, or accept its buffer and close it
    pub fn toggle_json_view(&self) -> Result<JsonViewToggle, ReportError> {
        self.shared.update(|inner| {
            inner.require(
                "toggle_json_view",
                &[ControllerState::PlanReady, ControllerState::Editing],
            )?;

            if inner.state == ControllerState::PlanReady {
                let plan = inner.plan.as_ref().ok_or(ReportError::NoPlan)?;
                let text = render_plan_json(plan)?;
                inner.transition(ControllerState::Editing)?;
                inner.json_text = Some(text.clone());
                return Ok(JsonViewToggle::Opened(text));
            }

            let text = inner.json_text.as_deref().unwrap_or_default();
            let plan = parse_plan_json(text)?;
            inner.transition(ControllerState::PlanReady)?;
            inner.plan = Some(plan.clone());
            inner.json_text = None;
            Ok(JsonViewToggle::Closed(plan))
        })
    }

    /// Replace the JSON editor buffer
    pub fn set_json_text(&self, text: impl Into<String>) -> Result<(), ReportError> {
        self.shared.update(|inner| {
            inner.require("set_json_text", &[ControllerState::Editing])?;
            inner.json_text = Some(text.into());
            Ok(())
        })
    }

    /// Leave the JSON editor without applying the buffer
    pub fn discard_json_edits(&self) -> Result<(), ReportError> {
        self.shared.update(|inner| {
            inner.require("discard_json_edits", &[ControllerState::Editing])?;
            inner.transition(ControllerState::PlanReady)?;
            inner.json_text = None;
            Ok(())
        })
    }

    /// Validate and submit the current plan, then start polling
    pub async fn execute_plan(&self) -> Result<ReportId, ReportError> {
        let _gate = self.op_gate.try_lock().map_err(|_| ReportError::Busy)?;
        let (plan, model) = self.shared.update(|inner| {
            inner.require("execute_plan", &[ControllerState::PlanReady])?;
            let plan = inner.plan.clone().ok_or(ReportError::NoPlan)?;
            plan.validate()?;
            inner.release_active();
            inner.submitting = true;
            let model = inner
                .request
                .as_ref()
                .map(|r| r.model.clone())
                .unwrap_or_default();
            Ok::<_, ReportError>((plan, model))
        })?;

        tracing::info!(plan_id = %plan.plan_id, steps = plan.len(), "submitting report plan");
        let pending = PendingCall::arm(&self.shared, Revert::Submit);
        let submitted = self
            .shared
            .executor
            .execute_plan(&plan, &self.shared.email, &model)
            .await;

        let submission = match submitted {
            Ok(submission) => submission,
            Err(failure) => {
                tracing::warn!(%failure, "report submission failed");
                drop(pending);
                return Err(failure.into());
            }
        };
        pending.disarm();

        let shared = Arc::clone(&self.shared);
        let stall_threshold = self.shared.polling.stall_threshold;
        self.shared.update(move |inner| {
            inner.submitting = false;
            inner.transition(ControllerState::Executing)?;
            inner.clear_execution();
            inner.generation += 1;

            let token = ExecutionToken {
                generation: inner.generation,
                report_id: submission.report_id.clone(),
            };
            let started_at = Instant::now();
            let cancel = CancellationToken::new();
            let poller = tokio::spawn(run_poller(
                shared,
                token.clone(),
                cancel.clone(),
                started_at,
            ));

            inner.report_id = Some(submission.report_id.clone());
            inner.progress = Some(ExecutionProgress::starting(submission.report_id.clone()));
            inner.active = Some(ActiveExecution {
                token,
                stall: StallDetector::new(stall_threshold),
                started_at,
                cancel,
                poller: Some(poller),
            });
            tracing::info!(
                report_id = %submission.report_id,
                total_steps = submission.total_steps,
                generation = inner.generation,
                "report executing"
            );
            Ok(submission.report_id)
        })
    }

    /// Poll the active execution once
    pub async fn poll_once(&self) -> PollOutcome {
        match self.shared.active_token() {
            Some(token) => self.shared.poll(&token).await,
            None => PollOutcome::Inactive,
        }
    }

    /// Stop the active execution without waiting for in-flight calls
    pub fn stop_execution(&self) -> Result<(), ReportError> {
        self.shared.update(|inner| {
            inner.transition(ControllerState::Stopped)?;
            inner.release_active();
            tracing::info!(report_id = ?inner.report_id, "report execution stopped");
            Ok(())
        })
    }

    /// Return from a finished execution to plan editing
    pub fn reopen_plan(&self) -> Result<(), ReportError> {
        self.shared.update(|inner| {
            inner.require(
                "reopen_plan",
                &[
                    ControllerState::Completed,
                    ControllerState::Failed,
                    ControllerState::Stopped,
                ],
            )?;
            if inner.plan.is_none() {
                return Err(ReportError::NoPlan);
            }
            inner.transition(ControllerState::PlanReady)?;
            inner.clear_execution();
            Ok(())
        })
    }

    /// Cancel background work; an active execution ends as `Stopped`
    pub fn shutdown(&self) {
        self.shared.update(|inner| {
            if inner.state == ControllerState::Executing {
                let _ = inner.transition(ControllerState::Stopped);
            }
            inner.release_active();
        });
    }
}

impl Drop for ReportController {
    fn drop(&mut self) {
        self.shared.inner.lock().release_active();
    }
}

impl std::fmt::Debug for ReportController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportController")
            .field("state", &self.state())
            .field("email", &self.shared.email)
            .finish_non_exhaustive()
    }
}
