//! Collaborators that replay scripted responses

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tabula_core::{ReportId, RequestFailure};
use tabula_report::{
    ConversationRecord, ConversationStore, ExecutionProgress, PlanRequest, Planner, ReportExecutor,
    ReportPlan, SavedConversation, Submission,
};
use tokio::sync::{oneshot, Notify};

fn exhausted(what: &str) -> RequestFailure {
    RequestFailure::Transport(format!("no scripted {what}"))
}

/// Queued reply; `None` never answers
type Scripted<T> = Option<Result<T, RequestFailure>>;

/// Planner answering from a queue
#[derive(Default)]
pub struct ScriptedPlanner {
    responses: Mutex<VecDeque<Scripted<ReportPlan>>>,
    requests: Mutex<Vec<PlanRequest>>,
}

impl ScriptedPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn respond(self, response: Result<ReportPlan, RequestFailure>) -> Self {
        self.responses.lock().push_back(Some(response));
        self
    }

    /// Queue a call that never returns
    #[must_use]
    pub fn hang(self) -> Self {
        self.responses.lock().push_back(None);
        self
    }

    pub fn requests(&self) -> Vec<PlanRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan_report(&self, request: &PlanRequest) -> Result<ReportPlan, RequestFailure> {
        self.requests.lock().push(request.clone());
        let next = self.responses.lock().pop_front();
        match next {
            Some(Some(response)) => response,
            Some(None) => std::future::pending().await,
            None => Err(exhausted("plan")),
        }
    }
}

/// Executor replaying submissions and progress
///
/// Once the progress script runs out, the last response is repeated.
/// `hold_next_poll` makes the next `check_progress` call block until the
/// returned sender fires (or is dropped).
#[derive(Default)]
pub struct ScriptedExecutor {
    submissions: Mutex<VecDeque<Scripted<Submission>>>,
    progress: Mutex<VecDeque<Result<ExecutionProgress, RequestFailure>>>,
    last_progress: Mutex<Option<Result<ExecutionProgress, RequestFailure>>>,
    held: Mutex<Option<oneshot::Receiver<()>>>,
    poll_started: Notify,
    submitted: Mutex<Vec<ReportPlan>>,
    poll_calls: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn submit(self, response: Result<Submission, RequestFailure>) -> Self {
        self.submissions.lock().push_back(Some(response));
        self
    }

    /// Queue a submission that never returns
    #[must_use]
    pub fn hang_submission(self) -> Self {
        self.submissions.lock().push_back(None);
        self
    }

    #[must_use]
    pub fn progress(self, response: Result<ExecutionProgress, RequestFailure>) -> Self {
        self.progress.lock().push_back(response);
        self
    }

    /// Append a progress response after construction
    pub fn push_progress(&self, response: Result<ExecutionProgress, RequestFailure>) {
        self.progress.lock().push_back(response);
    }

    pub fn hold_next_poll(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.held.lock() = Some(rx);
        tx
    }

    /// Resolves once a `check_progress` call has started
    pub async fn wait_for_poll(&self) {
        self.poll_started.notified().await;
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<ReportPlan> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl ReportExecutor for ScriptedExecutor {
    async fn execute_plan(
        &self,
        plan: &ReportPlan,
        _email: &str,
        _model: &str,
    ) -> Result<Submission, RequestFailure> {
        self.submitted.lock().push(plan.clone());
        let next = self.submissions.lock().pop_front();
        match next {
            Some(Some(response)) => response,
            Some(None) => std::future::pending().await,
            None => Err(exhausted("submission")),
        }
    }

    async fn check_progress(&self, _report_id: &ReportId) -> Result<ExecutionProgress, RequestFailure> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        self.poll_started.notify_one();

        let held = self.held.lock().take();
        if let Some(release) = held {
            let _ = release.await;
        }

        let next = self.progress.lock().pop_front();
        match next {
            Some(response) => {
                *self.last_progress.lock() = Some(response.clone());
                response
            }
            None => self
                .last_progress
                .lock()
                .clone()
                .unwrap_or_else(|| Err(exhausted("progress"))),
        }
    }
}

/// Conversation store that keeps what it was given
#[derive(Default)]
pub struct RecordingConversationStore {
    records: Mutex<Vec<ConversationRecord>>,
    failing: bool,
}

impl RecordingConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects every save
    pub fn failing() -> Self {
        Self {
            records: Mutex::default(),
            failing: true,
        }
    }

    pub fn records(&self) -> Vec<ConversationRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl ConversationStore for RecordingConversationStore {
    async fn save_conversation(
        &self,
        record: &ConversationRecord,
    ) -> Result<SavedConversation, RequestFailure> {
        if self.failing {
            return Err(RequestFailure::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        let mut records = self.records.lock();
        records.push(record.clone());
        Ok(SavedConversation {
            id: format!("conv-{}", records.len()),
        })
    }
}
