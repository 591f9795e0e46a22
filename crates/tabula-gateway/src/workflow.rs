//! Workflow engine client
//!
//! Implements [`Planner`] and [`ReportExecutor`]:
//! - `POST {workflow_url}/report-plan`
//! - `POST {workflow_url}/report-execute`
//! - `GET {workflow_url}/report-progress?reportId=`

use crate::http::{build_client, endpoint, parse_base, read_json, transport};
use async_trait::async_trait;
use serde::Serialize;
use tabula_core::{ConfigError, GatewayConfig, ReportId, RequestFailure};
use tabula_report::normalize::{normalize_plan, normalize_progress, normalize_submission};
use tabula_report::{ExecutionProgress, PlanRequest, Planner, ReportExecutor, ReportPlan, Submission};
use url::Url;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteBody<'a> {
    plan: &'a ReportPlan,
    email: &'a str,
    model: &'a str,
}

#[derive(Debug, Clone)]
pub struct WorkflowClient {
    client: reqwest::Client,
    base: Url,
}

impl WorkflowClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, ConfigError> {
        let base = parse_base(config.require_workflow_url()?)?;
        Ok(Self {
            client: build_client(config)?,
            base,
        })
    }

    /// Wrap an existing client, e.g. one with custom TLS settings
    pub fn with_reqwest_client(client: reqwest::Client, base: Url) -> Self {
        Self { client, base }
    }
}

#[async_trait]
impl Planner for WorkflowClient {
    async fn plan_report(&self, request: &PlanRequest) -> Result<ReportPlan, RequestFailure> {
        let url = endpoint(&self.base, &["report-plan"]);
        tracing::debug!(%url, datasets = request.dataset_ids.len(), "requesting plan");

        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| transport(&e))?;
        normalize_plan(&read_json(response).await?)
    }
}

#[async_trait]
impl ReportExecutor for WorkflowClient {
    async fn execute_plan(
        &self,
        plan: &ReportPlan,
        email: &str,
        model: &str,
    ) -> Result<Submission, RequestFailure> {
        let url = endpoint(&self.base, &["report-execute"]);
        tracing::debug!(%url, steps = plan.len(), "submitting plan");

        let response = self
            .client
            .post(url)
            .json(&ExecuteBody { plan, email, model })
            .send()
            .await
            .map_err(|e| transport(&e))?;
        normalize_submission(&read_json(response).await?)
    }

    async fn check_progress(&self, report_id: &ReportId) -> Result<ExecutionProgress, RequestFailure> {
        let mut url = endpoint(&self.base, &["report-progress"]);
        url.query_pairs_mut().append_pair("reportId", report_id.as_str());

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport(&e))?;
        normalize_progress(&read_json(response).await?, report_id)
    }
}
