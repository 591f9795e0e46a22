//! Response normalization
//!
//! Workflow responses arrive in loosely defined shapes: the payload may be
//! wrapped in a list, nested under `data` / `result` / `output` / `plan` /
//! `body` / `json`, or encoded as a JSON string (sometimes inside a
//! markdown code fence). [`find_payload`] walks those envelopes, at most
//! [`MAX_DEPTH`] levels deep, and returns the first object that satisfies a
//! shape predicate. Everything past this module is typed.

use crate::plan::ReportPlan;
use crate::progress::{ExecutionProgress, Submission};
use serde_json::{Map, Value};
use tabula_core::{ReportId, RequestFailure};

/// Envelope keys searched in order
pub const ENVELOPE_KEYS: &[&str] = &["data", "result", "output", "plan", "body", "json", "response"];

/// Maximum envelope nesting
pub const MAX_DEPTH: usize = 6;

/// Locate the first object accepted by `accept`
pub fn find_payload<F>(value: &Value, accept: F) -> Option<Map<String, Value>>
where
    F: Fn(&Map<String, Value>) -> bool,
{
    search(value, &accept, 0)
}

fn search<F>(value: &Value, accept: &F, depth: usize) -> Option<Map<String, Value>>
where
    F: Fn(&Map<String, Value>) -> bool,
{
    if depth > MAX_DEPTH {
        return None;
    }

    match value {
        Value::Object(object) => {
            if accept(object) {
                return Some(object.clone());
            }
            ENVELOPE_KEYS
                .iter()
                .filter_map(|key| object.get(*key))
                .find_map(|inner| search(inner, accept, depth + 1))
        }
        Value::Array(items) => items
            .iter()
            .find_map(|item| search(item, accept, depth + 1)),
        Value::String(text) => {
            let decoded: Value = serde_json::from_str(strip_code_fence(text)).ok()?;
            search(&decoded, accept, depth + 1)
        }
        _ => None,
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Error message carried by an envelope that has no usable payload
fn rejection(value: &Value) -> Option<String> {
    let object = match value {
        Value::Object(object) => object,
        Value::Array(items) => items.first()?.as_object()?,
        _ => return None,
    };
    ["error", "message"]
        .iter()
        .filter_map(|key| object.get(*key))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Object(inner) => inner
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
}

fn missing(value: &Value, what: &str) -> RequestFailure {
    match rejection(value) {
        Some(message) => RequestFailure::Rejected(message),
        None => RequestFailure::Malformed(format!("no {what} found in response")),
    }
}

fn decode<T: serde::de::DeserializeOwned>(object: Map<String, Value>, what: &str) -> Result<T, RequestFailure> {
    serde_json::from_value(Value::Object(object))
        .map_err(|e| RequestFailure::Malformed(format!("invalid {what}: {e}")))
}

fn has_steps(object: &Map<String, Value>) -> bool {
    matches!(object.get("steps"), Some(Value::Array(_)))
}

fn has_report_id(object: &Map<String, Value>) -> bool {
    ["reportId", "report_id"]
        .iter()
        .any(|key| matches!(object.get(*key), Some(Value::String(s)) if !s.trim().is_empty()))
}

fn has_status(object: &Map<String, Value>) -> bool {
    matches!(object.get("status"), Some(Value::String(_)))
}

/// Plan from a planner response
pub fn normalize_plan(value: &Value) -> Result<ReportPlan, RequestFailure> {
    let object = find_payload(value, has_steps).ok_or_else(|| missing(value, "report plan"))?;
    let mut plan: ReportPlan = decode(object, "report plan")?;
    plan.sync_total();
    Ok(plan)
}

/// Submission acknowledgement from an execute response
pub fn normalize_submission(value: &Value) -> Result<Submission, RequestFailure> {
    let object =
        find_payload(value, has_report_id).ok_or_else(|| missing(value, "report id"))?;
    decode(object, "submission")
}

/// Progress from a progress response
///
/// Payloads that omit the report id are attributed to `expected`.
pub fn normalize_progress(value: &Value, expected: &ReportId) -> Result<ExecutionProgress, RequestFailure> {
    let mut object =
        find_payload(value, has_status).ok_or_else(|| missing(value, "progress status"))?;
    if let Some(id) = object.remove("report_id") {
        object.entry("reportId").or_insert(id);
    }
    object
        .entry("reportId")
        .or_insert_with(|| Value::String(expected.as_str().to_string()));
    decode(object, "progress")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ExecutionStatus;
    use serde_json::json;

    #[test]
    fn plan_at_top_level() {
        let plan = normalize_plan(&json!({
            "planId": "p1",
            "steps": [{"stepNumber": 1, "datasetId": "sales"}]
        }))
        .unwrap();
        assert_eq!(plan.total_steps, 1);
    }

    #[test]
    fn plan_in_list_and_envelopes() {
        let value = json!([{ "output": { "plan": { "steps": [
            {"stepNumber": 1, "datasetId": "a"},
            {"stepNumber": 2, "datasetId": "b", "dependencies": [1]}
        ]}}}]);
        let plan = normalize_plan(&value).unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].dependencies, vec![1]);
    }

    #[test]
    fn plan_as_fenced_json_string() {
        let inner = "```json\n{\"steps\":[{\"stepNumber\":1,\"datasetId\":\"a\"}]}\n```";
        let plan = normalize_plan(&json!({ "output": inner })).unwrap();
        assert_eq!(plan.steps[0].dataset_id.as_str(), "a");
    }

    #[test]
    fn depth_is_bounded() {
        let mut value = json!({"steps": []});
        for _ in 0..=MAX_DEPTH {
            value = json!({ "data": value });
        }
        assert!(matches!(normalize_plan(&value), Err(RequestFailure::Malformed(_))));
    }

    #[test]
    fn error_envelope_is_rejection() {
        let err = normalize_submission(&json!({"error": {"message": "quota exceeded"}})).unwrap_err();
        assert_eq!(err, RequestFailure::Rejected("quota exceeded".into()));
    }

    #[test]
    fn submission_from_data_envelope() {
        let submission = normalize_submission(&json!({"data": {"reportId": "r1", "totalSteps": 3}})).unwrap();
        assert_eq!(submission.report_id.as_str(), "r1");
        assert_eq!(submission.total_steps, 3);
    }

    #[test]
    fn progress_defaults_report_id() {
        let progress = normalize_progress(
            &json!([{ "json": { "status": "in_progress", "steps": [] } }]),
            &ReportId::new("r7"),
        )
        .unwrap();
        assert_eq!(progress.report_id.as_str(), "r7");
        assert_eq!(progress.status, ExecutionStatus::InProgress);
    }

    #[test]
    fn progress_keeps_foreign_report_id() {
        let progress = normalize_progress(
            &json!({"report_id": "other", "status": "completed", "finalReport": "# Done"}),
            &ReportId::new("r7"),
        )
        .unwrap();
        assert_eq!(progress.report_id.as_str(), "other");
        assert_eq!(progress.final_report.as_deref(), Some("# Done"));
    }

    #[test]
    fn unknown_status_counts_as_in_progress() {
        let progress = normalize_progress(
            &json!({"status": "queued", "steps": [{"stepNumber": 1, "status": "completed"}]}),
            &ReportId::new("r1"),
        )
        .unwrap();
        assert_eq!(progress.status, ExecutionStatus::InProgress);
        assert!(progress.all_steps_terminal());
    }

    #[test]
    fn status_must_be_a_string() {
        let err = normalize_progress(&json!({"status": 3}), &ReportId::new("r1")).unwrap_err();
        assert!(matches!(err, RequestFailure::Malformed(_)));
    }
}
