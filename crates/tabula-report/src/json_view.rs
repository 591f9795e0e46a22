//! Raw JSON editing of a plan
//!
//! The buffer is free text until it is accepted; acceptance requires a JSON
//! object with a `steps` array that decodes into a [`ReportPlan`].

use crate::plan::ReportPlan;
use serde_json::Value;
use tabula_core::ValidationError;

/// Pretty JSON for the editor buffer
pub fn render_plan_json(plan: &ReportPlan) -> Result<String, ValidationError> {
    serde_json::to_string_pretty(plan).map_err(|e| ValidationError::plan_json("$", e.to_string()))
}

/// Parse an edited buffer back into a plan
///
/// `total_steps` is recomputed from the decoded steps.
pub fn parse_plan_json(text: &str) -> Result<ReportPlan, ValidationError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ValidationError::plan_json("$", format!("not valid JSON: {e}")))?;

    let Some(object) = value.as_object() else {
        return Err(ValidationError::plan_json("$", "expected a JSON object"));
    };
    match object.get("steps") {
        Some(Value::Array(_)) => {}
        Some(_) => return Err(ValidationError::plan_json("steps", "must be an array")),
        None => return Err(ValidationError::plan_json("steps", "is required")),
    }

    let mut plan: ReportPlan = serde_json::from_value(value)
        .map_err(|e| ValidationError::plan_json("steps", e.to_string()))?;
    plan.sync_total();
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ReportPlanStep;
    use pretty_assertions::assert_eq;

    #[test]
    fn rendered_plan_parses_back() {
        let plan = ReportPlan::new("p1", vec![ReportPlanStep::new(1, "sales", "Load")]);
        let text = render_plan_json(&plan).unwrap();
        assert!(text.contains("\"stepNumber\": 1"));
        assert_eq!(parse_plan_json(&text).unwrap(), plan);
    }

    #[test]
    fn missing_steps_is_field_error() {
        let err = parse_plan_json(r#"{"planId":"p1"}"#).unwrap_err();
        assert_eq!(err, ValidationError::plan_json("steps", "is required"));
    }

    #[test]
    fn non_array_steps_rejected() {
        let err = parse_plan_json(r#"{"steps":{}}"#).unwrap_err();
        assert!(matches!(err, ValidationError::PlanJson { ref field, .. } if field == "steps"));
    }

    #[test]
    fn syntax_error_points_at_root() {
        let err = parse_plan_json("{ steps: [").unwrap_err();
        assert!(matches!(err, ValidationError::PlanJson { ref field, .. } if field == "$"));
        assert!(parse_plan_json("[1, 2]").is_err());
    }

    #[test]
    fn total_steps_recomputed() {
        let plan = parse_plan_json(
            r#"{"totalSteps":7,"steps":[{"stepNumber":1,"datasetId":"a"},{"stepNumber":2,"datasetId":"b"}]}"#,
        )
        .unwrap();
        assert_eq!(plan.total_steps, 2);
    }

    #[test]
    fn malformed_step_reports_steps_field() {
        let err = parse_plan_json(r#"{"steps":[{"purpose":"no number"}]}"#).unwrap_err();
        assert!(matches!(err, ValidationError::PlanJson { ref field, .. } if field == "steps"));
    }
}
