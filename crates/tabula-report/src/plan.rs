//! Report plan model
//!
//! A plan is an ordered list of steps produced by the planner. Each step
//! targets one dataset with a query strategy and may depend on earlier
//! steps by number.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tabula_core::{DatasetId, ValidationError};

/// Filter value: one literal or a list of alternatives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Single(String),
    Multiple(Vec<String>),
}

impl FilterValue {
    /// Interpret free-form user input
    ///
    /// Blank input means "remove the filter" and yields `None`. Input with a
    /// comma becomes a list of the non-empty trimmed parts.
    #[must_use]
    pub fn parse_input(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        if !input.contains(',') {
            return Some(Self::Single(input.to_string()));
        }

        let parts: Vec<String> = input
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect();
        match parts.len() {
            0 => None,
            1 => parts.into_iter().next().map(Self::Single),
            _ => Some(Self::Multiple(parts)),
        }
    }

    /// Values as a slice-like list
    #[must_use]
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Single(value) => vec![value.as_str()],
            Self::Multiple(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

impl std::fmt::Display for FilterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.values().join(", "))
    }
}

/// How a step queries its dataset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStrategy {
    #[serde(default)]
    pub filters: BTreeMap<String, FilterValue>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub logic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_on: Option<String>,
}

/// One unit of work in a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPlanStep {
    /// 1-based, contiguous within the plan
    pub step_number: u32,
    pub dataset_id: DatasetId,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub query_strategy: QueryStrategy,
    /// Step numbers this step consumes output from
    #[serde(default)]
    pub dependencies: Vec<u32>,
    #[serde(default)]
    pub expected_output: Vec<String>,
}

impl ReportPlanStep {
    pub fn new(step_number: u32, dataset_id: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self {
            step_number,
            dataset_id: DatasetId::new(dataset_id),
            purpose: purpose.into(),
            query_strategy: QueryStrategy::default(),
            dependencies: Vec::new(),
            expected_output: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<u32>) -> Self {
        self.dependencies = dependencies;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, key: impl Into<String>, value: FilterValue) -> Self {
        self.query_strategy.filters.insert(key.into(), value);
        self
    }
}

/// Multi-step report plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPlan {
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub total_steps: usize,
    pub steps: Vec<ReportPlanStep>,
}

impl ReportPlan {
    /// Build a plan, deriving `total_steps` from `steps`
    pub fn new(plan_id: impl Into<String>, steps: Vec<ReportPlanStep>) -> Self {
        Self {
            plan_id: plan_id.into(),
            total_steps: steps.len(),
            steps,
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Re-derive `total_steps` after the step list changed
    pub fn sync_total(&mut self) {
        self.total_steps = self.steps.len();
    }

    /// Distinct dataset ids in step order
    #[must_use]
    pub fn dataset_ids(&self) -> Vec<DatasetId> {
        let mut ids: Vec<DatasetId> = Vec::new();
        for step in &self.steps {
            if !ids.contains(&step.dataset_id) {
                ids.push(step.dataset_id.clone());
            }
        }
        ids
    }

    /// Mutable access to a step by 0-based index
    pub fn step_mut(&mut self, index: usize) -> Result<&mut ReportPlanStep, ValidationError> {
        let len = self.steps.len();
        self.steps
            .get_mut(index)
            .ok_or(ValidationError::StepIndexOutOfRange { index, len })
    }

    /// Structural checks run before submission
    ///
    /// - at least one step
    /// - step numbers are exactly `1..=n` in order
    /// - every step names a dataset
    /// - dependencies only point at earlier steps
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.steps.is_empty() {
            return Err(ValidationError::InvalidPlan("plan has no steps".into()));
        }

        for (position, step) in (1u32..).zip(&self.steps) {
            if step.step_number != position {
                return Err(ValidationError::InvalidPlan(format!(
                    "step at position {position} is numbered {}",
                    step.step_number
                )));
            }
            if step.dataset_id.as_str().trim().is_empty() {
                return Err(ValidationError::InvalidPlan(format!(
                    "step {position} has no dataset"
                )));
            }
            if let Some(dep) = step
                .dependencies
                .iter()
                .find(|dep| **dep == 0 || **dep >= position)
            {
                return Err(ValidationError::InvalidPlan(format!(
                    "step {position} depends on step {dep}, which does not precede it"
                )));
            }
        }
        Ok(())
    }
}
