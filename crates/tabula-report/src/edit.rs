//! In-place plan edits
//!
//! Every edit addresses a step by 0-based index and touches only that step,
//! except [`ReportPlan::remove_step`] which renumbers what follows.

use crate::plan::{FilterValue, ReportPlan, ReportPlanStep};
use tabula_core::{DatasetId, ValidationError};

/// Replace one top-level field of a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepEdit {
    Purpose(String),
    Dataset(DatasetId),
    Dependencies(Vec<u32>),
    ExpectedOutput(Vec<String>),
}

/// Replace one field of a step's query strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryFieldEdit {
    Columns(Vec<String>),
    Logic(String),
    JoinOn(Option<String>),
}

impl ReportPlan {
    pub fn edit_step(&mut self, index: usize, edit: StepEdit) -> Result<(), ValidationError> {
        let step = self.step_mut(index)?;
        match edit {
            StepEdit::Purpose(purpose) => step.purpose = purpose,
            StepEdit::Dataset(dataset_id) => step.dataset_id = dataset_id,
            StepEdit::Dependencies(dependencies) => step.dependencies = dependencies,
            StepEdit::ExpectedOutput(expected) => step.expected_output = expected,
        }
        Ok(())
    }

    /// Set or (with `None`) remove a filter on one step
    pub fn edit_filter(
        &mut self,
        index: usize,
        key: &str,
        value: Option<FilterValue>,
    ) -> Result<(), ValidationError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ValidationError::InvalidPlan(
                "filter key must not be empty".into(),
            ));
        }

        let filters = &mut self.step_mut(index)?.query_strategy.filters;
        match value {
            Some(value) => {
                filters.insert(key.to_string(), value);
            }
            None => {
                filters.remove(key);
            }
        }
        Ok(())
    }

    pub fn edit_query_field(
        &mut self,
        index: usize,
        edit: QueryFieldEdit,
    ) -> Result<(), ValidationError> {
        let strategy = &mut self.step_mut(index)?.query_strategy;
        match edit {
            QueryFieldEdit::Columns(columns) => strategy.columns = columns,
            QueryFieldEdit::Logic(logic) => strategy.logic = logic,
            QueryFieldEdit::JoinOn(join_on) => {
                strategy.join_on = join_on.filter(|j| !j.trim().is_empty());
            }
        }
        Ok(())
    }

    /// Remove a step, shifting later step numbers down by one
    ///
    /// Dependencies on the removed step are dropped; dependencies on later
    /// steps follow the renumbering.
    pub fn remove_step(&mut self, index: usize) -> Result<ReportPlanStep, ValidationError> {
        let len = self.steps.len();
        if index >= len {
            return Err(ValidationError::StepIndexOutOfRange { index, len });
        }

        let removed = self.steps.remove(index);
        let gone = removed.step_number;
        for step in &mut self.steps {
            if step.step_number > gone {
                step.step_number -= 1;
            }
            step.dependencies.retain(|dep| *dep != gone);
            for dep in &mut step.dependencies {
                if *dep > gone {
                    *dep -= 1;
                }
            }
        }
        self.sync_total();
        Ok(removed)
    }
}
