//! Pipeline domain model

use crate::core::{
    result::StepResult,
    state::StatusLevel,
    step::Step,
    context::PipelineContext,
};
use anyhow::Result;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

/// Status message reported when a pipeline completes and no other is configured
pub const READY_MESSAGE: &str = "Unit is ready";

/// An ordered, fail-fast sequence of named steps
#[derive(Debug)]
pub struct Pipeline<'a> {
    /// Pipeline name
    pub name: String,

    /// Steps in execution order
    steps: Vec<Step<'a>>,

    /// Status reported on the status channel when every step succeeds
    success_status: (StatusLevel, String),
}

impl<'a> Pipeline<'a> {
    /// Create an empty pipeline
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            success_status: (StatusLevel::Active, READY_MESSAGE.to_string()),
        }
    }

    /// Append a step (builder style)
    pub fn step<F, Fut>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(Arc<PipelineContext>) -> Fut + 'a,
        Fut: Future<Output = StepResult> + 'a,
    {
        self.steps.push(Step::new(name, action));
        self
    }

    /// Append an already constructed step
    pub fn push(&mut self, step: Step<'a>) {
        self.steps.push(step);
    }

    /// Override the status reported on success
    pub fn with_success_status(mut self, level: StatusLevel, message: impl Into<String>) -> Self {
        self.success_status = (level, message.into());
        self
    }

    /// Get the steps in execution order
    pub fn steps(&self) -> &[Step<'a>] {
        &self.steps
    }

    /// Get the step names in execution order
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Status reported when every step succeeds
    pub fn success_status(&self) -> (StatusLevel, &str) {
        (self.success_status.0, self.success_status.1.as_str())
    }

    /// Validate the pipeline definition
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                anyhow::bail!("Pipeline '{}' has a step without a name", self.name);
            }
            if !seen.insert(step.name.as_str()) {
                anyhow::bail!("Duplicate step name in pipeline '{}': {}", self.name, step.name);
            }
        }
        Ok(())
    }
}
