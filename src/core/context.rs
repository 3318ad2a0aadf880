//! Pipeline context - values shared between the steps of one run

use std::collections::HashMap;
use std::sync::Mutex;

/// Key under which the version resolved from the package index is stored
pub const LATEST_VERSION: &str = "latest_version";

/// Key set when the runtime environment is already at the latest version
pub const ALREADY_PROVISIONED: &str = "already_provisioned";

/// Execution context for a pipeline run
///
/// Steps run strictly one after another, so the lock is never contended; it only
/// exists so the context can be shared by reference with every step future.
#[derive(Debug, Default)]
pub struct PipelineContext {
    /// Values published by steps (key -> value)
    values: Mutex<HashMap<String, String>>,

    /// Informational messages of completed steps (step name -> message)
    step_outputs: Mutex<Vec<(String, String)>>,
}

impl PipelineContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a value for later steps
    pub fn set(&self, key: &str, value: impl Into<String>) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.into());
        }
    }

    /// Read a value published by an earlier step
    pub fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok().and_then(|values| values.get(key).cloned())
    }

    /// Whether a key holds the value `"true"`
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).as_deref() == Some("true")
    }

    /// Record the output of a completed step
    pub fn set_step_output(&self, step: &str, output: impl Into<String>) {
        if let Ok(mut outputs) = self.step_outputs.lock() {
            outputs.push((step.to_string(), output.into()));
        }
    }

    /// Names of the steps that completed, in order
    pub fn completed_steps(&self) -> Vec<String> {
        self.step_outputs
            .lock()
            .map(|outputs| outputs.iter().map(|(step, _)| step.clone()).collect())
            .unwrap_or_default()
    }

    /// Get the output of a step
    pub fn step_output(&self, step: &str) -> Option<String> {
        self.step_outputs.lock().ok().and_then(|outputs| {
            outputs
                .iter()
                .find(|(name, _)| name == step)
                .map(|(_, output)| output.clone())
        })
    }
}
