//! Step outcome model

use serde::{Deserialize, Serialize};

/// Outcome of a single provisioning step or of a whole pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    /// Whether the step succeeded
    pub ok: bool,

    /// Human-readable outcome. Never empty on failure.
    pub message: String,

    /// Name of the step that produced a failure (set by the pipeline runner)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
}

impl StepResult {
    /// A successful outcome with no message
    pub fn success() -> Self {
        Self {
            ok: true,
            message: String::new(),
            step: None,
        }
    }

    /// A successful outcome with an informational message
    pub fn success_with(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            step: None,
        }
    }

    /// A failed outcome
    ///
    /// An empty message is replaced with a generic one so that failures are
    /// always describable on the status channel.
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            "Step failed without a reason".to_string()
        } else {
            message
        };
        Self {
            ok: false,
            message,
            step: None,
        }
    }

    /// A failed outcome built from a context string and an underlying error
    pub fn from_error(context: &str, error: impl std::fmt::Display) -> Self {
        Self::failure(format!("{}: {}", context, error))
    }

    /// Annotate the result with the name of the step that produced it
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }
}

impl std::fmt::Display for StepResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.step, self.ok) {
            (Some(step), false) => write!(f, "{} failed: {}", step, self.message),
            (_, false) => write!(f, "failed: {}", self.message),
            (_, true) if self.message.is_empty() => write!(f, "ok"),
            (_, true) => write!(f, "ok: {}", self.message),
        }
    }
}
