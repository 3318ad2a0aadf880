//! Pipeline runner - executes a pipeline's steps in order, stopping at the first failure

use crate::{
    core::{Pipeline, PipelineContext, StatusLevel, StepResult},
    host::StatusChannel,
};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Events that can occur during pipeline execution
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    PipelineStarted {
        pipeline_name: String,
        total_steps: usize,
    },
    StepStarted {
        step_name: String,
        index: usize,
    },
    StepCompleted {
        step_name: String,
        message: String,
    },
    StepFailed {
        step_name: String,
        error: String,
    },
    PipelineCompleted {
        pipeline_name: String,
        ok: bool,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fail-fast pipeline runner
///
/// Every run ends with exactly one status report: `blocked` with the failing
/// step's message, or the pipeline's success status.
pub struct PipelineRunner {
    status: Arc<dyn StatusChannel>,
    event_handlers: Vec<EventHandler>,
}

impl PipelineRunner {
    pub fn new(status: Arc<dyn StatusChannel>) -> Self {
        Self {
            status,
            event_handlers: Vec::new(),
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Run a pipeline with a fresh context
    pub async fn run(&self, pipeline: &Pipeline<'_>) -> StepResult {
        self.run_with_context(pipeline, Arc::new(PipelineContext::new()))
            .await
    }

    /// Run a pipeline, sharing `ctx` between its steps
    pub async fn run_with_context(
        &self,
        pipeline: &Pipeline<'_>,
        ctx: Arc<PipelineContext>,
    ) -> StepResult {
        if let Err(e) = pipeline.validate() {
            error!("Invalid pipeline {}: {}", pipeline.name, e);
            let result = StepResult::failure(e.to_string());
            self.status.report(StatusLevel::Blocked, &result.message).await;
            return result;
        }

        let total_steps = pipeline.steps().len();
        info!("Starting pipeline: {} ({} steps)", pipeline.name, total_steps);
        self.emit_event(ExecutionEvent::PipelineStarted {
            pipeline_name: pipeline.name.clone(),
            total_steps,
        });

        for (index, step) in pipeline.steps().iter().enumerate() {
            debug!("Running step {}/{}: {}", index + 1, total_steps, step.name);
            self.emit_event(ExecutionEvent::StepStarted {
                step_name: step.name.clone(),
                index,
            });

            let result = step.run(ctx.clone()).await;

            if !result.ok {
                error!("Step {} failed: {}", step.name, result.message);
                self.emit_event(ExecutionEvent::StepFailed {
                    step_name: step.name.clone(),
                    error: result.message.clone(),
                });
                self.emit_event(ExecutionEvent::PipelineCompleted {
                    pipeline_name: pipeline.name.clone(),
                    ok: false,
                });
                self.status.report(StatusLevel::Blocked, &result.message).await;
                return result.with_step(step.name.clone());
            }

            ctx.set_step_output(&step.name, result.message.clone());
            self.emit_event(ExecutionEvent::StepCompleted {
                step_name: step.name.clone(),
                message: result.message,
            });
        }

        info!("Pipeline finished: {}", pipeline.name);
        self.emit_event(ExecutionEvent::PipelineCompleted {
            pipeline_name: pipeline.name.clone(),
            ok: true,
        });

        let (level, message) = pipeline.success_status();
        self.status.report(level, message).await;
        StepResult::success_with(message)
    }
}
