//! Step domain model

use crate::core::{context::PipelineContext, result::StepResult};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by a step action
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = StepResult> + 'a>>;

/// Boxed step action
pub type StepAction<'a> = Box<dyn Fn(Arc<PipelineContext>) -> StepFuture<'a> + 'a>;

/// A single named step in a pipeline
///
/// The action may be invoked any number of times over the lifetime of the
/// system (a failed pipeline is retried by re-delivering its event), so every
/// action must tolerate work left behind by an earlier partial run.
pub struct Step<'a> {
    /// Step name, unique within its pipeline
    pub name: String,

    action: StepAction<'a>,
}

impl<'a> Step<'a> {
    /// Create a step from an async action
    pub fn new<F, Fut>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn(Arc<PipelineContext>) -> Fut + 'a,
        Fut: Future<Output = StepResult> + 'a,
    {
        Self {
            name: name.into(),
            action: Box::new(move |ctx: Arc<PipelineContext>| -> StepFuture<'a> {
                Box::pin(action(ctx))
            }),
        }
    }

    /// Run the step action once
    pub async fn run(&self, ctx: Arc<PipelineContext>) -> StepResult {
        (self.action)(ctx).await
    }
}

impl std::fmt::Debug for Step<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step").field("name", &self.name).finish_non_exhaustive()
    }
}
