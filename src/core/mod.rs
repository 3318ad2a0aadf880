//! Core domain models
//!
//! This module defines the fundamental data structures that represent
//! provisioning pipelines, their steps and outcomes, and the lifecycle
//! state of the mover.

pub mod config;
pub mod context;
pub mod pipeline;
pub mod result;
pub mod state;
pub mod step;

pub use config::{AgentSettings, ConfigSource, MoverConfig, ReconcilePolicy};
pub use context::{PipelineContext, ALREADY_PROVISIONED, LATEST_VERSION};
pub use pipeline::*;
pub use result::StepResult;
pub use state::*;
pub use step::*;
