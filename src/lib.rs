//! datamover-agent - lifecycle agent for the TrilioVault DataMover

pub mod cli;
pub mod core;
pub mod execution;
pub mod host;
pub mod persistence;
pub mod provision;

// Re-export commonly used types
pub use core::{
    AgentSettings, ConfigSource, LifecycleEvent, LifecycleState, MoverConfig, Pipeline,
    PipelineContext, StatusLevel, Step, StepResult,
};
pub use execution::{
    ExecutionEvent, LifecycleActions, LifecycleMachine, Outcome, PipelineRunner, Plan,
};
pub use host::{Host, HostError};
pub use persistence::{InMemoryPersistence, PersistenceBackend, RunSummary, SqliteStore};
pub use provision::{ConfigReconciler, Provisioner};
