//! Pipeline execution and lifecycle state machine

pub mod engine;
pub mod machine;

pub use engine::{EventHandler, ExecutionEvent, PipelineRunner};
pub use machine::{plan, LifecycleActions, LifecycleMachine, Outcome, Plan};
