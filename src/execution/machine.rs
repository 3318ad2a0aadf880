//! Lifecycle state machine - maps lifecycle events to pipelines and transitions

use crate::{
    core::{
        ConfigSource, LifecycleEvent, LifecycleState, MoverConfig, StatusLevel, StepResult,
        INSTALLED_FLAG, STOPPING_FLAG,
    },
    execution::PipelineRunner,
    host::StatusChannel,
    persistence::{PersistenceBackend, RunSummary},
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// The work behind each lifecycle transition
#[async_trait(?Send)]
pub trait LifecycleActions {
    /// Run the install pipeline
    async fn install(&self, runner: &PipelineRunner, config: &MoverConfig) -> StepResult;

    /// Apply a changed configuration to an installed unit
    async fn reconcile(&self, config: &MoverConfig) -> StepResult;

    /// Run the teardown pipeline
    async fn teardown(&self, runner: &PipelineRunner) -> StepResult;
}

/// What to do for a (state, event) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Plan {
    Install,
    Reconcile,
    /// Enter `Stopping`, then tear down
    EnterStopping,
    Teardown,
    /// Not an error: the event does not apply in this state
    Ignore,
}

/// Decide what an event means in a given state
pub fn plan(state: LifecycleState, event: LifecycleEvent) -> Plan {
    use LifecycleEvent::*;
    use LifecycleState::*;

    match (state, event) {
        (Uninstalled, InstallRequested) => Plan::Install,
        (Installed, ConfigChanged) => Plan::Reconcile,
        (Installed | Uninstalled, StopRequested) => Plan::EnterStopping,
        (Stopping, StopRequested) => Plan::Teardown,
        _ => Plan::Ignore,
    }
}

/// Result of handling one lifecycle event
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub event: LifecycleEvent,
    pub plan: Plan,
    pub state_before: LifecycleState,
    pub state: LifecycleState,
    /// Every state the unit passed through, from `state_before` to `state`
    pub path: Vec<LifecycleState>,
    pub result: StepResult,
}

/// Owns the lifecycle state and drives transitions
///
/// The state is rebuilt from the persisted flags for every event and only
/// written back after a terminal pipeline result.
pub struct LifecycleMachine<A> {
    actions: A,
    runner: PipelineRunner,
    config: Arc<dyn ConfigSource>,
    store: Arc<dyn PersistenceBackend>,
    status: Arc<dyn StatusChannel>,
}

impl<A: LifecycleActions> LifecycleMachine<A> {
    pub fn new(
        actions: A,
        runner: PipelineRunner,
        config: Arc<dyn ConfigSource>,
        store: Arc<dyn PersistenceBackend>,
        status: Arc<dyn StatusChannel>,
    ) -> Self {
        Self {
            actions,
            runner,
            config,
            store,
            status,
        }
    }

    /// Current lifecycle state, from the persisted flags
    pub async fn state(&self) -> Result<LifecycleState> {
        let installed = self.store.flag(INSTALLED_FLAG).await?;
        let stopping = self.store.flag(STOPPING_FLAG).await?;
        Ok(LifecycleState::from_flags(installed, stopping))
    }

    /// Handle one lifecycle event to completion
    pub async fn handle(&self, event: LifecycleEvent) -> Result<Outcome> {
        let started_at = Utc::now();
        let state_before = self.state().await?;
        let plan = plan(state_before, event);
        info!("Handling {} in state {}: {:?}", event, state_before, plan);

        let mut path = vec![state_before];
        let (state, result) = match plan {
            Plan::Ignore => (
                state_before,
                StepResult::success_with(format!(
                    "Nothing to do for {} while {}",
                    event, state_before
                )),
            ),
            Plan::Install => self.install(&mut path).await?,
            Plan::Reconcile => {
                let result = match self.load_config().await {
                    Ok(config) => self.actions.reconcile(&config).await,
                    Err(result) => result,
                };
                (LifecycleState::Installed, result)
            }
            Plan::EnterStopping => {
                self.store.set_flag(STOPPING_FLAG, true).await?;
                info!("Entered {}", LifecycleState::Stopping);
                path.push(LifecycleState::Stopping);
                self.teardown().await?
            }
            Plan::Teardown => self.teardown().await?,
        };

        if !result.ok {
            error!("{} failed: {}", event, result);
        }
        if path.last() != Some(&state) {
            path.push(state);
        }

        let summary = RunSummary::new(event, state_before, state, &result, started_at);
        self.store.save_run(&summary).await?;

        Ok(Outcome {
            event,
            plan,
            state_before,
            state,
            path,
            result,
        })
    }

    /// `Installing` is held only while the pipeline runs and never reaches the flags
    async fn install(
        &self,
        path: &mut Vec<LifecycleState>,
    ) -> Result<(LifecycleState, StepResult)> {
        let config = match self.load_config().await {
            Ok(config) => config,
            Err(result) => return Ok((LifecycleState::Uninstalled, result)),
        };

        info!("Entered {}", LifecycleState::Installing);
        path.push(LifecycleState::Installing);
        let result = self.actions.install(&self.runner, &config).await;
        if !result.ok {
            return Ok((LifecycleState::Uninstalled, result));
        }

        self.store.set_flag(INSTALLED_FLAG, true).await?;
        Ok((LifecycleState::Installed, result))
    }

    async fn teardown(&self) -> Result<(LifecycleState, StepResult)> {
        let result = self.actions.teardown(&self.runner).await;
        if !result.ok {
            return Ok((LifecycleState::Stopping, result));
        }

        self.store.set_flag(INSTALLED_FLAG, false).await?;
        self.store.set_flag(STOPPING_FLAG, false).await?;
        Ok((LifecycleState::Uninstalled, result))
    }

    /// Re-read the configuration; a failure is reported like a failed step
    async fn load_config(&self) -> std::result::Result<MoverConfig, StepResult> {
        match self.config.load().await {
            Ok(config) => Ok(config),
            Err(e) => {
                let result = StepResult::failure(format!("Failed to read configuration: {:#}", e))
                    .with_step("load_config");
                self.status.report(StatusLevel::Blocked, &result.message).await;
                Err(result)
            }
        }
    }
}
