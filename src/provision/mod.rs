//! Provisioning of the DataMover: install, reconcile and teardown
//!
//! Every step converts the errors of its host collaborators into a failed
//! [`StepResult`]; nothing else crosses a pipeline boundary.

pub mod install;
pub mod reconcile;
pub mod render;
pub mod teardown;

pub use reconcile::ConfigReconciler;

use crate::{
    core::{AgentSettings, MoverConfig, StatusLevel, StepResult},
    execution::{LifecycleActions, PipelineRunner},
    host::Host,
    persistence::PersistenceBackend,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Mode for directories owned by the runtime user
pub const DIR_MODE: u32 = 0o765;

/// Mode for files written for the runtime user
pub const FILE_MODE: u32 = 0o644;

/// Maintenance message while the install pipeline runs
pub const INSTALLING_MESSAGE: &str = "Installing...";

/// Maintenance message while the teardown pipeline runs
pub const STOPPING_MESSAGE: &str = "Stopping Trilio service";

/// Provisions the DataMover on this unit through the host collaborators
pub struct Provisioner {
    pub host: Host,
    pub settings: Arc<AgentSettings>,
    pub store: Arc<dyn PersistenceBackend>,
}

impl Provisioner {
    pub fn new(
        host: Host,
        settings: Arc<AgentSettings>,
        store: Arc<dyn PersistenceBackend>,
    ) -> Self {
        Self {
            host,
            settings,
            store,
        }
    }

    /// The reconciler for configuration changes, using the configured policy
    pub fn reconciler(&self) -> ConfigReconciler<'_> {
        ConfigReconciler::new(self, self.settings.reconcile_policy)
    }
}

#[async_trait(?Send)]
impl LifecycleActions for Provisioner {
    async fn install(&self, runner: &PipelineRunner, config: &MoverConfig) -> StepResult {
        self.host
            .status
            .report(StatusLevel::Maintenance, INSTALLING_MESSAGE)
            .await;
        self.run_install(runner, config).await
    }

    async fn reconcile(&self, config: &MoverConfig) -> StepResult {
        self.reconciler().reconcile(config).await
    }

    async fn teardown(&self, runner: &PipelineRunner) -> StepResult {
        self.host
            .status
            .report(StatusLevel::Maintenance, STOPPING_MESSAGE)
            .await;
        runner.run(&self.teardown_pipeline()).await
    }
}
