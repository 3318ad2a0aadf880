//! Reconciliation of configuration changes on an installed unit

use crate::{
    core::{MoverConfig, ReconcilePolicy, StatusLevel, StepResult, READY_MESSAGE},
    provision::Provisioner,
};
use tracing::{info, warn};

/// Applies a changed configuration to an installed mover
///
/// The service is stopped, the backup target re-validated and, when valid,
/// the configuration file re-rendered. Whether the service comes back after a
/// failed validation depends on the [`ReconcilePolicy`].
pub struct ConfigReconciler<'a> {
    provisioner: &'a Provisioner,
    policy: ReconcilePolicy,
}

impl<'a> ConfigReconciler<'a> {
    pub fn new(provisioner: &'a Provisioner, policy: ReconcilePolicy) -> Self {
        Self {
            provisioner,
            policy,
        }
    }

    /// Apply `config`; reports exactly one final status
    pub async fn reconcile(&self, config: &MoverConfig) -> StepResult {
        let host = &self.provisioner.host;
        let service = &self.provisioner.settings.service_name;

        if let Err(e) = host.services.stop(service).await {
            warn!("Failed to stop {}: {}", service, e);
        }

        let mut result = self.provisioner.validate_nfs(config).await.with_step("validate_nfs");
        if result.ok {
            result = self.provisioner.render_config(config).await.with_step("render_config");
        }

        let restart = match (result.ok, self.policy) {
            (true, _) => true,
            (false, ReconcilePolicy::AlwaysRestart) => {
                warn!(
                    "Restarting {} with its previous configuration: {}",
                    service, result.message
                );
                true
            }
            (false, ReconcilePolicy::HoldOnInvalid) => {
                info!("Leaving {} stopped until a valid configuration arrives", service);
                false
            }
        };

        if restart {
            if let Err(e) = host.services.start(service).await {
                if result.ok {
                    result = StepResult::from_error(&format!("Failed to start {}", service), e)
                        .with_step("start_service");
                } else {
                    warn!("Failed to start {}: {}", service, e);
                }
            }
        }

        if result.ok {
            host.status.report(StatusLevel::Active, READY_MESSAGE).await;
            StepResult::success_with(READY_MESSAGE)
        } else {
            host.status.report(StatusLevel::Blocked, &result.message).await;
            result
        }
    }
}
