//! Test: Fail-fast - the first failing step ends the run and is reported once

use crate::helpers::*;
use async_trait::async_trait;
use datamover_agent::core::config::StaticConfigSource;
use datamover_agent::core::{LifecycleEvent, LifecycleState, StatusLevel};
use datamover_agent::{
    LifecycleActions, LifecycleMachine, MoverConfig, Pipeline, PipelineRunner, Provisioner,
    StepResult,
};
use std::sync::Arc;

/// Real address validation followed by a stubbed backup target check
struct ScriptedActions {
    provisioner: Provisioner,
}

#[async_trait(?Send)]
impl LifecycleActions for ScriptedActions {
    async fn install(&self, runner: &PipelineRunner, config: &MoverConfig) -> StepResult {
        let provisioner = &self.provisioner;
        let pipeline = Pipeline::new("install")
            .step("validate_ip", move |_| async move {
                provisioner.validate_ip(&config.triliovault_ip).await
            })
            .step("validate_nfs", |_| async { StepResult::failure("no device") })
            .step("add_users", move |_| async move { provisioner.add_users().await });
        runner.run(&pipeline).await
    }

    async fn reconcile(&self, _config: &MoverConfig) -> StepResult {
        StepResult::success()
    }

    async fn teardown(&self, _runner: &PipelineRunner) -> StepResult {
        StepResult::success()
    }
}

#[tokio::test]
async fn test_failure_stops_at_failing_step() {
    let harness = Harness::new();
    let machine = LifecycleMachine::new(
        ScriptedActions {
            provisioner: harness.provisioner(),
        },
        harness.runner(),
        Arc::new(StaticConfigSource::new(MoverConfig::new("1.2.3.4", NFS_SHARE, ""))),
        harness.store(),
        harness.fake.clone(),
    );

    let outcome = machine.handle(LifecycleEvent::InstallRequested).await.unwrap();

    assert!(!outcome.result.ok);
    assert_eq!(outcome.result.message, "no device");
    assert_eq!(outcome.result.step.as_deref(), Some("validate_nfs"));
    assert_eq!(outcome.state, LifecycleState::Uninstalled);
    assert_eq!(machine.state().await.unwrap(), LifecycleState::Uninstalled);

    // The probe ran, nothing after the failing step did
    assert_eq!(harness.fake.calls(), vec!["probe 1.2.3.4:8781"]);
    assert_eq!(
        harness.fake.reports(),
        vec![(StatusLevel::Blocked, "no device".to_string())]
    );
}

#[tokio::test]
async fn test_user_setup_failure_skips_provisioning() {
    let harness = Harness::new();
    harness.fake.fail("add_user_to_group");
    let machine = harness.machine(valid_config());

    let outcome = machine.handle(LifecycleEvent::InstallRequested).await.unwrap();

    assert_eq!(outcome.result.step.as_deref(), Some("add_users"));
    assert!(outcome.result.message.starts_with("Failed while adding Users"));
    assert_eq!(harness.fake.count("fetch_index"), 0);
    assert_eq!(harness.fake.count("install_archive"), 0);
    assert_eq!(harness.fake.count("restart"), 0);
    assert_eq!(harness.fake.blocked_reports().len(), 1);
}

#[tokio::test]
async fn test_provisioning_failure_leaves_service_untouched() {
    let harness = Harness::new();
    let machine = harness.machine(valid_config());
    harness.fake.fail("copy");

    let outcome = machine.handle(LifecycleEvent::InstallRequested).await.unwrap();

    // Host libraries are copied into the virtualenv while provisioning
    assert_eq!(outcome.result.step.as_deref(), Some("provision_runtime"));
    assert_eq!(harness.fake.count("enable"), 0);
    assert_eq!(harness.fake.count("restart"), 0);
    assert!(harness.fake.with(|s| s.versions.is_empty()));
}
