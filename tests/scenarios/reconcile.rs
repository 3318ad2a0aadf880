//! Test: Configuration reconciliation on an installed unit

use crate::helpers::*;
use datamover_agent::core::{
    LifecycleEvent, LifecycleState, ReconcilePolicy, StatusLevel, INSTALLED_FLAG,
};
use datamover_agent::provision::install::{MOUNT_FAILED_MESSAGE, NO_SHARES_MESSAGE};
use datamover_agent::{AgentSettings, MoverConfig, PersistenceBackend};

const CONFIG_FILE: &str = "/etc/tvault-contego/tvault-contego.conf";

/// Install with the valid configuration, then forget the recorded activity
async fn installed(harness: &Harness) {
    let outcome = harness
        .machine(valid_config())
        .handle(LifecycleEvent::InstallRequested)
        .await
        .unwrap();
    assert!(outcome.result.ok, "{}", outcome.result);
    harness.fake.clear_calls();
}

#[tokio::test]
async fn test_reconcile_new_share() {
    let harness = Harness::new();
    installed(&harness).await;
    let changed = MoverConfig::new(APPLIANCE_IP, "10.5.0.30:/export/backups", "nolock");

    let outcome = harness
        .machine(changed)
        .handle(LifecycleEvent::ConfigChanged)
        .await
        .unwrap();

    assert!(outcome.result.ok, "{}", outcome.result);
    assert_eq!(outcome.state, LifecycleState::Installed);

    let fake = &harness.fake;
    assert_eq!(fake.position("stop tvault-contego"), Some(0));
    assert!(fake
        .calls()
        .contains(&"mount 10.5.0.30:/export/backups /var/triliovault-mounts nfs".to_string()));
    assert_eq!(fake.count("unmount"), 1);
    assert_eq!(fake.calls().last().map(String::as_str), Some("start tvault-contego"));

    let conf = fake.file(CONFIG_FILE).unwrap();
    assert!(conf.contains("vault_storage_nfs_export = 10.5.0.30:/export/backups\n"));
    assert!(conf.contains("vault_storage_nfs_options = nolock\n"));

    assert_eq!(
        fake.reports(),
        vec![(StatusLevel::Active, "Unit is ready".to_string())]
    );
}

#[tokio::test]
async fn test_invalid_config_restarts_with_previous_config() {
    let harness = Harness::new();
    installed(&harness).await;
    let previous = harness.fake.file(CONFIG_FILE);

    let outcome = harness
        .machine(MoverConfig::new(APPLIANCE_IP, "", ""))
        .handle(LifecycleEvent::ConfigChanged)
        .await
        .unwrap();

    assert!(!outcome.result.ok);
    assert_eq!(outcome.result.message, NO_SHARES_MESSAGE);
    assert_eq!(outcome.state, LifecycleState::Installed);
    assert!(harness.store.flag(INSTALLED_FLAG).await.unwrap());

    assert_eq!(harness.fake.count("start"), 1);
    assert_eq!(harness.fake.count("write_file"), 0);
    assert_eq!(harness.fake.file(CONFIG_FILE), previous);
    assert_eq!(
        harness.fake.reports(),
        vec![(StatusLevel::Blocked, NO_SHARES_MESSAGE.to_string())]
    );
}

#[tokio::test]
async fn test_invalid_config_holds_service() {
    let harness = Harness::with_settings(AgentSettings {
        reconcile_policy: ReconcilePolicy::HoldOnInvalid,
        ..test_settings()
    });
    installed(&harness).await;
    harness.fake.with(|s| s.mount_ok = false);

    let outcome = harness
        .machine(valid_config())
        .handle(LifecycleEvent::ConfigChanged)
        .await
        .unwrap();

    assert_eq!(outcome.result.message, MOUNT_FAILED_MESSAGE);
    assert_eq!(outcome.state, LifecycleState::Installed);
    assert_eq!(harness.fake.count("stop"), 1);
    assert_eq!(harness.fake.count("start"), 0);
    assert_eq!(harness.fake.blocked_reports(), vec![MOUNT_FAILED_MESSAGE]);
}

#[tokio::test]
async fn test_start_failure_after_valid_config() {
    let harness = Harness::new();
    installed(&harness).await;
    harness.fake.fail("start");

    let outcome = harness
        .machine(valid_config())
        .handle(LifecycleEvent::ConfigChanged)
        .await
        .unwrap();

    assert!(!outcome.result.ok);
    assert_eq!(outcome.result.step.as_deref(), Some("start_service"));
    assert_eq!(outcome.state, LifecycleState::Installed);
    assert_eq!(harness.fake.blocked_reports().len(), 1);
    assert!(harness.fake.reports().iter().all(|(level, _)| *level != StatusLevel::Active));
}

#[tokio::test]
async fn test_stop_failure_does_not_abort_reconcile() {
    let harness = Harness::new();
    installed(&harness).await;
    harness.fake.fail("stop");

    let outcome = harness
        .machine(valid_config())
        .handle(LifecycleEvent::ConfigChanged)
        .await
        .unwrap();

    assert!(outcome.result.ok, "{}", outcome.result);
    assert_eq!(harness.fake.count("start"), 1);
}
