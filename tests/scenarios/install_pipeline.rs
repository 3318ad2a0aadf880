//! Test: Install pipeline - validation messages, provisioning and idempotency

use crate::helpers::*;
use datamover_agent::core::{
    LifecycleEvent, LifecycleState, PipelineContext, StatusLevel, ALREADY_PROVISIONED,
    INSTALLED_FLAG, LATEST_VERSION as LATEST_VERSION_KEY,
};
use datamover_agent::persistence::PROVISIONED_VERSION_KEY;
use datamover_agent::provision::install::{
    EMPTY_IP_MESSAGE, INVALID_IP_MESSAGE, MISSING_BINARY_MESSAGE, MOUNT_FAILED_MESSAGE,
    NO_SHARES_MESSAGE, UNREACHABLE_MESSAGE,
};
use datamover_agent::{MoverConfig, PersistenceBackend};

#[tokio::test]
async fn test_full_install() {
    let harness = Harness::new();
    let machine = harness.machine(valid_config());

    let outcome = machine.handle(LifecycleEvent::InstallRequested).await.unwrap();

    assert!(outcome.result.ok, "{}", outcome.result);
    assert_eq!(outcome.state, LifecycleState::Installed);
    assert!(harness.store.flag(INSTALLED_FLAG).await.unwrap());

    // Maintenance while working, then exactly one final status
    assert_eq!(
        harness.fake.reports(),
        vec![
            (StatusLevel::Maintenance, "Installing...".to_string()),
            (StatusLevel::Maintenance, "Starting".to_string()),
            (StatusLevel::Active, "Unit is ready".to_string()),
        ]
    );
    assert_eq!(harness.fake.with(|s| s.versions.clone()), vec![LATEST_VERSION]);
    assert_eq!(
        harness.store.value(PROVISIONED_VERSION_KEY).await.unwrap().as_deref(),
        Some(LATEST_VERSION)
    );
}

#[tokio::test]
async fn test_install_effects() {
    let harness = Harness::new();
    let machine = harness.machine(valid_config());
    machine.handle(LifecycleEvent::InstallRequested).await.unwrap();
    let fake = &harness.fake;

    // Appliance endpoints
    assert!(fake.calls().contains(&"probe 10.5.0.10:8781".to_string()));
    assert!(fake
        .calls()
        .contains(&"fetch_index http://10.5.0.10:8081/packages/".to_string()));
    assert!(fake.calls().contains(
        &"install_archive http://10.5.0.10:8081/packages/queens_ubuntu/tvault-contego-virtenv.tar.gz /home/tvault"
            .to_string()
    ));
    assert!(fake
        .calls()
        .contains(&"add_repository deb http://10.5.0.10:8085 deb-repo/".to_string()));
    assert!(fake
        .calls()
        .contains(&"install tvault-contego --allow-unauthenticated".to_string()));

    // NFS dry run leaves nothing mounted
    assert_eq!(fake.count("mount"), 1);
    assert_eq!(fake.count("unmount"), 1);
    assert!(fake.with(|s| s.mounts.is_empty()));

    // Users and groups
    assert_eq!(
        fake.file("/etc/sudoers.d/tvault-nova").as_deref(),
        Some("nova ALL=(ALL) NOPASSWD: ALL\n")
    );
    assert!(fake.calls().contains(&"add_user_to_group nova kvm".to_string()));
    assert!(fake.calls().contains(&"add_user_to_group nova disk".to_string()));
    assert!(fake.calls().contains(&"symlink /usr/lib /usr/lib64".to_string()));

    // Rendered files
    let conf = fake.file("/etc/tvault-contego/tvault-contego.conf").unwrap();
    assert!(conf.contains("vault_storage_nfs_export = 10.5.0.20:/srv/tvault\n"));
    assert!(conf.contains("vault_storage_nfs_options = nolock,soft\n"));
    let unit = fake.file("/etc/systemd/system/tvault-contego.service").unwrap();
    assert!(unit.contains(
        "ExecStart = /usr/bin/python /usr/bin/tvault-contego --config-file=/etc/nova/nova.conf --config-file=/etc/tvault-contego/tvault-contego.conf\n"
    ));

    // The service is started last
    let reload = fake.position("daemon_reload").unwrap();
    let enable = fake.position("enable tvault-contego").unwrap();
    let restart = fake.position("restart tvault-contego").unwrap();
    assert!(reload < enable && enable < restart);
    assert_eq!(fake.calls().last().map(String::as_str), Some("restart tvault-contego"));
}

#[tokio::test]
async fn test_validate_ip() {
    let harness = Harness::new();
    let provisioner = harness.provisioner();

    let result = provisioner.validate_ip("").await;
    assert!(!result.ok);
    assert_eq!(result.message, EMPTY_IP_MESSAGE);

    let result = provisioner.validate_ip("1.2.3.X").await;
    assert!(!result.ok);
    assert_eq!(result.message, INVALID_IP_MESSAGE);
    assert_eq!(harness.fake.count("probe"), 0);

    let result = provisioner.validate_ip("1.2.3.4").await;
    assert!(result.ok);
    assert_eq!(harness.fake.calls(), vec!["probe 1.2.3.4:8781"]);

    harness.fake.with(|s| s.reachable = false);
    let result = provisioner.validate_ip("1.2.3.4").await;
    assert!(!result.ok);
    assert_eq!(result.message, UNREACHABLE_MESSAGE);
}

#[tokio::test]
async fn test_unreachable_appliance_blocks_install() {
    let harness = Harness::new();
    harness.fake.with(|s| s.reachable = false);
    let machine = harness.machine(valid_config());

    let outcome = machine.handle(LifecycleEvent::InstallRequested).await.unwrap();

    assert!(!outcome.result.ok);
    assert_eq!(outcome.result.step.as_deref(), Some("validate_ip"));
    assert_eq!(outcome.state, LifecycleState::Uninstalled);
    assert_eq!(harness.fake.blocked_reports(), vec![UNREACHABLE_MESSAGE]);
    assert!(!harness.store.flag(INSTALLED_FLAG).await.unwrap());
}

#[tokio::test]
async fn test_validate_nfs_installs_missing_client() {
    let harness = Harness::new();
    harness.fake.with(|s| s.packages.clear());

    let result = harness.provisioner().validate_nfs(&valid_config()).await;

    assert!(result.ok, "{}", result);
    assert!(harness.fake.calls().contains(&"install nfs-common".to_string()));
}

#[tokio::test]
async fn test_validate_nfs_keeps_installed_client() {
    let harness = Harness::new();

    let result = harness.provisioner().validate_nfs(&valid_config()).await;

    assert!(result.ok);
    assert_eq!(harness.fake.count("install"), 0);
}

#[tokio::test]
async fn test_validate_nfs_failures() {
    let harness = Harness::new();
    let provisioner = harness.provisioner();

    let result = provisioner
        .validate_nfs(&MoverConfig::new(APPLIANCE_IP, "  ", ""))
        .await;
    assert_eq!(result.message, NO_SHARES_MESSAGE);
    assert_eq!(harness.fake.count("mount"), 0);

    harness.fake.with(|s| s.mount_ok = false);
    let result = provisioner.validate_nfs(&valid_config()).await;
    assert!(!result.ok);
    assert_eq!(result.message, MOUNT_FAILED_MESSAGE);
    assert_eq!(harness.fake.count("unmount"), 0);
}

#[tokio::test]
async fn test_missing_binary_stops_install() {
    let harness = Harness::new();
    harness.fake.with(|s| s.install_binaries = false);
    let machine = harness.machine(valid_config());

    let outcome = machine.handle(LifecycleEvent::InstallRequested).await.unwrap();

    assert_eq!(outcome.result.message, MISSING_BINARY_MESSAGE);
    assert_eq!(outcome.result.step.as_deref(), Some("ensure_files"));
    assert_eq!(harness.fake.count("write_file"), 2); // sudoers grant and log file
    assert!(harness.fake.file("/etc/tvault-contego/tvault-contego.conf").is_none());
}

#[tokio::test]
async fn test_second_install_skips_runtime_provisioning() {
    let harness = Harness::new();
    let provisioner = harness.provisioner();
    let runner = harness.runner();

    let first = provisioner.run_install(&runner, &valid_config()).await;
    assert!(first.ok, "{}", first);
    assert_eq!(harness.fake.count("install_archive"), 1);
    assert_eq!(harness.fake.count("add_repository"), 1);

    let second = provisioner.run_install(&runner, &valid_config()).await;
    assert!(second.ok, "{}", second);
    assert_eq!(harness.fake.count("install_archive"), 1);
    assert_eq!(harness.fake.count("add_repository"), 1);
    assert_eq!(harness.fake.count("restart"), 2);
}

#[tokio::test]
async fn test_resolve_version_shares_context() {
    let harness = Harness::new();
    let provisioner = harness.provisioner();
    let ctx = PipelineContext::new();

    let result = provisioner.resolve_version(&valid_config(), &ctx).await;
    assert!(result.ok, "{}", result);
    assert_eq!(ctx.get(LATEST_VERSION_KEY).as_deref(), Some(LATEST_VERSION));
    assert!(!ctx.flag(ALREADY_PROVISIONED));

    harness
        .store
        .set_value(PROVISIONED_VERSION_KEY, Some(LATEST_VERSION))
        .await
        .unwrap();
    let ctx = PipelineContext::new();

    let result = provisioner.resolve_version(&valid_config(), &ctx).await;
    assert!(result.ok, "{}", result);
    assert!(ctx.flag(ALREADY_PROVISIONED));
}

#[tokio::test]
async fn test_new_version_is_provisioned() {
    let harness = Harness::new();
    harness
        .store
        .set_value(PROVISIONED_VERSION_KEY, Some("4.1.9"))
        .await
        .unwrap();

    let result = harness
        .provisioner()
        .run_install(&harness.runner(), &valid_config())
        .await;

    assert!(result.ok);
    assert_eq!(harness.fake.count("install_archive"), 1);
    assert_eq!(
        harness.store.value(PROVISIONED_VERSION_KEY).await.unwrap().as_deref(),
        Some(LATEST_VERSION)
    );
}

#[tokio::test]
async fn test_retry_after_partial_failure() {
    let harness = Harness::new();
    harness.fake.fail("restart");
    let machine = harness.machine(valid_config());

    let outcome = machine.handle(LifecycleEvent::InstallRequested).await.unwrap();
    assert!(!outcome.result.ok);
    assert_eq!(outcome.result.step.as_deref(), Some("start_service"));
    assert_eq!(outcome.state, LifecycleState::Uninstalled);

    harness.fake.recover("restart");
    let outcome = machine.handle(LifecycleEvent::InstallRequested).await.unwrap();
    assert!(outcome.result.ok, "{}", outcome.result);
    assert_eq!(outcome.state, LifecycleState::Installed);
    assert_eq!(harness.fake.count("install_archive"), 1);
}

#[tokio::test]
async fn test_index_without_package_fails_resolution() {
    let harness = Harness::new();
    harness.fake.with(|s| s.index = "<html></html>".to_string());
    let machine = harness.machine(valid_config());

    let outcome = machine.handle(LifecycleEvent::InstallRequested).await.unwrap();

    assert_eq!(outcome.result.step.as_deref(), Some("resolve_version"));
    assert_eq!(harness.fake.count("install_archive"), 0);
    assert!(harness.fake.with(|s| s.versions.is_empty()));
}
