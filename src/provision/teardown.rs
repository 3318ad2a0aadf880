//! Teardown pipeline

use crate::{
    core::{Pipeline, StatusLevel, StepResult},
    host::HostError,
    persistence::PROVISIONED_VERSION_KEY,
    provision::Provisioner,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Status reported once the mover has been removed
pub const UNINSTALLED_MESSAGE: &str = "TrilioVault DataMover uninstalled";

impl Provisioner {
    /// Build the teardown pipeline
    ///
    /// Every step tolerates work already undone by an earlier attempt, so a
    /// failed teardown can simply be run again.
    pub fn teardown_pipeline(&self) -> Pipeline<'_> {
        Pipeline::new("teardown")
            .step("stop_service", move |_| async move { self.stop_service().await })
            .step("remove_unit", move |_| async move { self.remove_unit().await })
            .step("remove_virtenv", move |_| async move { self.remove_virtenv().await })
            .step("remove_files", move |_| async move { self.remove_files().await })
            .step("wait_object_store", move |_| async move {
                self.wait_object_store().await
            })
            .step("unmount_data", move |_| async move { self.unmount_data().await })
            .step("purge_package", move |_| async move { self.purge_package().await })
            .step("forget_version", move |_| async move { self.forget_version().await })
            .with_success_status(StatusLevel::Maintenance, UNINSTALLED_MESSAGE)
    }

    /// Stop and disable the mover service if its unit is still present
    pub async fn stop_service(&self) -> StepResult {
        let settings = &self.settings;
        if !self.host.fs.exists(&settings.unit_file).await {
            info!("{} is absent, nothing to stop", settings.unit_file.display());
            return StepResult::success();
        }

        let name = &settings.service_name;
        let services = &self.host.services;
        if let Err(e) = services.stop(name).await {
            return StepResult::from_error(&format!("Failed to stop {}", name), e);
        }
        if let Err(e) = services.disable(name).await {
            return StepResult::from_error(&format!("Failed to disable {}", name), e);
        }
        StepResult::success()
    }

    /// Remove the unit file and reload the service manager
    pub async fn remove_unit(&self) -> StepResult {
        if let Err(e) = self.host.fs.remove_file(&self.settings.unit_file).await {
            return StepResult::from_error("Failed to remove the service file", e);
        }
        match self.host.services.daemon_reload().await {
            Ok(()) => StepResult::success(),
            Err(e) => StepResult::from_error("Failed to reload service units", e),
        }
    }

    pub async fn remove_virtenv(&self) -> StepResult {
        match self.host.fs.remove_tree(&self.settings.virtenv_dir).await {
            Ok(()) => StepResult::success(),
            Err(e) => StepResult::from_error("Failed to remove the virtual environment", e),
        }
    }

    /// Remove the log rotation policy, configuration file and log file
    pub async fn remove_files(&self) -> StepResult {
        let settings = &self.settings;
        for path in [
            &settings.logrotate_file,
            &settings.config_file,
            &settings.log_file,
        ] {
            if let Err(e) = self.host.fs.remove_file(path).await {
                return StepResult::from_error("Failed to remove mover files", e);
            }
        }
        StepResult::success()
    }

    /// Give the object store service a bounded time to stop
    ///
    /// The data mounts cannot be released while it is running.
    pub async fn wait_object_store(&self) -> StepResult {
        let settings = &self.settings;
        let name = &settings.object_store_service;
        let interval = Duration::from_secs(settings.object_store_wait_interval_secs);

        for attempt in 1..=settings.object_store_wait_retries {
            if !self.host.services.is_running(name).await {
                return StepResult::success();
            }
            info!(
                "Waiting for {} to stop ({}/{})",
                name, attempt, settings.object_store_wait_retries
            );
            tokio::time::sleep(interval).await;
        }

        if self.host.services.is_running(name).await {
            let waited = settings.object_store_wait_interval_secs
                * u64::from(settings.object_store_wait_retries);
            warn!("{} is still running", name);
            return StepResult::from_error(
                &format!("{} did not stop", name),
                HostError::TimeoutExceeded(waited),
            );
        }
        StepResult::success()
    }

    /// Unmount everything mounted below the data directory, deepest first
    pub async fn unmount_data(&self) -> StepResult {
        let data_dir = &self.settings.data_dir;
        let mounts = match self.host.fs.list_mounts().await {
            Ok(mounts) => mounts,
            Err(e) => return StepResult::from_error("Failed to list mounts", e),
        };

        let mut targets: Vec<PathBuf> = mounts
            .into_iter()
            .map(|(mount_point, _)| mount_point)
            .filter(|mount_point| mount_point.starts_with(data_dir))
            .collect();
        targets.sort_by(|a, b| {
            b.components()
                .count()
                .cmp(&a.components().count())
                .then_with(|| a.cmp(b))
        });
        targets.dedup();

        for mount_point in &targets {
            info!("Unmounting {}", mount_point.display());
            if let Err(e) = self.host.fs.unmount(mount_point).await {
                return StepResult::from_error("Failed to release the data mounts", e);
            }
        }
        StepResult::success_with(format!("{} mounts released", targets.len()))
    }

    /// Purge the mover package, skipping it when a failed install never got that far
    pub async fn purge_package(&self) -> StepResult {
        let package = self.settings.package_name.as_str();
        match self.host.packages.missing(&[package]).await {
            Ok(missing) if !missing.is_empty() => {
                info!("{} is not installed, nothing to purge", package);
                return StepResult::success_with(format!("{} is not installed", package));
            }
            Ok(_) => {}
            Err(e) => return StepResult::from_error("Failed to query installed packages", e),
        }
        match self.host.packages.purge(&[package]).await {
            Ok(()) => StepResult::success(),
            Err(e) => StepResult::from_error(&format!("Failed to purge {}", package), e),
        }
    }

    /// Drop the recorded provisioned version so the next install starts clean
    pub async fn forget_version(&self) -> StepResult {
        match self.store.set_value(PROVISIONED_VERSION_KEY, None).await {
            Ok(()) => StepResult::success(),
            Err(e) => StepResult::from_error("Failed to clear the provisioned version", e),
        }
    }
}
