//! apt-based package manager

use crate::host::{CommandRunner, HostError, PackageManager};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Package manager backed by apt and dpkg
pub struct AptPackageManager {
    commands: Arc<dyn CommandRunner>,
}

impl AptPackageManager {
    pub fn new(commands: Arc<dyn CommandRunner>) -> Self {
        Self { commands }
    }

    /// Run apt-get non-interactively, keeping existing config files
    async fn apt_get(
        &self,
        extra: &[&str],
        command: &str,
        names: &[&str],
    ) -> Result<(), HostError> {
        let mut argv = vec![
            "DEBIAN_FRONTEND=noninteractive".to_string(),
            "apt-get".to_string(),
            "--assume-yes".to_string(),
            "--option=Dpkg::Options::=--force-confold".to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        argv.push(command.to_string());
        argv.extend(names.iter().map(|s| s.to_string()));

        self.commands
            .output("env", &argv)
            .await
            .map_err(|e| HostError::Packaging(format!("apt-get {} failed: {}", command, e)))?;
        Ok(())
    }
}

#[async_trait]
impl PackageManager for AptPackageManager {
    async fn install(&self, names: &[&str], options: &[&str]) -> Result<(), HostError> {
        info!("Installing packages: {}", names.join(" "));
        self.apt_get(options, "install", names).await
    }

    async fn purge(&self, names: &[&str]) -> Result<(), HostError> {
        info!("Purging packages: {}", names.join(" "));
        self.apt_get(&[], "purge", names).await
    }

    async fn add_repository(&self, source: &str) -> Result<(), HostError> {
        info!("Adding package source: {}", source);
        self.commands
            .output("add-apt-repository", &["--yes".to_string(), source.to_string()])
            .await
            .map_err(|e| HostError::Packaging(format!("add-apt-repository failed: {}", e)))?;
        Ok(())
    }

    async fn update(&self) -> Result<(), HostError> {
        self.apt_get(&[], "update", &[]).await
    }

    async fn missing(&self, names: &[&str]) -> Result<Vec<String>, HostError> {
        let mut missing = Vec::new();
        for name in names {
            let argv = vec!["-W".to_string(), "-f=${Status}".to_string(), name.to_string()];
            let installed = match self.commands.output("dpkg-query", &argv).await {
                Ok(status) => is_installed_status(&status),
                Err(e) => {
                    debug!("dpkg-query {}: {}", name, e);
                    false
                }
            };
            if !installed {
                missing.push(name.to_string());
            }
        }
        Ok(missing)
    }
}

/// Whether a dpkg `${Status}` line describes an installed package
fn is_installed_status(status: &str) -> bool {
    status.trim() == "install ok installed"
}
