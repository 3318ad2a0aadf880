//! systemd service control

use crate::host::{CommandRunner, HostError, ServiceControl};
use async_trait::async_trait;
use std::sync::Arc;

/// Service control through `systemctl`
pub struct SystemdServiceControl {
    commands: Arc<dyn CommandRunner>,
}

impl SystemdServiceControl {
    pub fn new(commands: Arc<dyn CommandRunner>) -> Self {
        Self { commands }
    }

    async fn systemctl(&self, verb: &str, name: Option<&str>) -> Result<(), HostError> {
        let mut argv = vec![verb.to_string()];
        argv.extend(name.map(str::to_string));
        self.commands.output("systemctl", &argv).await?;
        Ok(())
    }
}

#[async_trait]
impl ServiceControl for SystemdServiceControl {
    async fn start(&self, name: &str) -> Result<(), HostError> {
        self.systemctl("start", Some(name)).await
    }

    async fn stop(&self, name: &str) -> Result<(), HostError> {
        self.systemctl("stop", Some(name)).await
    }

    async fn restart(&self, name: &str) -> Result<(), HostError> {
        self.systemctl("restart", Some(name)).await
    }

    async fn is_running(&self, name: &str) -> bool {
        let argv = vec!["is-active".to_string(), "--quiet".to_string(), name.to_string()];
        self.commands.output("systemctl", &argv).await.is_ok()
    }

    async fn enable(&self, name: &str) -> Result<(), HostError> {
        self.systemctl("enable", Some(name)).await
    }

    async fn disable(&self, name: &str) -> Result<(), HostError> {
        self.systemctl("disable", Some(name)).await
    }

    async fn daemon_reload(&self) -> Result<(), HostError> {
        self.systemctl("daemon-reload", None).await
    }
}
