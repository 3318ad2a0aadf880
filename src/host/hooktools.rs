//! Event framework hook tools

use crate::core::{ConfigSource, MoverConfig, StatusLevel};
use crate::host::{CommandRunner, StatusChannel};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Environment variable present when running inside a hook
pub const HOOK_ENV_VAR: &str = "JUJU_UNIT_NAME";

/// Whether the agent runs inside a hook context
pub fn in_hook_context() -> bool {
    std::env::var_os(HOOK_ENV_VAR).is_some()
}

/// Status channel backed by `status-set` and `application-version-set`
pub struct HookStatusChannel {
    commands: Arc<dyn CommandRunner>,
}

impl HookStatusChannel {
    pub fn new(commands: Arc<dyn CommandRunner>) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl StatusChannel for HookStatusChannel {
    async fn report(&self, level: StatusLevel, message: &str) {
        info!("status: {} {}", level, message);
        let argv = vec![level.as_str().to_string(), message.to_string()];
        if let Err(e) = self.commands.output("status-set", &argv).await {
            warn!("Failed to set workload status: {}", e);
        }
    }

    async fn application_version(&self, version: &str) {
        let argv = vec![version.to_string()];
        if let Err(e) = self.commands.output("application-version-set", &argv).await {
            warn!("Failed to set application version: {}", e);
        }
    }
}

/// Status channel that only logs (outside a hook context)
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStatusChannel;

#[async_trait]
impl StatusChannel for LogStatusChannel {
    async fn report(&self, level: StatusLevel, message: &str) {
        match level {
            StatusLevel::Blocked => warn!("status: {} {}", level, message),
            _ => info!("status: {} {}", level, message),
        }
    }

    async fn application_version(&self, version: &str) {
        info!("application version: {}", version);
    }
}

/// Mover configuration read from `config-get`
pub struct HookConfigSource {
    commands: Arc<dyn CommandRunner>,
}

impl HookConfigSource {
    pub fn new(commands: Arc<dyn CommandRunner>) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl ConfigSource for HookConfigSource {
    async fn load(&self) -> Result<MoverConfig> {
        let json = self
            .commands
            .output("config-get", &["--format=json".to_string()])
            .await
            .context("Failed to read charm configuration")?;
        MoverConfig::from_json(&json)
    }
}
