//! Lifecycle state models

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Flag set by the event framework once the mover is installed
pub const INSTALLED_FLAG: &str = "tvault-contego.installed";

/// Flag set by the event framework while the mover is being torn down
pub const STOPPING_FLAG: &str = "tvault-contego.stopping";

/// Lifecycle state of the mover on this unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleState {
    /// Nothing is installed (initial state)
    Uninstalled,
    /// The install pipeline is running
    ///
    /// Transient: it shows up in an outcome's path but never in the flags
    /// or in a run's before and after states.
    Installing,
    /// The mover is installed and its service configured
    Installed,
    /// A stop was requested and teardown has not yet succeeded
    Stopping,
}

impl LifecycleState {
    /// Rebuild the state from the persisted markers
    ///
    /// `Stopping` wins over `Installed`: the installed marker is only cleared
    /// once teardown has completed.
    pub fn from_flags(installed: bool, stopping: bool) -> Self {
        match (installed, stopping) {
            (_, true) => LifecycleState::Stopping,
            (true, false) => LifecycleState::Installed,
            (false, false) => LifecycleState::Uninstalled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Uninstalled => "uninstalled",
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uninstalled" => Ok(LifecycleState::Uninstalled),
            "installing" => Ok(LifecycleState::Installing),
            "installed" => Ok(LifecycleState::Installed),
            "stopping" => Ok(LifecycleState::Stopping),
            other => anyhow::bail!("Unknown lifecycle state: {}", other),
        }
    }
}

/// Lifecycle events delivered by the event framework
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleEvent {
    InstallRequested,
    ConfigChanged,
    StopRequested,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::InstallRequested => "install-requested",
            LifecycleEvent::ConfigChanged => "config-changed",
            LifecycleEvent::StopRequested => "stop-requested",
        }
    }
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleEvent {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "install-requested" | "install" => Ok(LifecycleEvent::InstallRequested),
            "config-changed" => Ok(LifecycleEvent::ConfigChanged),
            "stop-requested" | "stop" => Ok(LifecycleEvent::StopRequested),
            other => anyhow::bail!("Unknown lifecycle event: {}", other),
        }
    }
}

/// Severity of a workload status report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Maintenance,
    Blocked,
    Active,
}

impl StatusLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusLevel::Maintenance => "maintenance",
            StatusLevel::Blocked => "blocked",
            StatusLevel::Active => "active",
        }
    }
}

impl std::fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
