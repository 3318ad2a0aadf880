//! Agent settings and mover configuration

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Mover configuration supplied by the operator
///
/// Re-read from the configuration source on every lifecycle event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MoverConfig {
    /// Address of the TrilioVault appliance
    #[serde(default)]
    pub triliovault_ip: String,

    /// NFS export used as the backup target
    #[serde(default)]
    pub nfs_shares: String,

    /// Mount options for the NFS export
    #[serde(default)]
    pub nfs_options: String,
}

impl MoverConfig {
    pub fn new(
        triliovault_ip: impl Into<String>,
        nfs_shares: impl Into<String>,
        nfs_options: impl Into<String>,
    ) -> Self {
        Self {
            triliovault_ip: triliovault_ip.into(),
            nfs_shares: nfs_shares.into(),
            nfs_options: nfs_options.into(),
        }
    }

    /// Load mover configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read mover config {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse mover configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: MoverConfig = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Build from the JSON document printed by `config-get --format=json`
    ///
    /// Unset options come back as `null` and non-string options are rendered
    /// as their JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let values: HashMap<String, serde_json::Value> =
            serde_json::from_str(json).context("Failed to parse charm configuration")?;

        let lookup = |key: &str| match values.get(key) {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        Ok(Self {
            triliovault_ip: lookup("triliovault-ip"),
            nfs_shares: lookup("nfs-shares"),
            nfs_options: lookup("nfs-options"),
        })
    }
}

/// Read-only source of mover configuration
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Read the current configuration
    async fn load(&self) -> Result<MoverConfig>;
}

/// Mover configuration read from a YAML file on every event
#[derive(Debug, Clone)]
pub struct YamlConfigSource {
    path: PathBuf,
}

impl YamlConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigSource for YamlConfigSource {
    async fn load(&self) -> Result<MoverConfig> {
        MoverConfig::from_file(&self.path)
    }
}

/// Fixed mover configuration (embedding and tests)
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    config: MoverConfig,
}

impl StaticConfigSource {
    pub fn new(config: MoverConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn load(&self) -> Result<MoverConfig> {
        Ok(self.config.clone())
    }
}

/// What the reconciler does with the service after NFS re-validation fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconcilePolicy {
    /// Restart the service regardless of the validation outcome
    #[default]
    AlwaysRestart,
    /// Leave the service stopped until a valid configuration arrives
    HoldOnInvalid,
}

/// Agent settings: names, ports and paths of everything the agent manages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// System service running the mover
    pub service_name: String,
    /// Package providing the mover
    pub package_name: String,
    /// Service that must stop before the data mounts are released
    pub object_store_service: String,
    /// Compute service the mover unit is ordered after
    pub compute_service: String,
    /// Runtime user of the mover
    pub user: String,
    /// Runtime group of the mover
    pub group: String,
    /// Port probed on the appliance to check reachability
    pub control_port: u16,
    /// Port of the appliance package endpoint
    pub package_port: u16,
    /// Port of the appliance apt repository
    pub repository_port: u16,
    /// Reachability probe timeout in seconds
    pub probe_timeout_secs: u64,
    /// Home of the runtime user; the virtualenv archive is unpacked here
    pub home_dir: PathBuf,
    /// Virtualenv created by the archive
    pub virtenv_dir: PathBuf,
    /// Archive path below `/packages/` on the package endpoint
    pub virtenv_archive: String,
    /// Interpreter used to run the discovery helpers
    pub python: PathBuf,
    /// Directory holding the charm payload (`files/trilio/...`)
    pub charm_dir: PathBuf,
    /// Configuration directory of the mover
    pub config_dir: PathBuf,
    /// Rendered configuration file
    pub config_file: PathBuf,
    /// Mount point for the backup target
    pub data_dir: PathBuf,
    /// Legacy data directory, recreated on every install
    pub legacy_data_dir: PathBuf,
    /// Log directory of the mover
    pub log_dir: PathBuf,
    /// Log file of the mover
    pub log_file: PathBuf,
    /// Mover binary that must exist after the package install
    pub binary: PathBuf,
    /// Rendered systemd unit
    pub unit_file: PathBuf,
    /// Installed logrotate policy
    pub logrotate_file: PathBuf,
    /// Passwordless sudo grant for the runtime user
    pub sudoers_file: PathBuf,
    /// Drop-in sudoers directory
    pub sudoers_dir: PathBuf,
    /// Nova rootwrap filter directory
    pub rootwrap_dir: PathBuf,
    /// Extra nova configuration directory, passed to the mover when present
    pub nova_conf_dir: PathBuf,
    /// How many times to poll the object store service during teardown
    pub object_store_wait_retries: u32,
    /// Seconds between object store polls
    pub object_store_wait_interval_secs: u64,
    /// Behaviour of the reconciler after a failed validation
    pub reconcile_policy: ReconcilePolicy,
    /// State database; defaults to the user data directory
    pub state_db: Option<PathBuf>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            service_name: "tvault-contego".to_string(),
            package_name: "tvault-contego".to_string(),
            object_store_service: "tvault-object-store".to_string(),
            compute_service: "openstack-nova-compute.service".to_string(),
            user: "nova".to_string(),
            group: "nova".to_string(),
            control_port: 8781,
            package_port: 8081,
            repository_port: 8085,
            probe_timeout_secs: 1,
            home_dir: PathBuf::from("/home/tvault"),
            virtenv_dir: PathBuf::from("/home/tvault/.virtenv"),
            virtenv_archive: "queens_ubuntu/tvault-contego-virtenv.tar.gz".to_string(),
            python: PathBuf::from("/usr/bin/python"),
            charm_dir: std::env::var_os("CHARM_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            config_dir: PathBuf::from("/etc/tvault-contego"),
            config_file: PathBuf::from("/etc/tvault-contego/tvault-contego.conf"),
            data_dir: PathBuf::from("/var/triliovault-mounts"),
            legacy_data_dir: PathBuf::from("/var/triliovault"),
            log_dir: PathBuf::from("/var/log/nova"),
            log_file: PathBuf::from("/var/log/nova/tvault-contego.log"),
            binary: PathBuf::from("/usr/bin/tvault-contego"),
            unit_file: PathBuf::from("/etc/systemd/system/tvault-contego.service"),
            logrotate_file: PathBuf::from("/etc/logrotate.d/tvault-contego"),
            sudoers_file: PathBuf::from("/etc/sudoers.d/tvault-nova"),
            sudoers_dir: PathBuf::from("/etc/sudoers.d"),
            rootwrap_dir: PathBuf::from("/etc/nova/rootwrap.d"),
            nova_conf_dir: PathBuf::from("/etc/nova/nova.conf.d"),
            object_store_wait_retries: 3,
            object_store_wait_interval_secs: 5,
            reconcile_policy: ReconcilePolicy::AlwaysRestart,
            state_db: None,
        }
    }
}

impl AgentSettings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse settings from a YAML string; unset keys keep their defaults
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: AgentSettings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("service_name", &self.service_name),
            ("package_name", &self.package_name),
            ("user", &self.user),
            ("group", &self.group),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("Setting '{}' must not be empty", key);
            }
        }

        for (key, port) in [
            ("control_port", self.control_port),
            ("package_port", self.package_port),
            ("repository_port", self.repository_port),
        ] {
            if port == 0 {
                anyhow::bail!("Setting '{}' must be a non-zero port", key);
            }
        }

        for (key, path) in [
            ("home_dir", &self.home_dir),
            ("virtenv_dir", &self.virtenv_dir),
            ("config_file", &self.config_file),
            ("data_dir", &self.data_dir),
            ("legacy_data_dir", &self.legacy_data_dir),
            ("log_file", &self.log_file),
            ("unit_file", &self.unit_file),
        ] {
            if !path.is_absolute() {
                anyhow::bail!("Setting '{}' must be an absolute path: {}", key, path.display());
            }
        }

        Ok(())
    }

    /// Resolve the state database path
    pub fn state_db_path(&self) -> PathBuf {
        self.state_db.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("datamover-agent")
                .join("state.db")
        })
    }

    /// Path of a file shipped in the charm payload
    pub fn charm_file(&self, name: &str) -> PathBuf {
        self.charm_dir.join("files").join("trilio").join(name)
    }
}
