//! Host collaborators
//!
//! Narrow interfaces to everything outside the agent: the file system, the
//! package manager, the service manager, the event framework's status
//! channel and the appliance's network endpoints. The provisioning code only
//! talks to these traits, so tests can substitute recording fakes.

pub mod apt;
pub mod command;
pub mod error;
pub mod fs;
pub mod hooktools;
pub mod network;
pub mod systemd;

use crate::core::StatusLevel;
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub use apt::AptPackageManager;
pub use command::{CommandRunner, SystemCommandRunner};
pub use error::HostError;
pub use fs::LocalFileSystem;
pub use hooktools::{HookConfigSource, HookStatusChannel, LogStatusChannel};
pub use network::{HttpPackageEndpoint, TcpProbe};
pub use systemd::SystemdServiceControl;

/// File-system operations
///
/// Creation operations tolerate existing targets and removal operations
/// tolerate missing ones, so every caller is safe to re-run.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Create a directory (and parents) owned by `owner:group`
    async fn mkdir(
        &self,
        path: &Path,
        owner: &str,
        group: &str,
        mode: u32,
    ) -> Result<(), HostError>;

    /// Write a file owned by `owner:group`, replacing any previous content
    async fn write_file(
        &self,
        path: &Path,
        content: &str,
        owner: &str,
        group: &str,
        mode: u32,
    ) -> Result<(), HostError>;

    /// Mount `device` at `path`; false when the mount fails
    async fn mount(&self, device: &str, path: &Path, fs_type: &str) -> bool;

    /// Unmount whatever is mounted at `path`
    async fn unmount(&self, path: &Path) -> Result<(), HostError>;

    /// Current mounts as (mount point, device)
    async fn list_mounts(&self) -> Result<Vec<(PathBuf, String)>, HostError>;

    /// Point `dst` at `src`, replacing an existing link
    async fn symlink(&self, src: &Path, dst: &Path) -> Result<(), HostError>;

    /// Copy a file; a directory `dst` receives the file under its own name
    async fn copy(&self, src: &Path, dst: &Path) -> Result<(), HostError>;

    /// Remove a directory tree
    async fn remove_tree(&self, path: &Path) -> Result<(), HostError>;

    /// Remove a single file
    async fn remove_file(&self, path: &Path) -> Result<(), HostError>;

    /// Whether `path` exists
    async fn exists(&self, path: &Path) -> bool;

    /// Change ownership of a tree
    async fn chown_recursive(&self, path: &Path, owner: &str, group: &str) -> Result<(), HostError>;

    /// Add a user to a supplementary group
    async fn add_user_to_group(&self, user: &str, group: &str) -> Result<(), HostError>;
}

/// Package manager operations
#[async_trait]
pub trait PackageManager: Send + Sync {
    async fn install(&self, names: &[&str], options: &[&str]) -> Result<(), HostError>;

    async fn purge(&self, names: &[&str]) -> Result<(), HostError>;

    async fn add_repository(&self, source: &str) -> Result<(), HostError>;

    async fn update(&self) -> Result<(), HostError>;

    /// The subset of `names` that is not installed
    async fn missing(&self, names: &[&str]) -> Result<Vec<String>, HostError>;
}

/// Service manager operations
#[async_trait]
pub trait ServiceControl: Send + Sync {
    async fn start(&self, name: &str) -> Result<(), HostError>;

    async fn stop(&self, name: &str) -> Result<(), HostError>;

    async fn restart(&self, name: &str) -> Result<(), HostError>;

    async fn is_running(&self, name: &str) -> bool;

    async fn enable(&self, name: &str) -> Result<(), HostError>;

    async fn disable(&self, name: &str) -> Result<(), HostError>;

    async fn daemon_reload(&self) -> Result<(), HostError>;
}

/// Workload status channel of the event framework (fire-and-forget)
#[async_trait]
pub trait StatusChannel: Send + Sync {
    async fn report(&self, level: StatusLevel, message: &str);

    /// Publish the version of the installed workload
    async fn application_version(&self, version: &str);
}

/// TCP reachability check
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn reachable(&self, ip: Ipv4Addr, port: u16, timeout: Duration) -> bool;
}

/// The appliance's package endpoint
#[async_trait]
pub trait PackageEndpoint: Send + Sync {
    /// Fetch the package index page
    async fn fetch_index(&self, url: &str) -> Result<String, HostError>;

    /// Download a gzip'd tarball and unpack it into `dest`
    async fn install_archive(&self, url: &str, dest: &Path) -> Result<(), HostError>;
}

/// All collaborators the provisioning code needs
#[derive(Clone)]
pub struct Host {
    pub fs: Arc<dyn FileSystem>,
    pub packages: Arc<dyn PackageManager>,
    pub services: Arc<dyn ServiceControl>,
    pub status: Arc<dyn StatusChannel>,
    pub probe: Arc<dyn ReachabilityProbe>,
    pub endpoint: Arc<dyn PackageEndpoint>,
    pub commands: Arc<dyn CommandRunner>,
}

impl Host {
    /// Collaborators backed by the local machine
    ///
    /// With `hook_tools` the status channel talks to the event framework;
    /// otherwise status reports only go to the log.
    pub fn system(hook_tools: bool) -> Self {
        let commands: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner::new());
        let status: Arc<dyn StatusChannel> = if hook_tools {
            Arc::new(HookStatusChannel::new(commands.clone()))
        } else {
            Arc::new(LogStatusChannel)
        };

        Self {
            fs: Arc::new(LocalFileSystem::new(commands.clone())),
            packages: Arc::new(AptPackageManager::new(commands.clone())),
            services: Arc::new(SystemdServiceControl::new(commands.clone())),
            status,
            probe: Arc::new(TcpProbe),
            endpoint: Arc::new(HttpPackageEndpoint::new()),
            commands,
        }
    }
}
