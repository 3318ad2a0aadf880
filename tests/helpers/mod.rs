//! Test utilities: a recording fake for every host collaborator

#![allow(dead_code)]

use async_trait::async_trait;
use datamover_agent::core::config::StaticConfigSource;
use datamover_agent::host::{
    CommandRunner, FileSystem, PackageEndpoint, PackageManager, ReachabilityProbe, ServiceControl,
    StatusChannel,
};
use datamover_agent::{
    AgentSettings, Host, HostError, InMemoryPersistence, LifecycleMachine, MoverConfig,
    PersistenceBackend, PipelineRunner, Provisioner, StatusLevel,
};
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const APPLIANCE_IP: &str = "10.5.0.10";
pub const NFS_SHARE: &str = "10.5.0.20:/srv/tvault";
pub const LATEST_VERSION: &str = "4.1.94";

pub const PACKAGE_INDEX: &str = r#"<html><body>
<a href="queens_ubuntu/">queens_ubuntu/</a>
<a href="tvault-contego-4.1.9/">tvault-contego-4.1.9/</a>
<a href="tvault-contego-4.1.94/">tvault-contego-4.1.94/</a>
</body></html>"#;

pub const HOST_LIBRARIES: &str = "\
/usr/lib/python2.7/dist-packages/cryptography
/usr/lib/python2.7/dist-packages/libvirtmod.so
/usr/lib/python2.7/dist-packages/cffi
/usr/lib/python2.7/dist-packages/_cffi_backend.so
";

pub const NOVA_ARGS: &str = "--config-file=/etc/nova/nova.conf\n";

/// Mutable state of the fake host
#[derive(Debug)]
pub struct FakeState {
    /// Every operation, in order, as "<op> <args>"
    pub calls: Vec<String>,
    /// Status reports
    pub reports: Vec<(StatusLevel, String)>,
    /// Published application versions
    pub versions: Vec<String>,
    /// Paths that exist
    pub existing: HashSet<PathBuf>,
    /// Written file contents
    pub files: HashMap<PathBuf, String>,
    /// Current mounts (mount point, device)
    pub mounts: Vec<(PathBuf, String)>,
    /// Installed packages
    pub packages: HashSet<String>,
    /// Running services
    pub running: HashSet<String>,
    /// Whether the appliance answers the probe
    pub reachable: bool,
    /// Whether mounting succeeds
    pub mount_ok: bool,
    /// Whether installing a package drops its binary into /usr/bin
    pub install_binaries: bool,
    /// Package index served by the endpoint
    pub index: String,
    /// Operations that fail (matched against the op name)
    pub failing: HashSet<String>,
    /// How many more polls report the object store as running
    pub object_store_polls: usize,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            reports: Vec::new(),
            versions: Vec::new(),
            existing: HashSet::new(),
            files: HashMap::new(),
            mounts: Vec::new(),
            packages: ["nfs-common".to_string()].into_iter().collect(),
            running: HashSet::new(),
            reachable: true,
            mount_ok: true,
            install_binaries: true,
            index: PACKAGE_INDEX.to_string(),
            failing: HashSet::new(),
            object_store_polls: 0,
        }
    }
}

/// Recording fake implementing every host collaborator
#[derive(Default)]
pub struct FakeHost {
    pub state: Mutex<FakeState>,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mutate the fake's state
    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// Make every later call of `op` fail
    pub fn fail(&self, op: &str) {
        self.with(|s| s.failing.insert(op.to_string()));
    }

    /// Undo [`FakeHost::fail`]
    pub fn recover(&self, op: &str) {
        self.with(|s| s.failing.remove(op));
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    /// Number of calls of operation `op`
    pub fn count(&self, op: &str) -> usize {
        self.with(|s| s.calls.iter().filter(|c| c.split(' ').next() == Some(op)).count())
    }

    /// Position of the first call starting with `prefix`
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.with(|s| s.calls.iter().position(|c| c.starts_with(prefix)))
    }

    pub fn reports(&self) -> Vec<(StatusLevel, String)> {
        self.with(|s| s.reports.clone())
    }

    pub fn blocked_reports(&self) -> Vec<String> {
        self.reports()
            .into_iter()
            .filter(|(level, _)| *level == StatusLevel::Blocked)
            .map(|(_, message)| message)
            .collect()
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<String> {
        self.with(|s| s.files.get(path.as_ref()).cloned())
    }

    pub fn exists_now(&self, path: impl AsRef<Path>) -> bool {
        self.with(|s| s.existing.contains(path.as_ref()))
    }

    pub fn touch(&self, path: impl Into<PathBuf>) {
        self.with(|s| s.existing.insert(path.into()));
    }

    pub fn clear_calls(&self) {
        self.with(|s| {
            s.calls.clear();
            s.reports.clear();
            s.versions.clear();
        });
    }

    fn record(&self, op: &str, detail: String) -> Result<(), HostError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("{} {}", op, detail).trim_end().to_string());
        if state.failing.contains(op) {
            return Err(HostError::Filesystem(format!("{} failed", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl FileSystem for FakeHost {
    async fn mkdir(
        &self,
        path: &Path,
        owner: &str,
        group: &str,
        mode: u32,
    ) -> Result<(), HostError> {
        self.record("mkdir", format!("{} {}:{} {:o}", path.display(), owner, group, mode))?;
        self.touch(path);
        Ok(())
    }

    async fn write_file(
        &self,
        path: &Path,
        content: &str,
        owner: &str,
        group: &str,
        mode: u32,
    ) -> Result<(), HostError> {
        self.record("write_file", format!("{} {}:{} {:o}", path.display(), owner, group, mode))?;
        self.with(|s| {
            s.existing.insert(path.to_path_buf());
            s.files.insert(path.to_path_buf(), content.to_string());
        });
        Ok(())
    }

    async fn mount(&self, device: &str, path: &Path, fs_type: &str) -> bool {
        if self
            .record("mount", format!("{} {} {}", device, path.display(), fs_type))
            .is_err()
        {
            return false;
        }
        self.with(|s| {
            if s.mount_ok {
                s.mounts.push((path.to_path_buf(), device.to_string()));
            }
            s.mount_ok
        })
    }

    async fn unmount(&self, path: &Path) -> Result<(), HostError> {
        self.record("unmount", path.display().to_string())?;
        self.with(|s| {
            if let Some(index) = s.mounts.iter().rposition(|(p, _)| p == path) {
                s.mounts.remove(index);
            }
        });
        Ok(())
    }

    async fn list_mounts(&self) -> Result<Vec<(PathBuf, String)>, HostError> {
        self.record("list_mounts", String::new())?;
        Ok(self.with(|s| s.mounts.clone()))
    }

    async fn symlink(&self, src: &Path, dst: &Path) -> Result<(), HostError> {
        self.record("symlink", format!("{} {}", src.display(), dst.display()))?;
        self.touch(dst);
        Ok(())
    }

    async fn copy(&self, src: &Path, dst: &Path) -> Result<(), HostError> {
        self.record("copy", format!("{} {}", src.display(), dst.display()))?;
        self.touch(dst);
        Ok(())
    }

    async fn remove_tree(&self, path: &Path) -> Result<(), HostError> {
        self.record("remove_tree", path.display().to_string())?;
        self.with(|s| s.existing.retain(|p| !p.starts_with(path)));
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> Result<(), HostError> {
        self.record("remove_file", path.display().to_string())?;
        self.with(|s| {
            s.existing.remove(path);
            s.files.remove(path);
        });
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        self.exists_now(path)
    }

    async fn chown_recursive(
        &self,
        path: &Path,
        owner: &str,
        group: &str,
    ) -> Result<(), HostError> {
        self.record("chown_recursive", format!("{} {}:{}", path.display(), owner, group))
    }

    async fn add_user_to_group(&self, user: &str, group: &str) -> Result<(), HostError> {
        self.record("add_user_to_group", format!("{} {}", user, group))
    }
}

#[async_trait]
impl PackageManager for FakeHost {
    async fn install(&self, names: &[&str], options: &[&str]) -> Result<(), HostError> {
        self.record("install", format!("{} {}", names.join(" "), options.join(" ")))?;
        self.with(|s| {
            for name in names {
                s.packages.insert(name.to_string());
                if s.install_binaries {
                    s.existing.insert(Path::new("/usr/bin").join(name));
                }
            }
        });
        Ok(())
    }

    async fn purge(&self, names: &[&str]) -> Result<(), HostError> {
        self.record("purge", names.join(" "))?;
        self.with(|s| {
            if let Some(unknown) = names.iter().find(|name| !s.packages.contains(**name)) {
                return Err(HostError::Packaging(format!(
                    "E: Unable to locate package {}",
                    unknown
                )));
            }
            for name in names {
                s.packages.remove(*name);
                s.existing.remove(&Path::new("/usr/bin").join(name));
            }
            Ok(())
        })
    }

    async fn add_repository(&self, source: &str) -> Result<(), HostError> {
        self.record("add_repository", source.to_string())
    }

    async fn update(&self) -> Result<(), HostError> {
        self.record("update", String::new())
    }

    async fn missing(&self, names: &[&str]) -> Result<Vec<String>, HostError> {
        self.record("missing", names.join(" "))?;
        Ok(self.with(|s| {
            names
                .iter()
                .filter(|name| !s.packages.contains(**name))
                .map(|name| name.to_string())
                .collect()
        }))
    }
}

#[async_trait]
impl ServiceControl for FakeHost {
    async fn start(&self, name: &str) -> Result<(), HostError> {
        self.record("start", name.to_string())?;
        self.with(|s| s.running.insert(name.to_string()));
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), HostError> {
        self.record("stop", name.to_string())?;
        self.with(|s| s.running.remove(name));
        Ok(())
    }

    async fn restart(&self, name: &str) -> Result<(), HostError> {
        self.record("restart", name.to_string())?;
        self.with(|s| s.running.insert(name.to_string()));
        Ok(())
    }

    async fn is_running(&self, name: &str) -> bool {
        let _ = self.record("is_running", name.to_string());
        self.with(|s| {
            if name == "tvault-object-store" {
                if s.object_store_polls == 0 {
                    return false;
                }
                s.object_store_polls -= 1;
                return true;
            }
            s.running.contains(name)
        })
    }

    async fn enable(&self, name: &str) -> Result<(), HostError> {
        self.record("enable", name.to_string())
    }

    async fn disable(&self, name: &str) -> Result<(), HostError> {
        self.record("disable", name.to_string())
    }

    async fn daemon_reload(&self) -> Result<(), HostError> {
        self.record("daemon_reload", String::new())
    }
}

#[async_trait]
impl StatusChannel for FakeHost {
    async fn report(&self, level: StatusLevel, message: &str) {
        self.with(|s| s.reports.push((level, message.to_string())));
    }

    async fn application_version(&self, version: &str) {
        self.with(|s| s.versions.push(version.to_string()));
    }
}

#[async_trait]
impl ReachabilityProbe for FakeHost {
    async fn reachable(&self, ip: Ipv4Addr, port: u16, _timeout: Duration) -> bool {
        let _ = self.record("probe", format!("{}:{}", ip, port));
        self.with(|s| s.reachable)
    }
}

#[async_trait]
impl PackageEndpoint for FakeHost {
    async fn fetch_index(&self, url: &str) -> Result<String, HostError> {
        self.record("fetch_index", url.to_string())?;
        Ok(self.with(|s| s.index.clone()))
    }

    async fn install_archive(&self, url: &str, dest: &Path) -> Result<(), HostError> {
        self.record("install_archive", format!("{} {}", url, dest.display()))?;
        self.touch(dest.join(".virtenv"));
        Ok(())
    }
}

#[async_trait]
impl CommandRunner for FakeHost {
    async fn output(&self, program: &str, args: &[String]) -> Result<String, HostError> {
        self.record("run", format!("{} {}", program, args.join(" ")))?;
        let script = args.first().map(String::as_str).unwrap_or_default();
        if script.ends_with("get_pkgs.py") {
            Ok(HOST_LIBRARIES.to_string())
        } else if script.ends_with("get_nova_conf.py") {
            Ok(NOVA_ARGS.to_string())
        } else {
            Ok(String::new())
        }
    }
}

/// Settings for tests: no waiting between object store polls
pub fn test_settings() -> AgentSettings {
    AgentSettings {
        charm_dir: PathBuf::from("/var/lib/juju/charm"),
        object_store_wait_interval_secs: 0,
        ..AgentSettings::default()
    }
}

pub fn valid_config() -> MoverConfig {
    MoverConfig::new(APPLIANCE_IP, NFS_SHARE, "nolock,soft")
}

/// Fake host, in-memory store and settings wired together
pub struct Harness {
    pub fake: Arc<FakeHost>,
    pub store: Arc<InMemoryPersistence>,
    pub settings: Arc<AgentSettings>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: AgentSettings) -> Self {
        Self {
            fake: FakeHost::new(),
            store: Arc::new(InMemoryPersistence::new()),
            settings: Arc::new(settings),
        }
    }

    pub fn host(&self) -> Host {
        Host {
            fs: self.fake.clone(),
            packages: self.fake.clone(),
            services: self.fake.clone(),
            status: self.fake.clone(),
            probe: self.fake.clone(),
            endpoint: self.fake.clone(),
            commands: self.fake.clone(),
        }
    }

    pub fn store(&self) -> Arc<dyn PersistenceBackend> {
        self.store.clone()
    }

    pub fn runner(&self) -> PipelineRunner {
        PipelineRunner::new(self.fake.clone())
    }

    pub fn provisioner(&self) -> Provisioner {
        Provisioner::new(self.host(), self.settings.clone(), self.store())
    }

    /// State machine over the real provisioner with a fixed configuration
    pub fn machine(&self, config: MoverConfig) -> LifecycleMachine<Provisioner> {
        LifecycleMachine::new(
            self.provisioner(),
            self.runner(),
            Arc::new(StaticConfigSource::new(config)),
            self.store(),
            self.fake.clone(),
        )
    }
}
