//! Install pipeline

use crate::{
    core::{
        MoverConfig, Pipeline, PipelineContext, StatusLevel, StepResult, ALREADY_PROVISIONED,
        LATEST_VERSION,
    },
    execution::PipelineRunner,
    host::{network::parse_latest_version, HostError},
    persistence::PROVISIONED_VERSION_KEY,
    provision::{render, Provisioner, DIR_MODE, FILE_MODE},
};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const EMPTY_IP_MESSAGE: &str = "TrilioVault IP address is not configured";
pub const INVALID_IP_MESSAGE: &str = "Invalid IP address, please provide correct IP address";
pub const UNREACHABLE_MESSAGE: &str = "Unable to reach TVault appliance";
pub const NO_SHARES_MESSAGE: &str = "No valid nfs-shares configuration found, please recheck";
pub const MOUNT_FAILED_MESSAGE: &str =
    "Failed while validating NFS mount, please recheck configuration";
pub const MISSING_BINARY_MESSAGE: &str = "TrilioVault Datamover binary is not present on TVault VM";

/// Maintenance message once the mover package is installed
pub const STARTING_MESSAGE: &str = "Starting";

const NFS_CLIENT_PACKAGE: &str = "nfs-common";
const SYSTEM_LIB: &str = "/usr/lib";
const SYSTEM_LIB64: &str = "/usr/lib64";
const SITE_PACKAGES: &str = "lib/python2.7/site-packages";

/// Host libraries linked into the virtualenv, as reported by `get_pkgs.py`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeLibraries {
    pub cryptography: PathBuf,
    pub libvirtmod: PathBuf,
    pub cffi: PathBuf,
    pub cffi_backend: PathBuf,
}

impl RuntimeLibraries {
    /// Parse the helper output: one path per line, in a fixed order
    pub fn parse(output: &str) -> Option<Self> {
        let mut lines = output.lines().map(str::trim).filter(|l| !l.is_empty());
        Some(Self {
            cryptography: PathBuf::from(lines.next()?),
            libvirtmod: PathBuf::from(lines.next()?),
            cffi: PathBuf::from(lines.next()?),
            cffi_backend: PathBuf::from(lines.next()?),
        })
    }
}

impl Provisioner {
    /// Build the install pipeline for `config`
    pub fn install_pipeline<'a>(&'a self, config: &'a MoverConfig) -> Pipeline<'a> {
        Pipeline::new("install")
            .step("validate_ip", move |_| async move {
                self.validate_ip(&config.triliovault_ip).await
            })
            .step("validate_nfs", move |_| async move { self.validate_nfs(config).await })
            .step("add_users", move |_| async move { self.add_users().await })
            .step("resolve_version", move |ctx: Arc<PipelineContext>| async move {
                self.resolve_version(config, &ctx).await
            })
            .step("provision_runtime", move |ctx: Arc<PipelineContext>| async move {
                self.provision_runtime(config, &ctx).await
            })
            .step("ensure_files", move |_| async move { self.ensure_files().await })
            .step("render_config", move |_| async move { self.render_config(config).await })
            .step("ensure_data_dir", move |_| async move { self.ensure_data_dir().await })
            .step("render_unit", move |_| async move { self.render_unit().await })
            .step("start_service", move |_| async move { self.start_service().await })
    }

    /// Run the install pipeline and publish the installed version on success
    pub async fn run_install(&self, runner: &PipelineRunner, config: &MoverConfig) -> StepResult {
        let ctx = Arc::new(PipelineContext::new());
        let result = runner
            .run_with_context(&self.install_pipeline(config), ctx.clone())
            .await;

        if result.ok {
            if let Some(version) = ctx.get(LATEST_VERSION) {
                self.host.status.application_version(&version).await;
            }
        }
        result
    }

    /// Check that the appliance address is set, well-formed and reachable
    pub async fn validate_ip(&self, ip: &str) -> StepResult {
        let ip = ip.trim();
        if ip.is_empty() {
            return StepResult::failure(EMPTY_IP_MESSAGE);
        }

        let addr: Ipv4Addr = match ip.parse() {
            Ok(addr) => addr,
            Err(_) => {
                warn!("Rejecting malformed appliance address {:?}", ip);
                return StepResult::failure(INVALID_IP_MESSAGE);
            }
        };

        let timeout = Duration::from_secs(self.settings.probe_timeout_secs);
        if !self
            .host
            .probe
            .reachable(addr, self.settings.control_port, timeout)
            .await
        {
            return StepResult::failure(UNREACHABLE_MESSAGE);
        }

        StepResult::success_with(format!(
            "TVault appliance reachable at {}:{}",
            addr, self.settings.control_port
        ))
    }

    /// Dry-run mount of the backup target
    pub async fn validate_nfs(&self, config: &MoverConfig) -> StepResult {
        let settings = &self.settings;

        match self.host.packages.missing(&[NFS_CLIENT_PACKAGE]).await {
            Ok(missing) if missing.is_empty() => {}
            Ok(_) => {
                info!("'{}' package not found, installing it", NFS_CLIENT_PACKAGE);
                if let Err(e) = self.host.packages.install(&[NFS_CLIENT_PACKAGE], &[]).await {
                    return StepResult::from_error("Failed to install the NFS client", e);
                }
            }
            Err(e) => return StepResult::from_error("Failed to query installed packages", e),
        }

        let device = config.nfs_shares.trim();
        if device.is_empty() {
            return StepResult::failure(NO_SHARES_MESSAGE);
        }

        if let Err(e) = self
            .host
            .fs
            .mkdir(&settings.data_dir, &settings.user, &settings.group, DIR_MODE)
            .await
        {
            return StepResult::from_error("Failed to create the mount directory", e);
        }

        if !self.host.fs.mount(device, &settings.data_dir, "nfs").await {
            return StepResult::failure(MOUNT_FAILED_MESSAGE);
        }
        debug!("Mounted {} at {}", device, settings.data_dir.display());

        if let Err(e) = self.host.fs.unmount(&settings.data_dir).await {
            return StepResult::from_error("Failed to release the NFS dry-run mount", e);
        }

        StepResult::success_with(format!("{} is mountable", device))
    }

    /// Passwordless sudo and device access for the runtime user
    pub async fn add_users(&self) -> StepResult {
        match self.try_add_users().await {
            Ok(()) => StepResult::success(),
            Err(e) => StepResult::from_error("Failed while adding Users", e),
        }
    }

    async fn try_add_users(&self) -> Result<(), HostError> {
        let settings = &self.settings;
        let grant = format!("{} ALL=(ALL) NOPASSWD: ALL\n", settings.user);
        self.host
            .fs
            .write_file(&settings.sudoers_file, &grant, "root", "root", 0o440)
            .await?;

        for group in ["kvm", "disk"] {
            self.host.fs.add_user_to_group(&settings.user, group).await?;
        }

        self.host
            .fs
            .symlink(Path::new(SYSTEM_LIB), Path::new(SYSTEM_LIB64))
            .await
    }

    /// Look up the newest mover version offered by the appliance
    pub async fn resolve_version(&self, config: &MoverConfig, ctx: &PipelineContext) -> StepResult {
        let settings = &self.settings;
        let url = format!(
            "http://{}:{}/packages/",
            config.triliovault_ip.trim(),
            settings.package_port
        );

        let index = match self.host.endpoint.fetch_index(&url).await {
            Ok(index) => index,
            Err(e) => return StepResult::from_error("Failed to query the TVault package index", e),
        };

        let Some(latest) = parse_latest_version(&index, &settings.package_name) else {
            return StepResult::failure(format!(
                "No {} package found on the TVault appliance",
                settings.package_name
            ));
        };
        ctx.set(LATEST_VERSION, latest.as_str());

        let provisioned = match self.store.value(PROVISIONED_VERSION_KEY).await {
            Ok(version) => version,
            Err(e) => return StepResult::from_error("Failed to read the provisioned version", e),
        };

        if provisioned.as_deref() == Some(latest.as_str()) {
            info!("{} {} is already provisioned", settings.package_name, latest);
            ctx.set(ALREADY_PROVISIONED, "true");
            return StepResult::success_with(format!("{} already provisioned", latest));
        }

        StepResult::success_with(latest)
    }

    /// Virtualenv, host library links, mover package and its policy files
    pub async fn provision_runtime(
        &self,
        config: &MoverConfig,
        ctx: &PipelineContext,
    ) -> StepResult {
        if ctx.flag(ALREADY_PROVISIONED) {
            return StepResult::success_with("Runtime environment is up to date");
        }

        let Some(version) = ctx.get(LATEST_VERSION) else {
            return StepResult::failure("Package version was not resolved");
        };
        let ip = config.triliovault_ip.trim();
        let settings = &self.settings;

        if let Err(e) = self.install_virtenv(ip).await {
            return StepResult::from_error("Failed while Creating Virtual Env", e);
        }

        let helper = settings.charm_file("get_pkgs.py");
        let libraries = match self.run_helper(&settings.python, &helper).await.and_then(|out| {
            RuntimeLibraries::parse(&out).ok_or_else(|| {
                HostError::Validation(format!(
                    "{} reported an incomplete library list",
                    helper.display()
                ))
            })
        }) {
            Ok(libraries) => libraries,
            Err(e) => return StepResult::from_error("Failed to get the dependent packages", e),
        };

        if let Err(e) = self.install_package(ip).await {
            return StepResult::from_error("TrilioVault Datamover package installation failed", e);
        }
        self.host
            .status
            .report(StatusLevel::Maintenance, STARTING_MESSAGE)
            .await;

        if let Err(e) = self.link_libraries(&libraries).await {
            return StepResult::from_error("Failed to link host libraries", e);
        }

        if let Err(e) = self.install_policy_files().await {
            return StepResult::from_error("Failed to install sudoers and rootwrap files", e);
        }

        if let Err(e) = self
            .store
            .set_value(PROVISIONED_VERSION_KEY, Some(version.as_str()))
            .await
        {
            return StepResult::from_error("Failed to record the provisioned version", e);
        }

        StepResult::success_with(format!("Provisioned {} {}", settings.package_name, version))
    }

    async fn install_virtenv(&self, ip: &str) -> Result<(), HostError> {
        let settings = &self.settings;
        self.host
            .fs
            .mkdir(&settings.home_dir, &settings.user, &settings.group, DIR_MODE)
            .await?;
        self.host.fs.remove_tree(&settings.virtenv_dir).await?;

        let url = format!(
            "http://{}:{}/packages/{}",
            ip, settings.package_port, settings.virtenv_archive
        );
        self.host
            .endpoint
            .install_archive(&url, &settings.home_dir)
            .await?;
        info!("Virtual environment installed in {}", settings.virtenv_dir.display());
        Ok(())
    }

    async fn install_package(&self, ip: &str) -> Result<(), HostError> {
        let settings = &self.settings;
        let source = format!("deb http://{}:{} deb-repo/", ip, settings.repository_port);
        self.host.packages.add_repository(&source).await?;
        self.host.packages.update().await?;
        self.host
            .packages
            .install(&[settings.package_name.as_str()], &["--allow-unauthenticated"])
            .await?;
        info!("{} package installed", settings.package_name);
        Ok(())
    }

    async fn link_libraries(&self, libraries: &RuntimeLibraries) -> Result<(), HostError> {
        let settings = &self.settings;
        let site_packages = settings.virtenv_dir.join(SITE_PACKAGES);
        let fs = &self.host.fs;

        fs.remove_tree(&site_packages.join("cryptography")).await?;
        fs.remove_tree(&site_packages.join("cffi")).await?;
        fs.symlink(&libraries.cryptography, &site_packages.join("cryptography"))
            .await?;
        fs.symlink(&libraries.cffi, &site_packages.join("cffi")).await?;
        fs.copy(&libraries.libvirtmod, &site_packages.join("libvirtmod.so"))
            .await?;
        fs.copy(&libraries.cffi_backend, &site_packages.join("_cffi_backend.so"))
            .await?;

        fs.chown_recursive(&settings.home_dir, &settings.user, &settings.group)
            .await
    }

    async fn install_policy_files(&self) -> Result<(), HostError> {
        let settings = &self.settings;
        self.host
            .fs
            .copy(&settings.charm_file("trilio_sudoers"), &settings.sudoers_dir)
            .await?;
        self.host
            .fs
            .copy(&settings.charm_file("trilio.filters"), &settings.rootwrap_dir)
            .await
    }

    async fn run_helper(&self, python: &Path, script: &Path) -> Result<String, HostError> {
        let python = python.to_string_lossy();
        let argv = vec![script.to_string_lossy().into_owned()];
        self.host.commands.output(python.as_ref(), &argv).await
    }

    /// Log file, mover binary check and configuration directory
    pub async fn ensure_files(&self) -> StepResult {
        let settings = &self.settings;
        let fs = &self.host.fs;

        if let Err(e) = fs
            .mkdir(&settings.log_dir, &settings.user, &settings.group, DIR_MODE)
            .await
        {
            return StepResult::from_error("Failed to create the log directory", e);
        }

        if !fs.exists(&settings.log_file).await {
            if let Err(e) = fs
                .write_file(&settings.log_file, "", &settings.user, &settings.group, FILE_MODE)
                .await
            {
                return StepResult::from_error("Failed to create the log file", e);
            }
        }

        if !fs.exists(&settings.binary).await {
            return StepResult::failure(MISSING_BINARY_MESSAGE);
        }

        if let Err(e) = fs
            .mkdir(&settings.config_dir, &settings.user, &settings.group, DIR_MODE)
            .await
        {
            return StepResult::from_error("Failed to create the configuration directory", e);
        }

        StepResult::success()
    }

    /// Write `tvault-contego.conf` from the current configuration
    pub async fn render_config(&self, config: &MoverConfig) -> StepResult {
        let settings = &self.settings;
        let content = render::config_file(settings, config);
        match self
            .host
            .fs
            .write_file(&settings.config_file, &content, &settings.user, &settings.group, FILE_MODE)
            .await
        {
            Ok(()) => StepResult::success_with(settings.config_file.display().to_string()),
            Err(e) => StepResult::from_error("Failed while writing conf files", e),
        }
    }

    /// Data mount point, fresh legacy data directory and log rotation policy
    pub async fn ensure_data_dir(&self) -> StepResult {
        match self.try_ensure_data_dir().await {
            Ok(()) => StepResult::success(),
            Err(e) => StepResult::from_error("Failed while ensuring data directories", e),
        }
    }

    async fn try_ensure_data_dir(&self) -> Result<(), HostError> {
        let settings = &self.settings;
        let fs = &self.host.fs;
        fs.mkdir(&settings.data_dir, &settings.user, &settings.group, DIR_MODE)
            .await?;
        fs.remove_tree(&settings.legacy_data_dir).await?;
        fs.mkdir(&settings.legacy_data_dir, &settings.user, &settings.group, DIR_MODE)
            .await?;
        fs.copy(&settings.charm_file("tvault-contego"), &settings.logrotate_file)
            .await
    }

    /// Arguments pointing the mover at nova's and its own configuration
    pub async fn mover_config_args(&self) -> Result<String, HostError> {
        let settings = &self.settings;
        let python = settings.virtenv_dir.join("bin").join("python");
        let output = self
            .run_helper(&python, &settings.charm_file("get_nova_conf.py"))
            .await?;
        let nova_args = output.lines().next().unwrap_or_default();
        let conf_dir_present = self.host.fs.exists(&settings.nova_conf_dir).await;
        Ok(render::config_args(settings, nova_args, conf_dir_present))
    }

    /// Write the systemd unit for the mover
    pub async fn render_unit(&self) -> StepResult {
        let settings = &self.settings;
        let args = match self.mover_config_args().await {
            Ok(args) => args,
            Err(e) => return StepResult::from_error("Failed to discover nova configuration", e),
        };

        let content = render::unit_file(settings, &args);
        match self
            .host
            .fs
            .write_file(&settings.unit_file, &content, "root", "root", FILE_MODE)
            .await
        {
            Ok(()) => StepResult::success_with(settings.unit_file.display().to_string()),
            Err(e) => StepResult::from_error("Failed while creating DataMover service file", e),
        }
    }

    /// Reload units, enable and (re)start the mover service
    pub async fn start_service(&self) -> StepResult {
        let name = &self.settings.service_name;
        match self.try_start_service(name).await {
            Ok(()) => StepResult::success_with(format!("{} started", name)),
            Err(e) => StepResult::from_error(&format!("Failed to start {}", name), e),
        }
    }

    async fn try_start_service(&self, name: &str) -> Result<(), HostError> {
        let services = &self.host.services;
        services.daemon_reload().await?;
        services.enable(name).await?;
        services.restart(name).await
    }
}
