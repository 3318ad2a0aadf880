//! Rendering of the mover configuration file and systemd unit

use crate::core::{AgentSettings, MoverConfig};
use std::fmt::Write;

/// Minimal INI document; sections and keys keep insertion order
#[derive(Debug, Default)]
struct IniDocument {
    sections: Vec<(String, Vec<(String, String)>)>,
}

impl IniDocument {
    fn section(&mut self, name: &str) -> &mut Vec<(String, String)> {
        let index = match self.sections.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                self.sections.push((name.to_string(), Vec::new()));
                self.sections.len() - 1
            }
        };
        &mut self.sections[index].1
    }

    fn set(&mut self, section: &str, key: &str, value: impl ToString) {
        self.section(section).push((key.to_string(), value.to_string()));
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for (name, entries) in &self.sections {
            let _ = writeln!(out, "[{}]", name);
            for (key, value) in entries {
                let _ = writeln!(out, "{} = {}", key, value);
            }
            out.push('\n');
        }
        out
    }
}

/// Python-style boolean, as the mover's option parser expects
fn py_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Render `tvault-contego.conf`
pub fn config_file(settings: &AgentSettings, config: &MoverConfig) -> String {
    let mut doc = IniDocument::default();
    doc.set("DEFAULT", "vault_storage_nfs_export", &config.nfs_shares);
    doc.set("DEFAULT", "vault_storage_nfs_options", &config.nfs_options);
    doc.set("DEFAULT", "vault_storage_type", "nfs");
    doc.set("DEFAULT", "vault_data_directory_old", settings.legacy_data_dir.display());
    doc.set("DEFAULT", "vault_data_directory", settings.data_dir.display());
    doc.set("DEFAULT", "log_file", settings.log_file.display());
    doc.set("DEFAULT", "debug", py_bool(false));
    doc.set("DEFAULT", "verbose", py_bool(true));
    doc.set("DEFAULT", "max_uploads_pending", 3);
    doc.set("DEFAULT", "max_commit_pending", 3);
    doc.set("DEFAULT", "qemu_agent_ping_timeout", 600);
    doc.set("contego_sys_admin", "helper_command", "sudo /usr/bin/privsep-helper");
    doc.set("conductor", "use_local", py_bool(true));
    doc.render()
}

/// Command-line arguments pointing the mover at its configuration
///
/// `nova_args` are the nova configuration arguments reported by the charm's
/// discovery helper.
pub fn config_args(
    settings: &AgentSettings,
    nova_args: &str,
    nova_conf_dir_present: bool,
) -> String {
    let mut args = format!(
        "{} --config-file={}",
        nova_args.trim(),
        settings.config_file.display()
    )
    .trim_start()
    .to_string();
    if nova_conf_dir_present {
        let _ = write!(args, " --config-dir={}", settings.nova_conf_dir.display());
    }
    args
}

/// Render the systemd unit for the mover service
pub fn unit_file(settings: &AgentSettings, config_args: &str) -> String {
    let exec_start = format!(
        "{} {} {}",
        settings.python.display(),
        settings.binary.display(),
        config_args
    );

    let mut doc = IniDocument::default();
    doc.set("Unit", "Description", "TrilioVault DataMover");
    doc.set("Unit", "After", &settings.compute_service);
    doc.set("Service", "User", &settings.user);
    doc.set("Service", "Group", &settings.group);
    doc.set("Service", "Type", "simple");
    doc.set("Service", "ExecStart", exec_start.trim_end());
    doc.set("Service", "TimeoutStopSec", 20);
    doc.set("Service", "KillMode", "process");
    doc.set("Service", "Restart", "always");
    doc.set("Install", "WantedBy", "multi-user.target");
    doc.render()
}
