//! External command execution

use crate::host::HostError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Runs external programs to completion
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and return its stdout
    ///
    /// A non-zero exit status is an error carrying the program's stderr.
    async fn output(&self, program: &str, args: &[String]) -> Result<String, HostError>;
}

/// Build an argument vector from string slices
pub fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Runs commands on the local machine
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner {
    /// Upper bound for any single command, in seconds
    timeout_secs: Option<u64>,
}

impl SystemCommandRunner {
    /// Create a runner without a timeout
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every command by `timeout_secs`
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn output(&self, program: &str, args: &[String]) -> Result<String, HostError> {
        debug!("Running {} {}", program, args.join(" "));

        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);

        let result = match self.timeout_secs {
            Some(secs) => timeout(Duration::from_secs(secs), command.output())
                .await
                .map_err(|_| HostError::TimeoutExceeded(secs))?,
            None => command.output().await,
        };

        let output = result.map_err(|e| HostError::Spawn {
            program: program.to_string(),
            reason: e.to_string(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let code = output.status.code().unwrap_or(-1);
            warn!("{} exited with code {}: {}", program, code, stderr);
            return Err(HostError::Process {
                program: program.to_string(),
                code,
                stderr,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("{} returned {} bytes of output", program, stdout.len());

        Ok(stdout)
    }
}
