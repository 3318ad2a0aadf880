//! Host collaborator error types

use thiserror::Error;

/// Errors raised by host collaborators
#[derive(Debug, Error)]
pub enum HostError {
    #[error("{0}")]
    Validation(String),

    #[error("packaging error: {0}")]
    Packaging(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("{program} exited with code {code}: {stderr}")]
    Process {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("timed out after {0} seconds")]
    TimeoutExceeded(u64),

    #[error("http error: {0}")]
    Http(String),
}

impl HostError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        HostError::Filesystem(format!("{}: {}", path.display(), err))
    }
}

impl From<reqwest::Error> for HostError {
    fn from(err: reqwest::Error) -> Self {
        HostError::Http(err.to_string())
    }
}
