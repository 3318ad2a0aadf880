//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{EventCommand, HistoryCommand, RenderCommand, StatusCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Lifecycle agent for the TrilioVault DataMover
#[derive(Debug, Parser, Clone)]
#[command(name = "datamover-agent")]
#[command(version)]
#[command(
    about = "Installs, reconfigures and removes the TrilioVault DataMover",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the agent settings file (YAML)
    #[arg(short, long, global = true)]
    pub settings: Option<PathBuf>,

    /// Path to a mover configuration file (YAML); defaults to `config-get` inside a hook
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Handle the install-requested event
    Install(EventCommand),

    /// Handle the config-changed event
    ConfigChanged(EventCommand),

    /// Handle the stop-requested event
    Stop(EventCommand),

    /// Show the lifecycle state
    Status(StatusCommand),

    /// Show handled events
    History(HistoryCommand),

    /// Print the configuration file and unit that would be written
    Render(RenderCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
