//! CLI command definitions

use clap::Args;

/// Handle a lifecycle event
#[derive(Debug, Args, Clone)]
pub struct EventCommand {
    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,

    /// Don't show pipeline progress
    #[arg(short, long)]
    pub quiet: bool,
}

/// Show the lifecycle state
#[derive(Debug, Args, Clone)]
pub struct StatusCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show handled events
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details of a run
    #[arg(long)]
    pub details: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific run
    #[arg(long)]
    pub run_id: Option<String>,
}

/// Print rendered files
#[derive(Debug, Args, Clone)]
pub struct RenderCommand {
    /// Which file to render
    #[arg(long, value_enum, default_value_t = RenderTarget::All)]
    pub target: RenderTarget,
}

/// Rendered file selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RenderTarget {
    Config,
    Unit,
    All,
}
