//! CLI output formatting

use crate::{
    core::LifecycleState,
    execution::{ExecutionEvent, Outcome, Plan},
    persistence::RunSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar for a pipeline run; the length is set once it starts
pub fn create_progress_bar() -> ProgressBar {
    let progress = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Feed a pipeline event into a progress bar
pub fn track_progress(progress: &ProgressBar, event: &ExecutionEvent) {
    match event {
        ExecutionEvent::PipelineStarted { total_steps, .. } => {
            progress.set_length(*total_steps as u64);
            progress.set_position(0);
        }
        ExecutionEvent::StepStarted { step_name, .. } => progress.set_message(step_name.clone()),
        ExecutionEvent::StepCompleted { .. } => progress.inc(1),
        ExecutionEvent::StepFailed { .. } => {}
        ExecutionEvent::PipelineCompleted { .. } => progress.finish_and_clear(),
    }
    progress.println(format_execution_event(event));
}

/// Format a lifecycle state for display
pub fn format_state(state: LifecycleState) -> String {
    match state {
        LifecycleState::Uninstalled => style("UNINSTALLED").dim().to_string(),
        LifecycleState::Installing => style("INSTALLING").yellow().to_string(),
        LifecycleState::Installed => style("INSTALLED").green().to_string(),
        LifecycleState::Stopping => style("STOPPING").yellow().to_string(),
    }
}

/// Format a run summary for display
pub fn format_run_summary(run: &RunSummary) -> String {
    let icon = if run.ok { CHECK } else { CROSS };
    let detail = match (&run.failed_step, run.ok) {
        (Some(step), false) => format!("{}: {}", step, run.message),
        _ => run.message.clone(),
    };

    format!(
        "{} {} - {} - {} → {} - {}",
        icon,
        style(&run.run_id.to_string()[..8]).dim(),
        style(run.event).bold(),
        format_state(run.state_before),
        format_state(run.state_after),
        style(detail).dim()
    )
}

/// Format the outcome of a handled event
pub fn format_outcome(outcome: &Outcome) -> String {
    if outcome.plan == Plan::Ignore {
        return format!(
            "{} {} ignored while {}",
            INFO,
            style(outcome.event).bold(),
            format_state(outcome.state)
        );
    }

    if outcome.result.ok {
        format!(
            "{} {} completed {} - now {}",
            CHECK,
            style(outcome.event).bold(),
            style("successfully").green(),
            format_state(outcome.state)
        )
    } else {
        format!(
            "{} {} {}: {} - now {}",
            CROSS,
            style(outcome.event).bold(),
            style("failed").red(),
            outcome.result,
            format_state(outcome.state)
        )
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            pipeline_name,
            total_steps,
        } => format!(
            "{} Starting {} ({} steps)",
            ROCKET,
            style(pipeline_name).bold(),
            style(total_steps).dim()
        ),
        ExecutionEvent::StepStarted { step_name, .. } => {
            format!("{} {}", SPINNER, style(step_name).cyan())
        }
        ExecutionEvent::StepCompleted { step_name, message } => {
            if message.is_empty() {
                format!("{} {}", CHECK, style(step_name).green())
            } else {
                format!("{} {} {}", CHECK, style(step_name).green(), style(message).dim())
            }
        }
        ExecutionEvent::StepFailed { step_name, error } => {
            format!("{} {}: {}", CROSS, style(step_name).red(), style(error).dim())
        }
        ExecutionEvent::PipelineCompleted { pipeline_name, ok } => {
            if *ok {
                format!("{} {} finished", CHECK, style(pipeline_name).bold())
            } else {
                format!("{} {} stopped", WARN, style(pipeline_name).bold())
            }
        }
    }
}

/// Format duration for display
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
