use anyhow::{Context, Result};
use datamover_agent::{
    cli::{
        commands::{EventCommand, HistoryCommand, RenderCommand, RenderTarget, StatusCommand},
        output::*,
        Cli, Command,
    },
    core::{
        config::YamlConfigSource, AgentSettings, ConfigSource, LifecycleEvent, LifecycleState,
        INSTALLED_FLAG, STOPPING_FLAG,
    },
    execution::{LifecycleMachine, PipelineRunner},
    host::{hooktools, HookConfigSource, Host},
    persistence::{
        InMemoryPersistence, PersistenceBackend, RunSummary, SqliteStore, PROVISIONED_VERSION_KEY,
    },
    provision::{render, Provisioner},
};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let settings = match &cli.settings {
        Some(path) => AgentSettings::from_file(path)?,
        None => {
            let settings = AgentSettings::default();
            settings.validate()?;
            settings
        }
    };

    // Execute command
    match &cli.command {
        Command::Install(cmd) => {
            handle_event(LifecycleEvent::InstallRequested, cmd, &cli, settings).await?
        }
        Command::ConfigChanged(cmd) => {
            handle_event(LifecycleEvent::ConfigChanged, cmd, &cli, settings).await?
        }
        Command::Stop(cmd) => {
            handle_event(LifecycleEvent::StopRequested, cmd, &cli, settings).await?
        }
        Command::Status(cmd) => show_status(cmd, &settings).await?,
        Command::History(cmd) => show_history(cmd, &settings).await?,
        Command::Render(cmd) => render_files(cmd, &cli, settings).await?,
    }

    Ok(())
}

/// Pick the mover configuration source: an explicit file, else `config-get`
fn config_source(cli: &Cli, host: &Host) -> Result<Arc<dyn ConfigSource>> {
    match &cli.config {
        Some(path) => Ok(Arc::new(YamlConfigSource::new(path))),
        None if hooktools::in_hook_context() => {
            Ok(Arc::new(HookConfigSource::new(host.commands.clone())))
        }
        None => anyhow::bail!("No mover configuration: pass --config when running outside a hook"),
    }
}

async fn open_store(settings: &AgentSettings) -> Result<Arc<dyn PersistenceBackend>> {
    let store = SqliteStore::new(&settings.state_db_path()).await?;
    Ok(Arc::new(store))
}

async fn handle_event(
    event: LifecycleEvent,
    cmd: &EventCommand,
    cli: &Cli,
    settings: AgentSettings,
) -> Result<()> {
    let host = Host::system(hooktools::in_hook_context());
    let config = config_source(cli, &host)?;
    let store = open_store(&settings).await?;

    let mut runner = PipelineRunner::new(host.status.clone());
    if !cmd.quiet && !cmd.json {
        let progress = create_progress_bar();
        runner.add_event_handler(move |event| track_progress(&progress, &event));
    }

    let status = host.status.clone();
    let provisioner = Provisioner::new(host, Arc::new(settings), store.clone());
    let machine = LifecycleMachine::new(provisioner, runner, config, store, status);

    let outcome = machine.handle(event).await?;

    // A failed pipeline is surfaced as a blocked status; the hook itself succeeds
    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", format_outcome(&outcome));
    }

    Ok(())
}

async fn show_status(cmd: &StatusCommand, settings: &AgentSettings) -> Result<()> {
    let store = open_store(settings).await?;
    let installed = store.flag(INSTALLED_FLAG).await?;
    let stopping = store.flag(STOPPING_FLAG).await?;
    let state = LifecycleState::from_flags(installed, stopping);
    let version = store.value(PROVISIONED_VERSION_KEY).await?;
    let last_run = store.list_runs(1).await?.into_iter().next();

    if cmd.json {
        let data = serde_json::json!({
            "state": state,
            "provisioned_version": version,
            "last_run": last_run,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("{} State: {}", INFO, format_state(state));
    println!(
        "  Provisioned version: {}",
        style(version.as_deref().unwrap_or("none")).cyan()
    );
    if let Some(run) = &last_run {
        println!("  Last run: {}", format_run_summary(run));
    }

    Ok(())
}

async fn show_history(cmd: &HistoryCommand, settings: &AgentSettings) -> Result<()> {
    let store = open_store(settings).await?;

    // If a specific run is requested
    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(run) => print_run_details(&run, cmd.details)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    let runs = store.list_runs(cmd.limit).await?;
    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Run history (showing latest {}):", INFO, cmd.limit);
        for run in &runs {
            println!("  {}", format_run_summary(run));
        }
    }

    Ok(())
}

fn print_run_details(run: &RunSummary, details: bool) -> Result<()> {
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(run.run_id).cyan());
    println!("  Event: {}", style(run.event).bold());
    println!(
        "  State: {} → {}",
        format_state(run.state_before),
        format_state(run.state_after)
    );
    if let Some(step) = &run.failed_step {
        println!("  Failed step: {}", style(step).red());
    }
    println!("  Message: {}", run.message);
    println!("  Started: {}", style(run.started_at.to_rfc3339()).dim());
    if let Ok(duration) = run.completed_at.signed_duration_since(run.started_at).to_std() {
        println!("  Duration: {}", style(format_duration(duration)).dim());
    }

    if details {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(run)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}

async fn render_files(cmd: &RenderCommand, cli: &Cli, settings: AgentSettings) -> Result<()> {
    let host = Host::system(false);
    let config = config_source(cli, &host)?.load().await?;
    let provisioner = Provisioner::new(
        host,
        Arc::new(settings),
        Arc::new(InMemoryPersistence::new()),
    );
    let settings = &provisioner.settings;

    if matches!(cmd.target, RenderTarget::Config | RenderTarget::All) {
        println!("# {}", settings.config_file.display());
        print!("{}", render::config_file(settings, &config));
    }

    if matches!(cmd.target, RenderTarget::Unit | RenderTarget::All) {
        let args = match provisioner.mover_config_args().await {
            Ok(args) => args,
            Err(e) => {
                warn!("Nova configuration discovery failed: {}", e);
                render::config_args(settings, "", false)
            }
        };
        println!("# {}", settings.unit_file.display());
        print!("{}", render::unit_file(settings, &args));
    }

    Ok(())
}
