//! Eventbeat launcher
//!
//! Loads the TOML config, opens the checkpoint registry and the sink, then
//! tails every configured event log until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use eventbeat::{
    CancellationToken, JsonLinesSink, Orchestrator, Settings, WorkerExit, WorkerSettings,
};
use eventbeat_checkpoint::FileCheckpointStore;
use eventbeat_logging::{init_logging, LogConfig};

#[derive(Parser, Debug)]
#[command(name = "eventbeat", version, about = "Tails SQLite application event logs")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, env = "EVENTBEAT_CONFIG", default_value = "eventbeat.toml")]
    config: PathBuf,

    /// Debug output on stderr
    #[arg(short, long)]
    verbose: bool,

    /// Validate the config and exit
    #[arg(long)]
    check: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Dropping the guard flushes the log file; keep it until exit.
    let _log_guard = match init_logging(LogConfig {
        app_name: "eventbeat",
        verbose: cli.verbose,
    }) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: failed to initialize logging: {:#}", e);
            None
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;

    if cli.check {
        println!(
            "Config OK: {} event log(s), registry {}",
            settings.event_logs.len(),
            settings.registry_file.display()
        );
        return Ok(());
    }

    info!(
        config = %cli.config.display(),
        registry = %settings.registry_file.display(),
        sources = settings.event_logs.len(),
        "Starting eventbeat"
    );

    let cancel = CancellationToken::new();
    install_signal_handlers(cancel.clone())?;

    let registry = &settings.registry_file;
    let checkpoints = FileCheckpointStore::open(registry, settings.checkpoint.flush_policy())
        .with_context(|| format!("Failed to open registry {}", registry.display()))?;
    let sink = JsonLinesSink::from_config(&settings.output)
        .await
        .context("Failed to open output")?;

    let orchestrator = Orchestrator::new(
        settings.event_logs.clone(),
        Arc::new(sink),
        Arc::new(checkpoints),
        WorkerSettings::from(&settings.polling),
    );
    let report = orchestrator
        .run(cancel)
        .await
        .context("Event log run failed")?;

    for worker in &report.workers {
        match &worker.exit {
            WorkerExit::Cancelled | WorkerExit::SinkShuttingDown => info!(
                source = %worker.name,
                cursor = worker.cursor,
                exit = ?worker.exit,
                "Source finished"
            ),
            other => warn!(
                source = %worker.name,
                cursor = worker.cursor,
                exit = ?other,
                "Source stopped early"
            ),
        }
    }
    info!("Eventbeat stopped");
    Ok(())
}

fn install_signal_handlers(cancel: CancellationToken) -> Result<()> {
    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals =
            Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handlers")?;
        std::thread::spawn(move || {
            if let Some(sig) = signals.forever().next() {
                info!("Received signal {}, initiating shutdown...", sig);
                cancel.cancel();
            }
        });
    }

    #[cfg(windows)]
    {
        ctrlc::set_handler(move || {
            info!("Received Ctrl+C, initiating shutdown...");
            cancel.cancel();
        })
        .context("Failed to install Ctrl+C handler")?;
    }

    Ok(())
}
