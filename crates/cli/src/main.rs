//! `sqlrunner` -- applies a directory of SQL scripts to a SQL Server
//! database, or lists the databases on a server.
//!
//! Connection and run options come from `SQLRUNNER_*` environment
//! variables (see [`config::RunnerConfig::from_env`]); a `.env` file in the
//! working directory is honoured. Set `LOG_FORMAT=json` for JSON logs.

mod commands;
mod config;

use std::sync::Arc;

use clap::Parser;
use sqlrunner_core::discover_scripts;
use sqlrunner_db::MssqlConnector;
use sqlrunner_engine::{EventStream, SupervisorEvent, TaskSupervisor};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::{Cli, Commands};
use config::RunnerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = RunnerConfig::from_env()?;

    tracing::info!(
        connection = %config.descriptor.redacted_connection_string(),
        "Loaded configuration",
    );

    let (supervisor, mut events) = TaskSupervisor::new(Arc::new(MssqlConnector));

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_scripts(&config, &supervisor, &mut events, cli.json).await,
        Commands::Databases => list_databases(&config, &supervisor, &mut events, cli.json).await,
    };

    supervisor.shutdown().await;
    result
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sqlrunner=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run_scripts(
    config: &RunnerConfig,
    supervisor: &TaskSupervisor<MssqlConnector>,
    events: &mut EventStream,
    json: bool,
) -> anyhow::Result<()> {
    let scripts = discover_scripts(&config.script_dir, config.include_subdirectories)?;
    tracing::info!(
        dir = %config.script_dir.display(),
        count = scripts.len(),
        "Discovered scripts",
    );

    supervisor.start_run(
        config.descriptor.clone(),
        scripts,
        config.options.clone(),
    )?;

    let mut interrupted = false;
    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                tracing::warn!("Interrupt received, stopping after the current script");
                interrupted = true;
                supervisor.cancel_run();
                continue;
            }
        };

        match event {
            Some(SupervisorEvent::RunProgress(progress)) if progress.current_script.is_empty() => {
                tracing::info!(elapsed = %progress.elapsed_text(), "Connecting");
            }
            Some(SupervisorEvent::RunProgress(progress)) => {
                tracing::info!(
                    completed = progress.index_completed,
                    total = progress.total,
                    script = %progress.current_script,
                    elapsed = %progress.elapsed_text(),
                    "Running",
                );
            }
            Some(SupervisorEvent::RunCompleted(report)) => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    print!("{}", report.render());
                }
                return Ok(());
            }
            Some(SupervisorEvent::RunFailed(error)) => return Err(error.into()),
            Some(SupervisorEvent::RunCancelled) => {
                tracing::warn!("Script run cancelled, no report produced");
                return Ok(());
            }
            Some(_) => {}
            None => anyhow::bail!("Task supervisor stopped unexpectedly"),
        }
    }
}

async fn list_databases(
    config: &RunnerConfig,
    supervisor: &TaskSupervisor<MssqlConnector>,
    events: &mut EventStream,
    json: bool,
) -> anyhow::Result<()> {
    supervisor.request_database_names(config.descriptor.clone(), true);

    loop {
        match events.recv().await {
            Some(SupervisorEvent::DatabaseNames { names, .. }) => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&names)?);
                } else {
                    for name in names {
                        println!("{name}");
                    }
                }
                return Ok(());
            }
            Some(SupervisorEvent::DatabaseNamesFailed { error, .. }) => return Err(error.into()),
            Some(SupervisorEvent::DatabaseNamesCancelled { .. }) => return Ok(()),
            Some(_) => {}
            None => anyhow::bail!("Task supervisor stopped unexpectedly"),
        }
    }
}
