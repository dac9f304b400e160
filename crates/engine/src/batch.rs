//! Batch runner: one session, many scripts, one report.

use std::path::PathBuf;
use std::time::Duration;

use sqlrunner_core::{ConnectionDescriptor, RunOptions, RunReport, ScriptFile, ScriptOutcome};
use sqlrunner_db::{connect_with_timeout, Connector, Session};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{CopyError, EngineError};
use crate::executor::execute_script;
use crate::progress::{ProgressSink, RunProgress};

/// Cadence of progress events while connecting and while a single script
/// is executing.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Run `scripts` in order against a single session.
///
/// Returns `Ok(None)` when `cancel` fires before the run finishes; the token
/// is observed while connecting and before each script. A connection
/// failure aborts the run before any script is attempted. While connecting,
/// progress ticks carry an empty `current_script`.
pub async fn run_batch<C, P>(
    connector: &C,
    descriptor: &ConnectionDescriptor,
    scripts: &[ScriptFile],
    options: &RunOptions,
    progress: &P,
    cancel: &CancellationToken,
) -> Result<Option<RunReport>, EngineError>
where
    C: Connector,
    P: ProgressSink + ?Sized,
{
    let started = Instant::now();
    let total = scripts.len();

    tracing::info!(
        server = %descriptor.server(),
        database = descriptor.database().unwrap_or_default(),
        scripts = total,
        "Starting script run",
    );

    let connected = {
        let connect = connect_with_timeout(connector, descriptor);
        tokio::pin!(connect);
        let mut ticker = progress_ticker().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Script run cancelled while connecting");
                    return Ok(None);
                }
                result = &mut connect => break result,
                _ = ticker.tick() => progress.on_progress(RunProgress {
                    index_completed: 0,
                    total,
                    current_script: String::new(),
                    elapsed: started.elapsed(),
                }),
            }
        }
    };
    let mut session = connected.map_err(|e| {
        tracing::error!(server = %descriptor.server(), error = %e, "Cannot open session");
        EngineError::connection(descriptor.server(), &e)
    })?;

    let mut report = RunReport::new(descriptor.redacted_connection_string());

    for (index, script) in scripts.iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::info!(completed = index, total, "Script run cancelled");
            close_session(session).await;
            return Ok(None);
        }

        let snapshot = |elapsed| RunProgress {
            index_completed: index,
            total,
            current_script: script.display_name.clone(),
            elapsed,
        };
        progress.on_progress(snapshot(started.elapsed()));

        let outcome = {
            let execution = execute_script(&mut session, script, options);
            tokio::pin!(execution);

            let mut ticker = progress_ticker().await;

            loop {
                tokio::select! {
                    outcome = &mut execution => break outcome,
                    _ = ticker.tick() => progress.on_progress(snapshot(started.elapsed())),
                }
            }
        };

        log_outcome(script, &outcome);
        progress.on_script_finished(script, &outcome);

        if options.copy_failed_scripts && outcome.is_failed() && !outcome.is_file_missing() {
            match copy_failed_script(script, options).await {
                Ok(target) => tracing::info!(
                    script = %script.display_name,
                    target = %target.display(),
                    "Copied failed script",
                ),
                Err(e) => tracing::warn!(script = %script.display_name, error = %e, "Failed to copy script"),
            }
        }

        report.record(script.clone(), outcome);
    }

    close_session(session).await;
    report.finish(started.elapsed());

    tracing::info!(
        total = report.total(),
        succeeded = report.succeeded_count(),
        skipped = report.skipped_count(),
        failed = report.failed_count(),
        elapsed_ms = report.total_elapsed().as_millis() as u64,
        "Script run finished",
    );

    Ok(Some(report))
}

/// Copy the unmodified script into its failed-scripts directory, replacing
/// any earlier copy of the same name.
pub async fn copy_failed_script(
    script: &ScriptFile,
    options: &RunOptions,
) -> Result<PathBuf, CopyError> {
    let dir = options.failed_scripts_dir_for(script);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|source| CopyError::CreateDir {
            path: dir.clone(),
            source,
        })?;

    let target = match script.path.file_name() {
        Some(name) => dir.join(name),
        None => dir.join(&script.display_name),
    };
    tokio::fs::copy(&script.path, &target)
        .await
        .map_err(|source| CopyError::Copy {
            from: script.path.clone(),
            to: target.clone(),
            source,
        })?;
    Ok(target)
}

/// Ticker for [`PROGRESS_INTERVAL`] whose first tick is already consumed.
async fn progress_ticker() -> Interval {
    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    ticker
}

async fn close_session<S: Session>(session: S) {
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "Error while closing session");
    }
}

fn log_outcome(script: &ScriptFile, outcome: &ScriptOutcome) {
    match outcome {
        ScriptOutcome::Succeeded => {
            tracing::info!(script = %script.display_name, "Script succeeded");
        }
        ScriptOutcome::SkippedNotProcedureOrFunction => {
            tracing::info!(script = %script.display_name, "Script skipped");
        }
        ScriptOutcome::Failed { errors } => {
            tracing::warn!(
                script = %script.display_name,
                error = errors.first().map(String::as_str).unwrap_or_default(),
                "Script failed",
            );
        }
    }
}
