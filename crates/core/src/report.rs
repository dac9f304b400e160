//! Per-script outcomes and the aggregated run report.
//!
//! [`RunReport`] is the structured result of a batch run. The textual
//! summary produced by [`RunReport::render`] is derived from it and never
//! stored separately.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::script::ScriptFile;

/// Failure message recorded when a script file is missing or unreadable.
pub const FILE_MISSING_MESSAGE: &str = "FILE DOES NOT EXIST";

const BANNER: &str = "=================================================================";
const SEPARATOR: &str =
    "--------------------------------------------------------------------------------------------";
const SKIPPED_SUFFIX: &str = "SKIPPED because it is not a Create/Alter Procedure/Function file.";

// ---------------------------------------------------------------------------
// ScriptOutcome
// ---------------------------------------------------------------------------

/// What happened to one script. Exactly one per script per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScriptOutcome {
    Succeeded,
    SkippedNotProcedureOrFunction,
    /// `errors` holds the outer message followed by each nested cause.
    Failed { errors: Vec<String> },
}

impl ScriptOutcome {
    pub fn failed(errors: Vec<String>) -> Self {
        Self::Failed { errors }
    }

    pub fn file_missing() -> Self {
        Self::Failed {
            errors: vec![FILE_MISSING_MESSAGE.to_string()],
        }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::SkippedNotProcedureOrFunction)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_file_missing(&self) -> bool {
        matches!(self, Self::Failed { errors } if errors.len() == 1 && errors[0] == FILE_MISSING_MESSAGE)
    }
}

/// A script paired with its outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptResult {
    pub script: ScriptFile,
    pub outcome: ScriptOutcome,
}

// ---------------------------------------------------------------------------
// RunReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RunReport {
    connection_info: String,
    started_at: DateTime<Utc>,
    results: Vec<ScriptResult>,
    total_elapsed: Duration,
}

impl RunReport {
    /// Empty report for a run against the (redacted) `connection_info`.
    pub fn new(connection_info: impl Into<String>) -> Self {
        Self {
            connection_info: connection_info.into(),
            started_at: Utc::now(),
            results: Vec::new(),
            total_elapsed: Duration::ZERO,
        }
    }

    /// Append the outcome for the next script in execution order.
    pub fn record(&mut self, script: ScriptFile, outcome: ScriptOutcome) {
        self.results.push(ScriptResult { script, outcome });
    }

    pub fn finish(&mut self, total_elapsed: Duration) {
        self.total_elapsed = total_elapsed;
    }

    pub fn connection_info(&self) -> &str {
        &self.connection_info
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn results(&self) -> &[ScriptResult] {
        &self.results
    }

    pub fn total_elapsed(&self) -> Duration {
        self.total_elapsed
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded_count(&self) -> usize {
        self.count(ScriptOutcome::is_succeeded)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(ScriptOutcome::is_skipped)
    }

    pub fn failed_count(&self) -> usize {
        self.count(ScriptOutcome::is_failed)
    }

    fn count(&self, predicate: fn(&ScriptOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| predicate(&r.outcome)).count()
    }

    /// Human-readable summary: per-script log, skipped list, failed list,
    /// condensed counts, then elapsed time.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut skipped = String::new();
        let mut failed = String::new();

        let _ = writeln!(out, "Connection Info: {}\n", self.connection_info);
        let _ = writeln!(out, "{BANNER}");
        let _ = writeln!(out, "All Script Summaries (in the order that the scripts were ran)");
        let _ = writeln!(out, "{BANNER}\n");

        for result in &self.results {
            let path = result.script.path.display();
            match &result.outcome {
                ScriptOutcome::Succeeded => {
                    let _ = writeln!(out, "{path}: Success");
                }
                ScriptOutcome::SkippedNotProcedureOrFunction => {
                    let line = format!("{path}: {SKIPPED_SUFFIX}\n");
                    out.push_str(&line);
                    skipped.push_str(&line);
                }
                outcome if outcome.is_file_missing() => {
                    let line = format!("{path}: {FILE_MISSING_MESSAGE}\n");
                    out.push_str(&line);
                    let _ = writeln!(out, "{SEPARATOR}");
                    failed.push_str(&line);
                }
                ScriptOutcome::Failed { errors } => {
                    let block = format!(
                        "{SEPARATOR}\n{path}: FAILED TO RUN\n{}\n",
                        join_error_chain(errors)
                    );
                    out.push_str(&block);
                    let _ = writeln!(out, "{SEPARATOR}");
                    failed.push_str(&block);
                }
            }
        }

        let skipped_count = self.skipped_count();
        let failed_count = self.failed_count();

        if skipped_count > 0 {
            let _ = write!(out, "\n{BANNER}\nScripts Skipped On Purpose\n{BANNER}\n{skipped}");
        }
        if failed_count > 0 {
            let _ = write!(out, "\n{BANNER}\nScripts That Failed\n{BANNER}\n{failed}");
        }

        out.push_str("\n======================= Condensed Run Summary ========================\n");
        let _ = writeln!(
            out,
            "{} / {} scripts ran successfully.",
            self.succeeded_count(),
            self.total()
        );
        if skipped_count > 0 {
            let _ = writeln!(
                out,
                "{skipped_count} script(s) were SKIPPED because they are not a Create/Alter Procedure/Function script."
            );
        }
        if failed_count > 0 {
            let _ = writeln!(out, "{failed_count} SCRIPT(S) FAILED TO RUN!");
        }
        if skipped_count > 0 || failed_count > 0 {
            out.push_str("See above for details.\n");
        }
        let _ = writeln!(
            out,
            "Time it took to run all sql scripts: {}",
            format_total_elapsed(self.total_elapsed)
        );

        out
    }
}

impl Serialize for RunReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RunReport", 8)?;
        state.serialize_field("connection_info", &self.connection_info)?;
        state.serialize_field("started_at", &self.started_at)?;
        state.serialize_field("total", &self.total())?;
        state.serialize_field("succeeded", &self.succeeded_count())?;
        state.serialize_field("skipped", &self.skipped_count())?;
        state.serialize_field("failed", &self.failed_count())?;
        state.serialize_field("total_elapsed_ms", &(self.total_elapsed.as_millis() as u64))?;
        state.serialize_field("results", &self.results)?;
        state.end()
    }
}

/// Outer message first, then each nested cause on its own line.
fn join_error_chain(errors: &[String]) -> String {
    errors.join("\nInner Exception: ")
}

// ---------------------------------------------------------------------------
// Elapsed time formatting
// ---------------------------------------------------------------------------

/// Final summary form: `2 minute(s) and 3.4 seconds.`; sub-100ms runs get
/// three decimals.
pub fn format_total_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs_f64();
    let minutes = elapsed.as_secs() / 60;
    let seconds = total_secs - (minutes * 60) as f64;

    let mut out = String::new();
    if minutes > 0 {
        let _ = write!(out, "{minutes} minute(s) and ");
    }
    if total_secs < 0.1 {
        let _ = write!(out, "{seconds:.3} seconds.");
    } else {
        let _ = write!(out, "{seconds:.1} seconds.");
    }
    out
}

/// Live status form with whole seconds: `1 minute(s) and 5 seconds`.
pub fn format_running_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let minutes = secs / 60;
    let seconds = secs % 60;
    if minutes > 0 {
        format!("{minutes} minute(s) and {seconds} seconds")
    } else {
        format!("{seconds} seconds")
    }
}
