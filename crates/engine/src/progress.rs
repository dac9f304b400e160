//! Progress reporting for batch runs.

use std::time::Duration;

use serde::Serialize;
use sqlrunner_core::report::format_running_elapsed;
use sqlrunner_core::{ScriptFile, ScriptOutcome};

/// Snapshot of a running batch, emitted before each script and once per
/// second while connecting or while a script executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunProgress {
    /// Scripts finished so far.
    pub index_completed: usize,
    pub total: usize,
    /// Display name of the script being executed. Empty while connecting.
    pub current_script: String,
    pub elapsed: Duration,
}

impl RunProgress {
    /// Elapsed time for a status line, e.g. `1 minute(s) and 5 seconds`.
    pub fn elapsed_text(&self) -> String {
        format_running_elapsed(self.elapsed)
    }
}

/// Receives batch progress. All methods default to no-ops.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, _progress: RunProgress) {}
    fn on_script_finished(&self, _script: &ScriptFile, _outcome: &ScriptOutcome) {}
}

/// Progress sink that discards everything.
pub struct SilentProgress;

impl ProgressSink for SilentProgress {}
