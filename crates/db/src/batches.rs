//! Running a script as its `GO`-separated batches.

use std::future::Future;

use sqlrunner_core::classifier::split_batches;

use crate::error::SessionError;

/// Sends a single batch to the server.
pub trait BatchExecutor: Send {
    fn execute_batch(
        &mut self,
        batch: &str,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;
}

/// Execute `sql` one batch at a time, stopping at the first failure.
///
/// When the script has more than one batch the failure is wrapped in
/// [`SessionError::Batch`]; a single-batch script returns the server error
/// as is.
pub async fn run_batches<E: BatchExecutor>(
    executor: &mut E,
    sql: &str,
) -> Result<(), SessionError> {
    let batches = split_batches(sql);
    let total = batches.len();

    for (i, batch) in batches.iter().enumerate() {
        if let Err(err) = executor.execute_batch(batch).await {
            tracing::debug!(batch = i + 1, total, error = %err, "Batch failed");
            return Err(if total > 1 {
                SessionError::Batch {
                    index: i + 1,
                    total,
                    source: Box::new(err),
                }
            } else {
                err
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
