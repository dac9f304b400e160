//! Applies one script to an open session.
//!
//! The protocol is: read the file, optionally skip non-definition scripts,
//! execute, and if the server reports that the object already exists,
//! rewrite `CREATE` to `ALTER` and execute exactly once more.

use sqlrunner_core::script::decode_script;
use sqlrunner_core::{
    error_chain, is_procedure_or_function, rewrite_create_to_alter, RunOptions, ScriptFile,
    ScriptOutcome,
};
use sqlrunner_db::Session;

/// Execute `script` on `session` and return its outcome.
///
/// A missing or unreadable file, and a skipped script, never touch the
/// session.
pub async fn execute_script<S: Session>(
    session: &mut S,
    script: &ScriptFile,
    options: &RunOptions,
) -> ScriptOutcome {
    let text = match tokio::fs::read(&script.path).await {
        Ok(bytes) => decode_script(&bytes),
        Err(e) => {
            tracing::warn!(
                script = %script.path.display(),
                error = %e,
                "Script file cannot be read",
            );
            return ScriptOutcome::file_missing();
        }
    };

    if options.only_run_procedure_or_function_scripts && !is_procedure_or_function(&text) {
        tracing::debug!(
            script = %script.display_name,
            "Skipping script without procedure or function definition",
        );
        return ScriptOutcome::SkippedNotProcedureOrFunction;
    }

    let err = match session.execute_script(&text).await {
        Ok(()) => return ScriptOutcome::Succeeded,
        Err(err) => err,
    };

    if !err.is_object_already_exists() {
        return ScriptOutcome::failed(error_chain(&err));
    }

    tracing::info!(
        script = %script.display_name,
        code = ?err.server_code(),
        "Object already exists, retrying as ALTER",
    );

    let altered = rewrite_create_to_alter(&text);
    match session.execute_script(&altered).await {
        Ok(()) => ScriptOutcome::Succeeded,
        Err(retry_err) => ScriptOutcome::failed(error_chain(&retry_err)),
    }
}
