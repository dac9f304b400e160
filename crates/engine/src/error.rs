use std::io;
use std::path::PathBuf;

use sqlrunner_core::{error_chain, CoreError};
use sqlrunner_db::SessionError;

/// Errors that end a whole batch run or listing call.
///
/// Per-script failures never show up here; they are recorded as
/// [`sqlrunner_core::ScriptOutcome::Failed`] in the run report.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The session could not be opened. `messages` is the full cause
    /// chain, outermost first.
    #[error("Cannot connect to server '{server}': {}", .messages.join(" / "))]
    Connection {
        server: String,
        messages: Vec<String>,
    },

    #[error("A script run is already in progress")]
    RunInProgress,

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl EngineError {
    pub fn connection(server: &str, err: &SessionError) -> Self {
        Self::Connection {
            server: server.to_string(),
            messages: error_chain(err),
        }
    }
}

/// Failure while copying a failed script aside. Logged, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    #[error("Cannot create failed-scripts directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot copy {} to {}: {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_keeps_cause_chain() {
        let cause = SessionError::Batch {
            index: 1,
            total: 2,
            source: Box::new(SessionError::Server {
                code: 18456,
                message: "Login failed for user 'sa'.".into(),
            }),
        };
        let err = EngineError::connection("db01", &cause);
        assert_eq!(
            err.to_string(),
            "Cannot connect to server 'db01': Batch 1 of 2 failed / Login failed for user 'sa'."
        );
    }

    #[test]
    fn copy_error_names_both_paths() {
        let err = CopyError::Copy {
            from: PathBuf::from("/s/a.sql"),
            to: PathBuf::from("/s/Failed Scripts/a.sql"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(
            err.to_string(),
            "Cannot copy /s/a.sql to /s/Failed Scripts/a.sql: denied"
        );
    }
}
