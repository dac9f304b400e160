//! Enumerates the databases on a server.

use sqlrunner_core::ConnectionDescriptor;
use sqlrunner_db::{connect_with_timeout, Connector, Session, SessionError};
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;

/// List database names on the descriptor's server.
///
/// The target database is ignored; the listing connects to the server's
/// default catalog. Returns `Ok(None)` when `cancel` fires at any
/// checkpoint. Connection and query errors are logged and yield an empty
/// list unless `forced` is set, in which case they are returned.
pub async fn list_database_names<C: Connector>(
    connector: &C,
    descriptor: &ConnectionDescriptor,
    forced: bool,
    cancel: &CancellationToken,
) -> Result<Option<Vec<String>>, EngineError> {
    if cancel.is_cancelled() {
        tracing::debug!(server = %descriptor.server(), "Listing cancelled before connecting");
        return Ok(None);
    }

    let server_descriptor = descriptor.without_database();

    let connected = tokio::select! {
        _ = cancel.cancelled() => {
            tracing::debug!(server = %descriptor.server(), "Listing cancelled while connecting");
            return Ok(None);
        }
        result = connect_with_timeout(connector, &server_descriptor) => result,
    };

    let mut session = match connected {
        Ok(session) => session,
        Err(e) => return swallow_unless_forced(descriptor, forced, e),
    };

    if cancel.is_cancelled() {
        close(session).await;
        return Ok(None);
    }

    let listed = tokio::select! {
        _ = cancel.cancelled() => None,
        result = session.database_names() => Some(result),
    };
    close(session).await;

    let names = match listed {
        None => {
            tracing::debug!(server = %descriptor.server(), "Listing cancelled while querying");
            return Ok(None);
        }
        Some(Ok(names)) => names,
        Some(Err(e)) => return swallow_unless_forced(descriptor, forced, e),
    };

    if cancel.is_cancelled() {
        return Ok(None);
    }

    tracing::info!(server = %descriptor.server(), count = names.len(), "Listed databases");
    Ok(Some(names))
}

fn swallow_unless_forced(
    descriptor: &ConnectionDescriptor,
    forced: bool,
    err: SessionError,
) -> Result<Option<Vec<String>>, EngineError> {
    if forced {
        tracing::error!(server = %descriptor.server(), error = %err, "Cannot list databases");
        Err(EngineError::connection(descriptor.server(), &err))
    } else {
        tracing::debug!(server = %descriptor.server(), error = %err, "Ignoring listing failure");
        Ok(Some(Vec::new()))
    }
}

async fn close<S: Session>(session: S) {
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "Error while closing listing session");
    }
}
