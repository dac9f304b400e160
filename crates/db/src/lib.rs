//! `sqlrunner-db` -- sessions against a SQL Server instance.
//!
//! [`Connector`] opens a [`Session`]; the engine only ever talks to these
//! two traits, so tests can substitute in-memory fakes. [`mssql`] holds the
//! tiberius-backed implementation.

pub mod batches;
pub mod error;
pub mod mssql;

use std::future::Future;

use sqlrunner_core::ConnectionDescriptor;

pub use batches::{run_batches, BatchExecutor};
pub use error::{SessionError, OBJECT_ALREADY_EXISTS_ERROR, OBJECT_ALREADY_EXISTS_TEXT};
pub use mssql::{MssqlConnector, MssqlSession};

/// An open connection to one server.
pub trait Session: Send {
    /// Send the whole script text to the server.
    fn execute_script(
        &mut self,
        sql: &str,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Names of every database on the server, sorted by name.
    fn database_names(&mut self) -> impl Future<Output = Result<Vec<String>, SessionError>> + Send;

    /// Close the connection gracefully.
    fn close(self) -> impl Future<Output = Result<(), SessionError>> + Send
    where
        Self: Sized;
}

/// Opens sessions described by a [`ConnectionDescriptor`].
pub trait Connector: Send + Sync + 'static {
    type Session: Session + 'static;

    fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> impl Future<Output = Result<Self::Session, SessionError>> + Send;
}

/// Connect, giving up after the descriptor's connect timeout.
pub async fn connect_with_timeout<C: Connector>(
    connector: &C,
    descriptor: &ConnectionDescriptor,
) -> Result<C::Session, SessionError> {
    let limit = descriptor.connect_timeout();
    match tokio::time::timeout(limit, connector.connect(descriptor)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                server = %descriptor.server(),
                timeout_secs = limit.as_secs(),
                "Connection attempt timed out"
            );
            Err(SessionError::Timeout(limit))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
