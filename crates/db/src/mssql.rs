//! SQL Server sessions over TDS using tiberius.
//!
//! Server names follow the usual `Data Source` forms: `host`, `host,port`,
//! `host\INSTANCE` and `tcp:host,port`. `.` and `(local)` mean localhost.
//! Named instances are resolved through the SQL Browser service.

use sqlrunner_core::{ConnectionDescriptor, Credentials};
use tiberius::{AuthMethod, Client, Config, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::batches::{run_batches, BatchExecutor};
use crate::error::SessionError;
use crate::{Connector, Session};

type MssqlClient = Client<Compat<TcpStream>>;

const DEFAULT_PORT: u16 = 1433;
const APPLICATION_NAME: &str = "sqlrunner";

// ---------------------------------------------------------------------------
// Server address
// ---------------------------------------------------------------------------

/// A `Data Source` value split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub instance: Option<String>,
    pub port: Option<u16>,
}

impl ServerAddress {
    pub fn parse(server: &str) -> Result<Self, SessionError> {
        let trimmed = server.trim();
        let without_protocol = trimmed
            .strip_prefix("tcp:")
            .or_else(|| trimmed.strip_prefix("TCP:"))
            .unwrap_or(trimmed);

        let (host_part, port) = match without_protocol.split_once(',') {
            Some((host, port)) => {
                let port = port.trim().parse::<u16>().map_err(|_| {
                    SessionError::Unsupported(format!("Invalid port in server name '{server}'"))
                })?;
                (host, Some(port))
            }
            None => (without_protocol, None),
        };

        let (host, instance) = match host_part.split_once('\\') {
            Some((host, instance)) if !instance.trim().is_empty() => {
                (host, Some(instance.trim().to_string()))
            }
            Some((host, _)) => (host, None),
            None => (host_part, None),
        };

        let host = match host.trim() {
            "" | "." | "(local)" | "(localdb)" => "localhost".to_string(),
            other => other.to_string(),
        };

        Ok(Self {
            host,
            instance,
            port,
        })
    }
}

/// Build a tiberius [`Config`] for `descriptor`.
pub fn build_config(descriptor: &ConnectionDescriptor) -> Result<Config, SessionError> {
    let address = ServerAddress::parse(descriptor.server())?;

    let mut config = Config::new();
    config.host(&address.host);
    match (address.port, &address.instance) {
        (Some(port), _) => config.port(port),
        (None, Some(instance)) => config.instance_name(instance),
        (None, None) => config.port(DEFAULT_PORT),
    }
    if let Some(database) = descriptor.database() {
        config.database(database);
    }
    config.application_name(APPLICATION_NAME);
    config.authentication(auth_method(descriptor.credentials())?);
    if descriptor.trust_server_certificate() {
        config.trust_cert();
    }
    Ok(config)
}

fn auth_method(credentials: &Credentials) -> Result<AuthMethod, SessionError> {
    match credentials {
        Credentials::SqlLogin { username, password } => {
            Ok(AuthMethod::sql_server(username, password))
        }
        #[cfg(windows)]
        Credentials::Integrated => Ok(AuthMethod::Integrated),
        #[cfg(not(windows))]
        Credentials::Integrated => Err(SessionError::Unsupported(
            "Integrated security is only available on Windows; use a SQL login".to_string(),
        )),
    }
}

async fn open_tcp(config: &Config, named_instance: bool) -> Result<TcpStream, SessionError> {
    let tcp = if named_instance {
        TcpStream::connect_named(config).await?
    } else {
        TcpStream::connect(config.get_addr()).await?
    };
    tcp.set_nodelay(true).ok();
    Ok(tcp)
}

async fn open_client(descriptor: &ConnectionDescriptor) -> Result<MssqlClient, SessionError> {
    let address = ServerAddress::parse(descriptor.server())?;
    let named_instance = address.port.is_none() && address.instance.is_some();

    let config = build_config(descriptor)?;
    let tcp = open_tcp(&config, named_instance).await?;

    match Client::connect(config, tcp.compat_write()).await {
        Ok(client) => Ok(client),
        // Azure SQL gateways answer the first login with a redirect.
        Err(tiberius::error::Error::Routing { host, port }) => {
            tracing::debug!(%host, port, "Following server routing redirect");
            let mut config = build_config(descriptor)?;
            config.host(&host);
            config.port(port);
            let tcp = open_tcp(&config, false).await?;
            Ok(Client::connect(config, tcp.compat_write()).await?)
        }
        Err(err) => Err(err.into()),
    }
}

// ---------------------------------------------------------------------------
// Connector and session
// ---------------------------------------------------------------------------

/// Opens real TDS connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlConnector;

impl Connector for MssqlConnector {
    type Session = MssqlSession;

    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<MssqlSession, SessionError> {
        tracing::debug!(
            connection = %descriptor.redacted_connection_string(),
            "Opening SQL Server connection"
        );
        let client = open_client(descriptor).await?;
        tracing::info!(server = %descriptor.server(), "Connected");
        Ok(MssqlSession { client })
    }
}

pub struct MssqlSession {
    client: MssqlClient,
}

impl BatchExecutor for MssqlSession {
    async fn execute_batch(&mut self, batch: &str) -> Result<(), SessionError> {
        self.client.simple_query(batch).await?.into_results().await?;
        Ok(())
    }
}

impl Session for MssqlSession {
    async fn execute_script(&mut self, sql: &str) -> Result<(), SessionError> {
        run_batches(self, sql).await
    }

    async fn database_names(&mut self) -> Result<Vec<String>, SessionError> {
        let rows = self
            .client
            .simple_query("SELECT name FROM sys.databases ORDER BY name")
            .await?
            .into_first_result()
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| row.get::<&str, _>(0).map(str::to_string))
            .collect())
    }

    async fn close(self) -> Result<(), SessionError> {
        self.client.close().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
