//! Connection descriptor for a target SQL Server.
//!
//! A [`ConnectionDescriptor`] is built once per run and never mutated
//! afterwards; the builder methods consume and return `self`.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::error::CoreError;

/// Upper bound on a connection attempt unless overridden.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Placeholder substituted for the password in anything that gets logged.
const HIDDEN_PASSWORD: &str = "[hidden]";

/// How the session authenticates against the server.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Use the operating-system identity of the current process.
    Integrated,
    /// SQL Server login. The username is never empty.
    SqlLogin { username: String, password: String },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Integrated => f.write_str("Integrated"),
            Credentials::SqlLogin { username, .. } => f
                .debug_struct("SqlLogin")
                .field("username", username)
                .field("password", &HIDDEN_PASSWORD)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    server: String,
    database: Option<String>,
    credentials: Credentials,
    connect_timeout: Duration,
    trust_server_certificate: bool,
}

impl ConnectionDescriptor {
    /// Descriptor using integrated authentication.
    pub fn integrated(server: impl Into<String>) -> Self {
        Self::with_credentials(server.into(), Credentials::Integrated)
    }

    /// Descriptor using a SQL Server login. The password may be empty,
    /// the username may not.
    pub fn sql_login(
        server: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let username = username.into();
        if username.trim().is_empty() {
            return Err(CoreError::Validation(
                "a username is required when integrated authentication is off".into(),
            ));
        }
        Ok(Self::with_credentials(
            server.into(),
            Credentials::SqlLogin {
                username,
                password: password.into(),
            },
        ))
    }

    fn with_credentials(server: String, credentials: Credentials) -> Self {
        Self {
            server: server.trim().to_string(),
            database: None,
            credentials,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            trust_server_certificate: false,
        }
    }

    /// Target a specific database. Blank names leave the server default.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        let database = database.into();
        self.database = if database.trim().is_empty() {
            None
        } else {
            Some(database.trim().to_string())
        };
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_trust_server_certificate(mut self, trust: bool) -> Self {
        self.trust_server_certificate = trust;
        self
    }

    /// Copy of this descriptor that connects to the server only, as used
    /// when enumerating databases.
    pub fn without_database(&self) -> Self {
        Self {
            database: None,
            ..self.clone()
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn uses_integrated_auth(&self) -> bool {
        matches!(self.credentials, Credentials::Integrated)
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn trust_server_certificate(&self) -> bool {
        self.trust_server_certificate
    }

    /// ADO.NET style connection string, password included.
    pub fn connection_string(&self) -> String {
        self.render(false)
    }

    /// Connection string safe to display or log.
    pub fn redacted_connection_string(&self) -> String {
        self.render(true)
    }

    fn render(&self, redact: bool) -> String {
        let (integrated, username, password) = match &self.credentials {
            Credentials::Integrated => ("true", "", ""),
            Credentials::SqlLogin { username, password } => {
                ("false", username.as_str(), password.as_str())
            }
        };
        let password = if redact {
            HIDDEN_PASSWORD.to_string()
        } else {
            quote_value(password)
        };

        let mut out = format!(
            "Data Source={};Integrated Security={};User ID={};Password={};Connect Timeout={};",
            quote_value(&self.server),
            integrated,
            quote_value(username),
            password,
            self.connect_timeout.as_secs(),
        );
        if self.trust_server_certificate {
            out.push_str("TrustServerCertificate=true;");
        }
        if let Some(database) = &self.database {
            out.push_str(&format!("Initial Catalog={};", quote_value(database)));
        }
        out
    }
}

impl Serialize for ConnectionDescriptor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.redacted_connection_string())
    }
}

/// Quote a connection-string value when it would otherwise break parsing.
fn quote_value(value: &str) -> String {
    if value.contains(';') || value.contains('"') || value != value.trim() {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
