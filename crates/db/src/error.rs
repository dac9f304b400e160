use std::time::Duration;

/// SQL Server error number for "There is already an object named ...".
pub const OBJECT_ALREADY_EXISTS_ERROR: u32 = 2714;

/// English text of [`OBJECT_ALREADY_EXISTS_ERROR`]. Matched only when no
/// error number is available, since the text depends on server locale.
pub const OBJECT_ALREADY_EXISTS_TEXT: &str = "There is already an object named";

/// Errors raised while connecting to a server or running a script on it.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The server rejected the statement.
    #[error("{message}")]
    Server { code: u32, message: String },

    /// One batch of a multi-batch script failed; `index` is 1-based.
    #[error("Batch {index} of {total} failed")]
    Batch {
        index: usize,
        total: usize,
        #[source]
        source: Box<SessionError>,
    },

    #[error("Connection attempt timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Any other driver failure (TLS, protocol, login handshake).
    #[error(transparent)]
    Driver(tiberius::error::Error),

    #[error("Network error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tiberius::error::Error> for SessionError {
    fn from(err: tiberius::error::Error) -> Self {
        match err {
            tiberius::error::Error::Server(token) => SessionError::Server {
                code: token.code(),
                message: token.message().to_string(),
            },
            tiberius::error::Error::Io { kind, message } => {
                SessionError::Io(std::io::Error::new(kind, message))
            }
            other => SessionError::Driver(other),
        }
    }
}

impl SessionError {
    /// Server error number, looking through batch wrappers.
    pub fn server_code(&self) -> Option<u32> {
        match self {
            SessionError::Server { code, .. } => Some(*code),
            SessionError::Batch { source, .. } => source.server_code(),
            _ => None,
        }
    }

    /// Whether the failure means the object being created already exists.
    ///
    /// Checks the error number first and falls back to the English message
    /// text anywhere in the cause chain.
    pub fn is_object_already_exists(&self) -> bool {
        if let Some(code) = self.server_code() {
            return code == OBJECT_ALREADY_EXISTS_ERROR;
        }
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(self);
        while let Some(err) = current {
            if err.to_string().contains(OBJECT_ALREADY_EXISTS_TEXT) {
                return true;
            }
            current = err.source();
        }
        false
    }
}
