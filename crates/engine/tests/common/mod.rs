//! In-memory `Connector` / `Session` fakes shared by the engine tests.
//!
//! Every executed text is recorded, connects and closes are counted, and
//! failures are driven by [`FakeConfig`]. Delays use `tokio::time::sleep`
//! so tests can run on a paused clock.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sqlrunner_core::{ConnectionDescriptor, ScriptFile};
use sqlrunner_db::{Connector, Session, SessionError, OBJECT_ALREADY_EXISTS_ERROR};
use sqlrunner_engine::{ProgressSink, RunProgress};

/// Server error number for "Invalid object name".
pub const INVALID_OBJECT_ERROR: u32 = 208;

#[derive(Debug, Clone, Default)]
pub struct FakeConfig {
    /// Reject every connection attempt with a login failure.
    pub refuse_connections: bool,
    pub connect_delay: Duration,
    pub execute_delay: Duration,
    /// `CREATE PROCEDURE` / `CREATE FUNCTION` fail with error 2714.
    pub objects_exist: bool,
    /// Any text containing this marker fails with error 208.
    pub fail_marker: Option<String>,
    /// Per-server delay before database names are returned.
    pub list_delays: HashMap<String, Duration>,
}

#[derive(Default)]
pub struct FakeState {
    pub config: FakeConfig,
    pub executed: Mutex<Vec<String>>,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
}

impl FakeState {
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct FakeConnector {
    pub state: Arc<FakeState>,
}

impl FakeConnector {
    pub fn new(config: FakeConfig) -> Self {
        Self {
            state: Arc::new(FakeState {
                config,
                ..Default::default()
            }),
        }
    }
}

/// Names the fake reports for `server`.
pub fn names_for(server: &str) -> Vec<String> {
    vec![format!("{server}_app"), format!("{server}_master")]
}

impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<FakeSession, SessionError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.state.config.connect_delay).await;

        if self.state.config.refuse_connections {
            return Err(SessionError::Server {
                code: 18456,
                message: "Login failed for user 'sa'.".to_string(),
            });
        }

        Ok(FakeSession {
            state: Arc::clone(&self.state),
            server: descriptor.server().to_string(),
        })
    }
}

pub struct FakeSession {
    state: Arc<FakeState>,
    server: String,
}

impl Session for FakeSession {
    async fn execute_script(&mut self, sql: &str) -> Result<(), SessionError> {
        self.state.executed.lock().unwrap().push(sql.to_string());
        tokio::time::sleep(self.state.config.execute_delay).await;

        let lower = sql.to_lowercase();
        if self.state.config.objects_exist
            && (lower.contains("create procedure") || lower.contains("create function"))
        {
            return Err(SessionError::Server {
                code: OBJECT_ALREADY_EXISTS_ERROR,
                message: "There is already an object named 'p' in the database.".to_string(),
            });
        }

        if let Some(marker) = &self.state.config.fail_marker {
            if sql.contains(marker.as_str()) {
                return Err(SessionError::Server {
                    code: INVALID_OBJECT_ERROR,
                    message: format!("Invalid object name '{marker}'."),
                });
            }
        }

        Ok(())
    }

    async fn database_names(&mut self) -> Result<Vec<String>, SessionError> {
        if let Some(delay) = self.state.config.list_delays.get(&self.server) {
            tokio::time::sleep(*delay).await;
        }
        Ok(names_for(&self.server))
    }

    async fn close(self) -> Result<(), SessionError> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records every progress event.
#[derive(Default)]
pub struct RecordingProgress {
    pub events: Mutex<Vec<RunProgress>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<RunProgress> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn on_progress(&self, progress: RunProgress) {
        self.events.lock().unwrap().push(progress);
    }
}

pub fn descriptor() -> ConnectionDescriptor {
    ConnectionDescriptor::sql_login("fake-server", "sa", "secret")
        .unwrap()
        .with_database("AppDb")
}

/// Write `contents` to `dir/name` and return it as a script.
pub fn write_script(dir: &Path, name: &str, contents: &str) -> ScriptFile {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    ScriptFile::new(path).with_size(contents.len() as u64)
}
