use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use sqlrunner_core::{ConnectionDescriptor, RunOptions, DEFAULT_CONNECT_TIMEOUT};

/// Runner configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub descriptor: ConnectionDescriptor,
    /// Directory scanned for `*.sql` files.
    pub script_dir: PathBuf,
    pub include_subdirectories: bool,
    pub options: RunOptions,
}

impl RunnerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default     |
    /// |----------------------------------|-------------|
    /// | `SQLRUNNER_SERVER`               | `localhost` |
    /// | `SQLRUNNER_DATABASE`             | --          |
    /// | `SQLRUNNER_INTEGRATED_AUTH`      | `true`      |
    /// | `SQLRUNNER_USERNAME`             | empty       |
    /// | `SQLRUNNER_PASSWORD`             | empty       |
    /// | `SQLRUNNER_TRUST_SERVER_CERT`    | `false`     |
    /// | `SQLRUNNER_CONNECT_TIMEOUT_SECS` | `30`        |
    /// | `SQLRUNNER_SCRIPT_DIR`           | `.`         |
    /// | `SQLRUNNER_INCLUDE_SUBDIRS`      | `false`     |
    /// | `SQLRUNNER_ONLY_PROCEDURES`      | `false`     |
    /// | `SQLRUNNER_COPY_FAILED`          | `false`     |
    /// | `SQLRUNNER_FAILED_DIR`           | --          |
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let flag = |key: &str, default: bool| -> anyhow::Result<bool> {
            match lookup(key) {
                Some(value) => parse_bool(key, &value),
                None => Ok(default),
            }
        };

        let server = lookup("SQLRUNNER_SERVER").unwrap_or_else(|| "localhost".into());

        let descriptor = if flag("SQLRUNNER_INTEGRATED_AUTH", true)? {
            ConnectionDescriptor::integrated(server)
        } else {
            ConnectionDescriptor::sql_login(
                server,
                lookup("SQLRUNNER_USERNAME").unwrap_or_default(),
                lookup("SQLRUNNER_PASSWORD").unwrap_or_default(),
            )?
        };

        let connect_timeout = match lookup("SQLRUNNER_CONNECT_TIMEOUT_SECS") {
            Some(value) => Duration::from_secs(
                value
                    .trim()
                    .parse()
                    .context("SQLRUNNER_CONNECT_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
            None => DEFAULT_CONNECT_TIMEOUT,
        };

        let mut descriptor = descriptor
            .with_connect_timeout(connect_timeout)
            .with_trust_server_certificate(flag("SQLRUNNER_TRUST_SERVER_CERT", false)?);
        if let Some(database) = lookup("SQLRUNNER_DATABASE") {
            descriptor = descriptor.with_database(database);
        }

        let options = RunOptions {
            only_run_procedure_or_function_scripts: flag("SQLRUNNER_ONLY_PROCEDURES", false)?,
            copy_failed_scripts: flag("SQLRUNNER_COPY_FAILED", false)?,
            failed_scripts_directory: lookup("SQLRUNNER_FAILED_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
        };

        Ok(Self {
            descriptor,
            script_dir: lookup("SQLRUNNER_SCRIPT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            include_subdirectories: flag("SQLRUNNER_INCLUDE_SUBDIRS", false)?,
            options,
        })
    }
}

/// Accepts `true/false/yes/no/1/0`, case-insensitively.
fn parse_bool(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        other => bail!("{key} must be true/false/yes/no/1/0, got '{other}'"),
    }
}
