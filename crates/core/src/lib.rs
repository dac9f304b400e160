//! `sqlrunner-core` -- domain types for applying SQL scripts to a server.
//!
//! Pure logic with no database access: connection descriptors, script
//! classification and batch splitting, per-script outcomes, and the run
//! report with its textual rendering.

pub mod classifier;
pub mod connection;
pub mod error;
pub mod report;
pub mod script;

pub use classifier::{classify, is_procedure_or_function, rewrite_create_to_alter, Classification};
pub use connection::{ConnectionDescriptor, Credentials, DEFAULT_CONNECT_TIMEOUT};
pub use error::{error_chain, CoreError};
pub use report::{RunReport, ScriptOutcome, ScriptResult, FILE_MISSING_MESSAGE};
pub use script::{discover_scripts, RunOptions, ScriptFile};
