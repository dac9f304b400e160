//! `sqlrunner-engine` -- executes scripts and lists databases in the
//! background.
//!
//! - [`executor`] applies one script with the CREATE to ALTER retry.
//! - [`batch`] runs an ordered list of scripts over one session and builds
//!   the [`sqlrunner_core::RunReport`].
//! - [`lister`] enumerates database names with cancellation checkpoints.
//! - [`supervisor`] dispatches both onto tokio tasks and reports back over
//!   a channel.

pub mod batch;
pub mod error;
pub mod executor;
pub mod lister;
pub mod progress;
pub mod supervisor;

pub use batch::{copy_failed_script, run_batch, PROGRESS_INTERVAL};
pub use error::{CopyError, EngineError};
pub use executor::execute_script;
pub use lister::list_database_names;
pub use progress::{ProgressSink, RunProgress, SilentProgress};
pub use supervisor::{EventStream, ListRequest, SupervisorEvent, TaskState, TaskSupervisor};
