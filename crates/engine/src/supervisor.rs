//! Background task supervisor.
//!
//! [`TaskSupervisor`] runs the batch runner and the database lister on
//! spawned tokio tasks so the caller never waits on database I/O. Results
//! come back as [`SupervisorEvent`]s on the [`EventStream`] returned by
//! [`TaskSupervisor::new`], and each task kind publishes its [`TaskState`]
//! on a `watch` channel.
//!
//! At most one batch run is active at a time; a second request is
//! rejected. A new listing request cancels and supersedes the one in
//! flight. Superseded results are dropped, both here and in
//! [`EventStream::recv`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sqlrunner_core::{ConnectionDescriptor, RunOptions, RunReport, ScriptFile};
use sqlrunner_db::Connector;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::batch::run_batch;
use crate::error::EngineError;
use crate::lister::list_database_names;
use crate::progress::{ProgressSink, RunProgress};

/// How long [`TaskSupervisor::shutdown`] waits for each task to stop.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Lifecycle of one task kind.
///
/// `Idle` is only the initial state. Once a task ends, its terminal state
/// (`Completed`, `Failed` or `Cancelled`) holds until the next request of
/// that kind moves it back to `Running`; it never returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Notifications delivered to the caller.
#[derive(Debug)]
pub enum SupervisorEvent {
    RunProgress(RunProgress),
    RunCompleted(RunReport),
    RunFailed(EngineError),
    RunCancelled,
    DatabaseNames { generation: u64, names: Vec<String> },
    DatabaseNamesFailed { generation: u64, error: EngineError },
    DatabaseNamesCancelled { generation: u64 },
}

impl SupervisorEvent {
    /// Listing generation the event belongs to, for listing events.
    pub fn list_generation(&self) -> Option<u64> {
        match self {
            Self::DatabaseNames { generation, .. }
            | Self::DatabaseNamesFailed { generation, .. }
            | Self::DatabaseNamesCancelled { generation } => Some(*generation),
            _ => None,
        }
    }
}

/// What [`TaskSupervisor::request_database_names`] did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListRequest {
    /// A listing task was spawned, superseding any in flight.
    Started { generation: u64 },
    /// Non-forced request for the server already listed; nothing to do.
    Unchanged,
    /// A forced listing is still running; the request was ignored.
    ForcedPending,
    /// Blank server name on a non-forced request: an empty list was sent.
    Cleared { generation: u64 },
}

/// Receiving half of the supervisor's notifications.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<SupervisorEvent>,
    list_generation: Arc<AtomicU64>,
}

impl EventStream {
    /// Next event, skipping listing events from superseded requests.
    /// Returns `None` once the supervisor and all its tasks are gone.
    pub async fn recv(&mut self) -> Option<SupervisorEvent> {
        loop {
            let event = self.rx.recv().await?;
            match event.list_generation() {
                Some(generation) if generation != self.list_generation.load(Ordering::Acquire) => {
                    tracing::debug!(generation, "Dropping superseded listing event");
                }
                _ => return Some(event),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

struct RunTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct ListTask {
    generation: u64,
    forced: bool,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct ListSlot {
    last_server: Option<String>,
    in_flight: Option<ListTask>,
}

struct Shared {
    events: mpsc::UnboundedSender<SupervisorEvent>,
    run: Mutex<Option<RunTask>>,
    list: Mutex<ListSlot>,
    list_generation: Arc<AtomicU64>,
    run_state: watch::Sender<TaskState>,
    list_state: watch::Sender<TaskState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Forwards batch progress onto the event channel.
struct ChannelProgress(mpsc::UnboundedSender<SupervisorEvent>);

impl ProgressSink for ChannelProgress {
    fn on_progress(&self, progress: RunProgress) {
        let _ = self.0.send(SupervisorEvent::RunProgress(progress));
    }
}

/// Dispatches batch runs and database listings onto background tasks.
pub struct TaskSupervisor<C: Connector> {
    connector: Arc<C>,
    shared: Arc<Shared>,
}

impl<C: Connector> TaskSupervisor<C> {
    pub fn new(connector: Arc<C>) -> (Self, EventStream) {
        let (events, rx) = mpsc::unbounded_channel();
        let list_generation = Arc::new(AtomicU64::new(0));
        let (run_state, _) = watch::channel(TaskState::Idle);
        let (list_state, _) = watch::channel(TaskState::Idle);

        let shared = Arc::new(Shared {
            events,
            run: Mutex::new(None),
            list: Mutex::new(ListSlot::default()),
            list_generation: Arc::clone(&list_generation),
            run_state,
            list_state,
        });

        let stream = EventStream {
            rx,
            list_generation,
        };
        (Self { connector, shared }, stream)
    }

    pub fn run_state(&self) -> watch::Receiver<TaskState> {
        self.shared.run_state.subscribe()
    }

    pub fn list_state(&self) -> watch::Receiver<TaskState> {
        self.shared.list_state.subscribe()
    }

    // ---- batch runs ----

    /// Start a batch run in the background.
    ///
    /// Fails with [`EngineError::RunInProgress`] while another run is
    /// active. Progress and the terminal event arrive on the event stream.
    pub fn start_run(
        &self,
        descriptor: ConnectionDescriptor,
        scripts: Vec<ScriptFile>,
        options: RunOptions,
    ) -> Result<(), EngineError> {
        let mut slot = lock(&self.shared.run);
        if *self.shared.run_state.borrow() == TaskState::Running {
            tracing::warn!("Rejecting run request, a run is already active");
            return Err(EngineError::RunInProgress);
        }

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let connector = Arc::clone(&self.connector);
        let shared = Arc::clone(&self.shared);

        self.shared.run_state.send_replace(TaskState::Running);
        tracing::info!(scripts = scripts.len(), "Dispatching script run");

        let handle = tokio::spawn(async move {
            let progress = ChannelProgress(shared.events.clone());
            let result = run_batch(
                connector.as_ref(),
                &descriptor,
                &scripts,
                &options,
                &progress,
                &task_cancel,
            )
            .await;

            let (state, event) = match result {
                Ok(Some(report)) => (TaskState::Completed, SupervisorEvent::RunCompleted(report)),
                Ok(None) => (TaskState::Cancelled, SupervisorEvent::RunCancelled),
                Err(e) => (TaskState::Failed, SupervisorEvent::RunFailed(e)),
            };
            shared.run_state.send_replace(state);
            let _ = shared.events.send(event);
        });

        *slot = Some(RunTask { cancel, handle });
        Ok(())
    }

    /// Ask the active run to stop before its next script. Returns whether
    /// a run was active.
    pub fn cancel_run(&self) -> bool {
        let slot = lock(&self.shared.run);
        match slot.as_ref() {
            Some(task) if *self.shared.run_state.borrow() == TaskState::Running => {
                tracing::info!("Cancelling script run");
                task.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    // ---- database listing ----

    /// Request the database names on `descriptor`'s server.
    ///
    /// A `forced` request always reconnects and surfaces errors as
    /// [`SupervisorEvent::DatabaseNamesFailed`]; a non-forced one swallows
    /// them and is skipped when the server has not changed.
    pub fn request_database_names(
        &self,
        descriptor: ConnectionDescriptor,
        forced: bool,
    ) -> ListRequest {
        let mut slot = lock(&self.shared.list);

        if slot.in_flight.as_ref().is_some_and(|task| task.forced) {
            tracing::debug!("Forced listing pending, ignoring request");
            return ListRequest::ForcedPending;
        }

        let server = descriptor.server().trim().to_string();

        if server.is_empty() && !forced {
            let generation = self.supersede(&mut slot);
            slot.last_server = None;
            self.shared.list_state.send_replace(TaskState::Completed);
            let _ = self.shared.events.send(SupervisorEvent::DatabaseNames {
                generation,
                names: Vec::new(),
            });
            return ListRequest::Cleared { generation };
        }

        if !forced && slot.last_server.as_deref() == Some(server.as_str()) {
            return ListRequest::Unchanged;
        }

        let generation = self.supersede(&mut slot);
        slot.last_server = Some(server);

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let connector = Arc::clone(&self.connector);
        let shared = Arc::clone(&self.shared);

        self.shared.list_state.send_replace(TaskState::Running);
        tracing::info!(server = %descriptor.server(), generation, forced, "Listing databases");

        let handle = tokio::spawn(async move {
            let result =
                list_database_names(connector.as_ref(), &descriptor, forced, &task_cancel).await;

            let mut slot = lock(&shared.list);
            if shared.list_generation.load(Ordering::Acquire) != generation {
                tracing::debug!(generation, "Discarding superseded listing result");
                return;
            }

            let (state, event) = match result {
                Ok(Some(names)) => (
                    TaskState::Completed,
                    SupervisorEvent::DatabaseNames { generation, names },
                ),
                Ok(None) => {
                    // Nothing was listed, so the next request must not be skipped.
                    slot.last_server = None;
                    (
                        TaskState::Cancelled,
                        SupervisorEvent::DatabaseNamesCancelled { generation },
                    )
                }
                Err(error) => (
                    TaskState::Failed,
                    SupervisorEvent::DatabaseNamesFailed { generation, error },
                ),
            };
            slot.in_flight = None;
            shared.list_state.send_replace(state);
            let _ = shared.events.send(event);
        });

        slot.in_flight = Some(ListTask {
            generation,
            forced,
            cancel,
            handle,
        });
        ListRequest::Started { generation }
    }

    /// Cancel the listing in flight, if any. Its cancellation is still
    /// reported as [`SupervisorEvent::DatabaseNamesCancelled`].
    pub fn cancel_database_names(&self) -> bool {
        let slot = lock(&self.shared.list);
        match slot.in_flight.as_ref() {
            Some(task) => {
                tracing::info!(generation = task.generation, "Cancelling database listing");
                task.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel the in-flight listing and advance the generation. Called with
    /// the list slot locked.
    fn supersede(&self, slot: &mut ListSlot) -> u64 {
        if let Some(previous) = slot.in_flight.take() {
            tracing::info!(generation = previous.generation, "Superseding database listing");
            previous.cancel.cancel();
        }
        self.shared.list_generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    // ---- shutdown ----

    /// Cancel every task and wait up to five seconds for each to finish
    /// closing its session.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down task supervisor");

        let run = lock(&self.shared.run).take();
        let list = lock(&self.shared.list).in_flight.take();

        let mut handles = Vec::new();
        if let Some(task) = run {
            task.cancel.cancel();
            handles.push(task.handle);
        }
        if let Some(task) = list {
            task.cancel.cancel();
            handles.push(task.handle);
        }

        for handle in handles {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await.is_err() {
                tracing::warn!("Background task did not stop in time");
            }
        }

        tracing::info!("Task supervisor shut down");
    }
}
