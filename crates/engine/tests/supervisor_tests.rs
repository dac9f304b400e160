//! Tests for `TaskSupervisor`: terminal events, the single-run rule,
//! listing supersession and the listing request policy.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use sqlrunner_core::{ConnectionDescriptor, RunOptions};
use sqlrunner_engine::{
    EngineError, EventStream, ListRequest, SupervisorEvent, TaskState, TaskSupervisor,
};

use common::{descriptor, names_for, write_script, FakeConfig, FakeConnector};

/// Next event that is not run progress.
async fn next_terminal(events: &mut EventStream) -> SupervisorEvent {
    loop {
        match events.recv().await {
            Some(SupervisorEvent::RunProgress(_)) => continue,
            Some(event) => return event,
            None => panic!("event stream closed"),
        }
    }
}

fn server(name: &str) -> ConnectionDescriptor {
    ConnectionDescriptor::sql_login(name, "sa", "secret").unwrap()
}

// ---------------------------------------------------------------------------
// Test: a run delivers progress and exactly one completion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_completes_with_report() {
    let dir = tempfile::tempdir().unwrap();
    let scripts = vec![write_script(dir.path(), "a.sql", "SELECT 1")];
    let connector = Arc::new(FakeConnector::new(FakeConfig::default()));
    let (supervisor, mut events) = TaskSupervisor::new(Arc::clone(&connector));
    let state = supervisor.run_state();

    supervisor
        .start_run(descriptor(), scripts, RunOptions::default())
        .unwrap();

    let first = events.recv().await.unwrap();
    assert_matches!(first, SupervisorEvent::RunProgress(ref p) if p.current_script == "a.sql");

    let terminal = next_terminal(&mut events).await;
    assert_matches!(terminal, SupervisorEvent::RunCompleted(ref report) if report.succeeded_count() == 1);
    assert_eq!(*state.borrow(), TaskState::Completed);
}

#[tokio::test]
async fn run_connection_failure_is_reported() {
    let connector = Arc::new(FakeConnector::new(FakeConfig {
        refuse_connections: true,
        ..Default::default()
    }));
    let (supervisor, mut events) = TaskSupervisor::new(connector);

    supervisor
        .start_run(descriptor(), Vec::new(), RunOptions::default())
        .unwrap();

    assert_matches!(
        next_terminal(&mut events).await,
        SupervisorEvent::RunFailed(EngineError::Connection { .. })
    );
    assert_eq!(*supervisor.run_state().borrow(), TaskState::Failed);
}

// ---------------------------------------------------------------------------
// Test: only one run at a time
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn second_run_is_rejected_while_first_is_active() {
    let dir = tempfile::tempdir().unwrap();
    let scripts = vec![write_script(dir.path(), "a.sql", "SELECT 1")];
    let connector = Arc::new(FakeConnector::new(FakeConfig {
        execute_delay: Duration::from_secs(5),
        ..Default::default()
    }));
    let (supervisor, mut events) = TaskSupervisor::new(connector);

    supervisor
        .start_run(descriptor(), scripts.clone(), RunOptions::default())
        .unwrap();
    assert_matches!(
        supervisor.start_run(descriptor(), scripts.clone(), RunOptions::default()),
        Err(EngineError::RunInProgress)
    );

    assert_matches!(next_terminal(&mut events).await, SupervisorEvent::RunCompleted(_));

    supervisor
        .start_run(descriptor(), scripts, RunOptions::default())
        .unwrap();
    assert_matches!(next_terminal(&mut events).await, SupervisorEvent::RunCompleted(_));
}

#[tokio::test(start_paused = true)]
async fn cancelled_run_delivers_cancelled_without_report() {
    let dir = tempfile::tempdir().unwrap();
    let scripts = vec![
        write_script(dir.path(), "1.sql", "SELECT 1"),
        write_script(dir.path(), "2.sql", "SELECT 2"),
    ];
    let connector = Arc::new(FakeConnector::new(FakeConfig {
        execute_delay: Duration::from_secs(5),
        ..Default::default()
    }));
    let (supervisor, mut events) = TaskSupervisor::new(Arc::clone(&connector));

    supervisor
        .start_run(descriptor(), scripts, RunOptions::default())
        .unwrap();
    assert!(supervisor.cancel_run());

    assert_matches!(next_terminal(&mut events).await, SupervisorEvent::RunCancelled);
    assert_eq!(*supervisor.run_state().borrow(), TaskState::Cancelled);
    assert!(connector.state.executed().len() < 2);
    assert!(!supervisor.cancel_run());
}

// ---------------------------------------------------------------------------
// Test: a newer listing supersedes the one in flight
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn newer_listing_supersedes_older() {
    let connector = Arc::new(FakeConnector::new(FakeConfig {
        list_delays: HashMap::from([("alpha".to_string(), Duration::from_secs(10))]),
        ..Default::default()
    }));
    let (supervisor, mut events) = TaskSupervisor::new(Arc::clone(&connector));

    assert_eq!(
        supervisor.request_database_names(server("alpha"), false),
        ListRequest::Started { generation: 1 }
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        supervisor.request_database_names(server("beta"), false),
        ListRequest::Started { generation: 2 }
    );

    assert_matches!(
        events.recv().await,
        Some(SupervisorEvent::DatabaseNames { generation: 2, ref names }) if names == &names_for("beta")
    );

    // Nothing else arrives from the superseded request.
    let extra = tokio::time::timeout(Duration::from_secs(30), events.recv()).await;
    assert!(extra.is_err());
    assert_eq!(connector.state.connects(), 2);
    assert_eq!(connector.state.closes(), 2);
}

// ---------------------------------------------------------------------------
// Test: request policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn same_server_unforced_is_unchanged() {
    let connector = Arc::new(FakeConnector::new(FakeConfig::default()));
    let (supervisor, mut events) = TaskSupervisor::new(Arc::clone(&connector));

    assert_matches!(
        supervisor.request_database_names(server("alpha"), false),
        ListRequest::Started { .. }
    );
    assert_matches!(events.recv().await, Some(SupervisorEvent::DatabaseNames { .. }));

    assert_eq!(
        supervisor.request_database_names(server("alpha"), false),
        ListRequest::Unchanged
    );
    assert_matches!(
        supervisor.request_database_names(server("alpha"), true),
        ListRequest::Started { .. }
    );
    assert_matches!(events.recv().await, Some(SupervisorEvent::DatabaseNames { .. }));
    assert_eq!(connector.state.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn pending_forced_listing_ignores_new_requests() {
    let connector = Arc::new(FakeConnector::new(FakeConfig {
        list_delays: HashMap::from([("alpha".to_string(), Duration::from_secs(5))]),
        ..Default::default()
    }));
    let (supervisor, mut events) = TaskSupervisor::new(connector);

    assert_matches!(
        supervisor.request_database_names(server("alpha"), true),
        ListRequest::Started { generation: 1 }
    );
    assert_eq!(
        supervisor.request_database_names(server("beta"), false),
        ListRequest::ForcedPending
    );
    assert_eq!(
        supervisor.request_database_names(server("beta"), true),
        ListRequest::ForcedPending
    );

    assert_matches!(
        events.recv().await,
        Some(SupervisorEvent::DatabaseNames { generation: 1, ref names }) if names == &names_for("alpha")
    );
    assert_eq!(*supervisor.list_state().borrow(), TaskState::Completed);
}

#[tokio::test]
async fn blank_server_clears_names_without_connecting() {
    let connector = Arc::new(FakeConnector::new(FakeConfig::default()));
    let (supervisor, mut events) = TaskSupervisor::new(Arc::clone(&connector));

    let request = supervisor.request_database_names(ConnectionDescriptor::integrated("  "), false);

    assert_eq!(request, ListRequest::Cleared { generation: 1 });
    assert_matches!(
        events.recv().await,
        Some(SupervisorEvent::DatabaseNames { generation: 1, ref names }) if names.is_empty()
    );
    assert_eq!(connector.state.connects(), 0);
}

#[tokio::test]
async fn forced_listing_failure_is_reported() {
    let connector = Arc::new(FakeConnector::new(FakeConfig {
        refuse_connections: true,
        ..Default::default()
    }));
    let (supervisor, mut events) = TaskSupervisor::new(connector);

    supervisor.request_database_names(server("alpha"), true);

    assert_matches!(
        events.recv().await,
        Some(SupervisorEvent::DatabaseNamesFailed { generation: 1, error: EngineError::Connection { .. } })
    );
    assert_eq!(*supervisor.list_state().borrow(), TaskState::Failed);
}

#[tokio::test(start_paused = true)]
async fn cancelled_listing_reports_cancelled() {
    let connector = Arc::new(FakeConnector::new(FakeConfig {
        list_delays: HashMap::from([("alpha".to_string(), Duration::from_secs(10))]),
        ..Default::default()
    }));
    let (supervisor, mut events) = TaskSupervisor::new(connector);

    supervisor.request_database_names(server("alpha"), false);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(supervisor.cancel_database_names());

    assert_matches!(
        events.recv().await,
        Some(SupervisorEvent::DatabaseNamesCancelled { generation: 1 })
    );
}

#[tokio::test(start_paused = true)]
async fn same_server_is_listed_again_after_cancel() {
    let connector = Arc::new(FakeConnector::new(FakeConfig {
        list_delays: HashMap::from([("alpha".to_string(), Duration::from_secs(10))]),
        ..Default::default()
    }));
    let (supervisor, mut events) = TaskSupervisor::new(connector);

    supervisor.request_database_names(server("alpha"), false);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(supervisor.cancel_database_names());
    assert_matches!(
        events.recv().await,
        Some(SupervisorEvent::DatabaseNamesCancelled { generation: 1 })
    );

    assert_eq!(
        supervisor.request_database_names(server("alpha"), false),
        ListRequest::Started { generation: 2 }
    );
    assert_matches!(
        events.recv().await,
        Some(SupervisorEvent::DatabaseNames { generation: 2, ref names }) if names == &names_for("alpha")
    );
}

// ---------------------------------------------------------------------------
// Test: terminal states hold and never fall back to Idle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_state_starts_idle_and_keeps_terminal_value() {
    let connector = Arc::new(FakeConnector::new(FakeConfig::default()));
    let (supervisor, mut events) = TaskSupervisor::new(connector);
    let state = supervisor.list_state();
    assert_eq!(*state.borrow(), TaskState::Idle);

    supervisor.request_database_names(server("alpha"), false);
    assert_matches!(events.recv().await, Some(SupervisorEvent::DatabaseNames { .. }));
    assert_eq!(*state.borrow(), TaskState::Completed);

    assert_eq!(
        supervisor.request_database_names(server("alpha"), false),
        ListRequest::Unchanged
    );
    assert_eq!(*state.borrow(), TaskState::Completed);
    assert_eq!(*supervisor.run_state().borrow(), TaskState::Idle);
}

// ---------------------------------------------------------------------------
// Test: shutdown waits for tasks to close their sessions
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_and_closes() {
    let connector = Arc::new(FakeConnector::new(FakeConfig {
        list_delays: HashMap::from([("alpha".to_string(), Duration::from_secs(60))]),
        ..Default::default()
    }));
    let (supervisor, _events) = TaskSupervisor::new(Arc::clone(&connector));

    supervisor.request_database_names(server("alpha"), false);
    tokio::time::sleep(Duration::from_millis(100)).await;
    supervisor.shutdown().await;

    assert_eq!(connector.state.connects(), 1);
    assert_eq!(connector.state.closes(), 1);
}
