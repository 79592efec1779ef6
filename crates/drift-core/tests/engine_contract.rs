//! Behavioral contract of the drift engine against the in-memory directory.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use drift_core::{
    CheckPolicy, CheckRequest, CreationMode, DriftEngine, DriftError, ThrottleReference, Version,
};
use drift_directory::fakes::MemoryRunDirectory;
use drift_directory::{
    ConfigurationRevision, DirectoryOperation, Run, RunEvent, RunId, RunStatus, Workspace,
    WorkspaceTarget,
};

const COMMIT: &str = "abc123";
const PREVIOUS: &str = "run-previous";

fn target() -> WorkspaceTarget {
    WorkspaceTarget::new("acme", "prod")
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

fn secs(n: i64) -> chrono::Duration {
    chrono::Duration::seconds(n)
}

fn run(id: &str, status: &str, has_changes: bool) -> Run {
    Run {
        id: RunId::from(id),
        status: RunStatus::from(status),
        created_at: t0(),
        has_changes,
        message: None,
    }
}

/// Directory with one latest run; terminal runs get a `finished` event at
/// `t0 + 60s`.
fn directory_with(latest: Run) -> Arc<MemoryRunDirectory> {
    let directory = Arc::new(MemoryRunDirectory::with_workspace(target(), COMMIT));
    let id = latest.id.clone();
    directory.insert_run(COMMIT, latest);
    directory.set_events(
        &id,
        vec![
            RunEvent::new("queued", t0()),
            RunEvent::new("planned", t0() + secs(30)),
            RunEvent::new("finished", t0() + secs(60)),
        ],
    );
    directory
}

fn engine(directory: &Arc<MemoryRunDirectory>, policy: CheckPolicy) -> DriftEngine {
    DriftEngine::new(directory.clone(), policy).expect("valid policy")
}

fn request() -> CheckRequest {
    CheckRequest::new(target(), Some(Version::new(PREVIOUS)))
}

fn finished() -> DateTime<Utc> {
    t0() + secs(60)
}

// ===========================================================================
// Non-final runs
// ===========================================================================

#[tokio::test]
async fn non_final_run_echoes_previous_and_creates_nothing() {
    for status in ["pending", "planning", "applying", "cost_estimating", "policy_checking"] {
        let directory = directory_with(run("run-1", status, false));
        let engine = engine(&directory, CheckPolicy::default());

        let versions = engine
            .check_at(&request(), finished() + secs(3600))
            .await
            .unwrap();

        assert_eq!(versions, vec![Version::new(PREVIOUS)], "{status}");
        assert_eq!(directory.create_count(), 0, "{status}");
        assert!(!directory.calls().contains(&DirectoryOperation::ListRunEvents));
    }
}

#[tokio::test]
async fn unrecognized_status_is_treated_as_in_flight() {
    let directory = directory_with(run("run-1", "some_future_state", true));
    let engine = engine(&directory, CheckPolicy::default());

    let versions = engine
        .check_at(&request(), finished() + secs(3600))
        .await
        .unwrap();

    assert_eq!(versions, vec![Version::new(PREVIOUS)]);
    assert_eq!(directory.create_count(), 0);
}

#[tokio::test]
async fn consecutive_checks_without_remote_change_are_identical() {
    let directory = directory_with(run("run-1", "planning", false));
    let engine = engine(&directory, CheckPolicy::default());
    let now = finished() + secs(3600);

    let first = engine.check_at(&request(), now).await.unwrap();
    let second = engine.check_at(&request(), now).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(directory.create_count(), 0);
}

// ===========================================================================
// Drift
// ===========================================================================

#[tokio::test]
async fn planned_run_with_changes_reports_its_id() {
    let directory = directory_with(run("run-123", "planned", true));
    let engine = engine(&directory, CheckPolicy::default());

    let versions = engine.check_at(&request(), finished()).await.unwrap();

    assert_eq!(versions, vec![Version::new("run-123")]);
    assert_eq!(directory.create_count(), 0);
}

#[tokio::test]
async fn drift_is_reported_regardless_of_elapsed_time() {
    for elapsed in [0, 2, 5, 86_400] {
        let directory = directory_with(run("run-123", "planned", true));
        let engine = engine(&directory, CheckPolicy::default());

        let versions = engine
            .check_at(&request(), finished() + secs(elapsed))
            .await
            .unwrap();

        assert_eq!(versions, vec![Version::new("run-123")], "elapsed {elapsed}");
        assert_eq!(directory.create_count(), 0);
    }
}

// ===========================================================================
// Throttling
// ===========================================================================

#[tokio::test]
async fn settled_run_inside_polling_period_is_throttled() {
    let directory = directory_with(run("run-1", "applied", false));
    let engine = engine(&directory, CheckPolicy::new(Duration::from_secs(5)));

    let versions = engine
        .check_at(&request(), finished() + secs(2))
        .await
        .unwrap();

    assert_eq!(versions, vec![Version::new(PREVIOUS)]);
    assert_eq!(directory.create_count(), 0);
}

#[tokio::test]
async fn settled_run_past_polling_period_creates_exactly_one_run() {
    let directory = directory_with(run("run-1", "applied", false));
    let engine = engine(&directory, CheckPolicy::new(Duration::from_secs(5)));

    let versions = engine
        .check_at(&request(), finished() + secs(10))
        .await
        .unwrap();

    assert_eq!(versions, vec![Version::new(PREVIOUS)]);
    assert_eq!(directory.create_count(), 1);
    let created = &directory.created_runs()[0];
    assert_eq!(created.workspace_id, "ws-prod");
    assert_eq!(created.message, "Triggered by tfe-drift-resource");
}

#[tokio::test]
async fn polling_period_boundary_creates_a_run() {
    let directory = directory_with(run("run-1", "planned_and_finished", false));
    let engine = engine(&directory, CheckPolicy::new(Duration::from_secs(5)));

    engine
        .check_at(&request(), finished() + secs(5))
        .await
        .unwrap();

    assert_eq!(directory.create_count(), 1);
}

#[tokio::test]
async fn throttle_measures_from_completion_not_creation() {
    // created at t0, finished at t0+60s: 30s after completion is still
    // 90s after creation
    let directory = directory_with(run("run-1", "errored", false));
    let engine = engine(&directory, CheckPolicy::new(Duration::from_secs(60)));

    engine
        .check_at(&request(), finished() + secs(30))
        .await
        .unwrap();

    assert_eq!(directory.create_count(), 0);
}

#[tokio::test]
async fn throttle_from_created_skips_event_log() {
    let directory = directory_with(run("run-1", "errored", false));
    let policy =
        CheckPolicy::new(Duration::from_secs(60)).with_throttle_from(ThrottleReference::Created);
    let engine = engine(&directory, policy);

    engine
        .check_at(&request(), finished() + secs(30))
        .await
        .unwrap();

    assert_eq!(directory.create_count(), 1);
    assert!(!directory.calls().contains(&DirectoryOperation::ListRunEvents));
}

#[tokio::test]
async fn future_completion_time_counts_as_just_finished() {
    let directory = directory_with(run("run-1", "applied", false));
    let engine = engine(&directory, CheckPolicy::new(Duration::from_secs(5)));

    engine.check_at(&request(), t0()).await.unwrap();

    assert_eq!(directory.create_count(), 0);
}

#[tokio::test]
async fn created_run_blocks_further_creation_on_next_check() {
    let directory = directory_with(run("run-1", "applied", false));
    let engine = engine(&directory, CheckPolicy::new(Duration::from_secs(5)));
    let now = finished() + secs(10);

    let first = engine.check_at(&request(), now).await.unwrap();
    let second = engine.check_at(&request(), now).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(directory.create_count(), 1);
}

#[tokio::test]
async fn custom_run_message_is_used() {
    let directory = directory_with(run("run-1", "discarded", false));
    let policy = CheckPolicy::default().with_run_message("nightly drift check");
    let engine = engine(&directory, policy);

    engine
        .check_at(&request(), finished() + secs(10))
        .await
        .unwrap();

    assert_eq!(directory.created_runs()[0].message, "nightly drift check");
}

// ===========================================================================
// First check
// ===========================================================================

#[tokio::test]
async fn first_check_reports_latest_run_id() {
    let directory = directory_with(run("run-1", "applying", false));
    let engine = engine(&directory, CheckPolicy::default());

    let versions = engine
        .check_at(&CheckRequest::new(target(), None), finished())
        .await
        .unwrap();

    assert_eq!(versions, vec![Version::new("run-1")]);
}

// ===========================================================================
// Failures
// ===========================================================================

#[tokio::test]
async fn missing_finished_event_fails_without_creating() {
    let directory = directory_with(run("run-1", "applied", false));
    directory.set_events(
        &RunId::from("run-1"),
        vec![
            RunEvent::new("queued", t0()),
            RunEvent::new("applied", t0() + secs(50)),
        ],
    );
    let engine = engine(&directory, CheckPolicy::default());

    let err = engine
        .check_at(&request(), finished() + secs(3600))
        .await
        .unwrap_err();

    assert!(matches!(err, DriftError::MissingFinishedEvent { ref run_id } if run_id == "run-1"));
    assert_eq!(directory.create_count(), 0);
}

#[tokio::test]
async fn workspace_without_configuration_is_unavailable() {
    let directory = Arc::new(MemoryRunDirectory::new());
    directory.set_workspace(Workspace {
        id: "ws-prod".to_string(),
        target: target(),
        current_configuration: None,
    });
    let engine = engine(&directory, CheckPolicy::default());

    let err = engine.check_at(&request(), t0()).await.unwrap_err();

    assert!(matches!(err, DriftError::ConfigurationUnavailable { .. }));
    assert!(!directory.calls().contains(&DirectoryOperation::ListRuns));
}

#[tokio::test]
async fn configuration_without_commit_is_unavailable() {
    for commit_sha in [None, Some(String::new())] {
        let directory = Arc::new(MemoryRunDirectory::new());
        directory.set_workspace(Workspace {
            id: "ws-prod".to_string(),
            target: target(),
            current_configuration: Some(ConfigurationRevision {
                id: "cv-upload".to_string(),
                commit_sha,
            }),
        });
        let engine = engine(&directory, CheckPolicy::default());

        let err = engine.check_at(&request(), t0()).await.unwrap_err();

        match err {
            DriftError::ConfigurationUnavailable { workspace, reason } => {
                assert_eq!(workspace, "acme/prod");
                assert!(reason.contains("cv-upload"));
            }
            other => panic!("expected ConfigurationUnavailable, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn no_runs_for_commit_is_surfaced() {
    let directory = Arc::new(MemoryRunDirectory::with_workspace(target(), COMMIT));
    directory.insert_run("other-commit", run("run-1", "applied", false));
    let engine = engine(&directory, CheckPolicy::default());

    let err = engine.check_at(&request(), t0()).await.unwrap_err();

    match err {
        DriftError::NoRunsFound {
            commit_sha,
            configuration,
            ..
        } => {
            assert_eq!(commit_sha, COMMIT);
            assert_eq!(configuration, "cv-current");
        }
        other => panic!("expected NoRunsFound, got {other:?}"),
    }
}

#[tokio::test]
async fn remote_failures_are_wrapped_with_operation() {
    let cases = [
        DirectoryOperation::WorkspaceLookup,
        DirectoryOperation::ListRuns,
        DirectoryOperation::ListRunEvents,
        DirectoryOperation::CreateRun,
    ];

    for failing in cases {
        let directory = directory_with(run("run-1", "applied", false));
        directory.fail_on(failing, "connection reset by peer");
        let engine = engine(&directory, CheckPolicy::default());

        let err = engine
            .check_at(&request(), finished() + secs(10))
            .await
            .unwrap_err();

        match err {
            DriftError::RemoteUnavailable { operation, .. } => {
                assert_eq!(operation, failing)
            }
            other => panic!("expected RemoteUnavailable for {failing}, got {other:?}"),
        }
        assert_eq!(directory.calls().last(), Some(&failing));
    }
}

#[tokio::test]
async fn engine_keeps_the_policy_it_was_built_with() {
    let directory = directory_with(run("run-1", "applied", false));
    let policy = CheckPolicy::new(Duration::from_secs(900)).with_run_message("hourly");
    let engine = engine(&directory, policy.clone());

    assert_eq!(engine.policy(), &policy);
}

#[tokio::test]
async fn invalid_policy_is_rejected_at_construction() {
    let directory = directory_with(run("run-1", "applied", false));
    let result = DriftEngine::new(directory, CheckPolicy::new(Duration::ZERO));

    assert!(matches!(result, Err(DriftError::InvalidPolicy(_))));
}

// ===========================================================================
// Await policy
// ===========================================================================

fn await_policy(timeout_secs: u64) -> CheckPolicy {
    CheckPolicy::new(Duration::from_secs(5)).with_creation(CreationMode::Await {
        interval: Duration::from_secs(10),
        timeout: Duration::from_secs(timeout_secs),
    })
}

#[tokio::test(start_paused = true)]
async fn await_reports_new_run_when_it_drifts() {
    let directory = directory_with(run("run-1", "applied", false));
    directory.queue_created_run_states(vec![
        (RunStatus::Planning, false),
        (RunStatus::Planned, true),
    ]);
    let engine = engine(&directory, await_policy(600));

    let versions = engine
        .check_at(&request(), finished() + secs(10))
        .await
        .unwrap();

    let created = directory.created_runs();
    assert_eq!(created.len(), 1);
    assert_eq!(versions, vec![Version::from(&created[0].run_id)]);
}

#[tokio::test(start_paused = true)]
async fn await_echoes_previous_when_new_run_has_no_changes() {
    let directory = directory_with(run("run-1", "applied", false));
    directory.queue_created_run_states(vec![
        (RunStatus::Planning, false),
        (RunStatus::PlannedAndFinished, false),
    ]);
    let engine = engine(&directory, await_policy(600));

    let versions = engine
        .check_at(&request(), finished() + secs(10))
        .await
        .unwrap();

    assert_eq!(versions, vec![Version::new(PREVIOUS)]);
}

#[tokio::test(start_paused = true)]
async fn await_times_out_on_stuck_run() {
    let directory = directory_with(run("run-1", "applied", false));
    let engine = engine(&directory, await_policy(30));

    let err = engine
        .check_at(&request(), finished() + secs(10))
        .await
        .unwrap_err();

    assert!(matches!(err, DriftError::AwaitTimeout { waited_secs: 30, .. }));
    assert_eq!(directory.create_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn await_surfaces_read_failure_as_remote_error() {
    let directory = directory_with(run("run-1", "applied", false));
    directory.fail_on(DirectoryOperation::ReadRun, "connection reset by peer");
    let engine = engine(&directory, await_policy(600));

    let err = engine
        .check_at(&request(), finished() + secs(10))
        .await
        .unwrap_err();

    match err {
        DriftError::RemoteUnavailable {
            operation, target, ..
        } => {
            assert_eq!(operation, DirectoryOperation::ReadRun);
            assert_eq!(target, directory.created_runs()[0].run_id.to_string());
        }
        other => panic!("expected RemoteUnavailable for run read, got {other:?}"),
    }
    assert_eq!(directory.create_count(), 1);
}
