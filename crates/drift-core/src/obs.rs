//! Structured observability hooks for the drift check.
//!
//! One span per check cycle plus an event for every decision the engine
//! makes, so a failed or surprising check can be read back from the logs
//! without re-querying the remote service.

use std::time::Duration;

use drift_directory::{Run, RunId, WorkspaceTarget};
use tracing::{info, info_span, Span};

use crate::classify::RunClass;

/// Span covering one check cycle for a workspace.
pub fn check_span(target: &WorkspaceTarget) -> Span {
    info_span!(
        "drift.check",
        organization = %target.organization,
        workspace = %target.name,
    )
}

/// Emit event: latest run fetched and classified.
pub fn emit_latest_run(run: &Run, class: RunClass) {
    info!(
        event = "check.latest_run",
        run_id = %run.id,
        status = %run.status,
        has_changes = run.has_changes,
        class = %class,
    );
}

/// Emit event: yielding to a run that is still in flight.
pub fn emit_yield(run_id: &RunId, reason: &str) {
    info!(event = "check.yield", run_id = %run_id, reason = reason);
}

/// Emit event: drift detected on a planned run.
pub fn emit_drift_detected(run_id: &RunId) {
    info!(event = "check.drift_detected", run_id = %run_id);
}

/// Emit event: polling period has not elapsed yet.
pub fn emit_throttled(run_id: &RunId, elapsed: Duration, period: Duration) {
    info!(
        event = "check.throttled",
        run_id = %run_id,
        elapsed_secs = elapsed.as_secs(),
        period_secs = period.as_secs(),
    );
}

/// Emit event: a new speculative run was queued.
pub fn emit_run_created(run_id: &RunId, elapsed: Duration) {
    info!(
        event = "check.run_created",
        run_id = %run_id,
        elapsed_secs = elapsed.as_secs(),
    );
}

/// Emit event: progress while awaiting a created run.
pub fn emit_await_progress(run: &Run, class: RunClass) {
    tracing::debug!(
        event = "check.await_progress",
        run_id = %run.id,
        status = %run.status,
        class = %class,
    );
}
