//! Drift polling engine.
//!
//! One call to [`DriftEngine::check`] is one check cycle:
//!
//! 1. resolve the workspace and the commit of its current configuration
//! 2. fetch the newest run for that commit
//! 3. classify it
//! 4. in flight: echo the previous version, create nothing
//! 5. drifted: report the run's id
//! 6. settled: once the polling period has elapsed since the run's reference
//!    time, queue a speculative plan and echo the previous version
//!
//! The engine keeps no state between cycles; everything is rebuilt from the
//! directory on each call.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use drift_directory::{
    DirectoryOperation, Run, RunDirectory, RunEvent, Workspace, WorkspaceTarget,
};
use tracing::Instrument;

use crate::classify::{classify, RunClass};
use crate::error::{DriftError, Result};
use crate::obs;
use crate::policy::{CheckPolicy, CreationMode, ThrottleReference};
use crate::version::Version;

/// Input of one check cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRequest {
    pub target: WorkspaceTarget,
    /// Last version reported to the scheduler; `None` on the first check.
    pub previous: Option<Version>,
}

impl CheckRequest {
    pub fn new(target: WorkspaceTarget, previous: Option<Version>) -> Self {
        Self { target, previous }
    }
}

/// Drift-check engine bound to a run directory and a policy.
pub struct DriftEngine {
    directory: Arc<dyn RunDirectory>,
    policy: CheckPolicy,
}

impl DriftEngine {
    /// Create an engine; fails if the policy is invalid.
    pub fn new(directory: Arc<dyn RunDirectory>, policy: CheckPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self { directory, policy })
    }

    pub fn policy(&self) -> &CheckPolicy {
        &self.policy
    }

    /// Run one check cycle using the current UTC time.
    pub async fn check(&self, request: &CheckRequest) -> Result<Vec<Version>> {
        self.check_at(request, Utc::now()).await
    }

    /// Run one check cycle as if it were `now` (used for deterministic tests).
    ///
    /// Always returns exactly one version on success.
    pub async fn check_at(
        &self,
        request: &CheckRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<Version>> {
        self.run_cycle(request, now)
            .instrument(obs::check_span(&request.target))
            .await
    }

    async fn run_cycle(&self, request: &CheckRequest, now: DateTime<Utc>) -> Result<Vec<Version>> {
        let workspace = self
            .directory
            .workspace(&request.target)
            .await
            .map_err(|e| {
                DriftError::remote(
                    DirectoryOperation::WorkspaceLookup,
                    request.target.to_string(),
                    e,
                )
            })?;

        let latest = self.latest_run(&workspace).await?;
        let class = classify(&latest);
        obs::emit_latest_run(&latest, class);

        // First check: there is nothing to echo, so the latest run becomes
        // the initial version.
        let unchanged = request
            .previous
            .clone()
            .unwrap_or_else(|| Version::from(&latest.id));

        match class {
            RunClass::NonFinal => {
                obs::emit_yield(&latest.id, "run is not in a final state");
                Ok(vec![unchanged])
            }
            RunClass::FinalWithDrift => {
                obs::emit_drift_detected(&latest.id);
                Ok(vec![Version::from(&latest.id)])
            }
            RunClass::FinalNoChange => {
                let reference = self.reference_time(&latest).await?;
                // a reference in the future (clock skew) counts as just finished
                let elapsed = (now - reference).to_std().unwrap_or(Duration::ZERO);

                if elapsed < self.policy.polling_period {
                    obs::emit_throttled(&latest.id, elapsed, self.policy.polling_period);
                    return Ok(vec![unchanged]);
                }

                let created = self
                    .directory
                    .create_run(&workspace, &self.policy.run_message)
                    .await
                    .map_err(|e| {
                        DriftError::remote(DirectoryOperation::CreateRun, workspace.id.clone(), e)
                    })?;
                obs::emit_run_created(&created.id, elapsed);

                match self.policy.creation {
                    CreationMode::Deferred => Ok(vec![unchanged]),
                    CreationMode::Await { interval, timeout } => {
                        self.await_created(created, interval, timeout, unchanged)
                            .await
                    }
                }
            }
        }
    }

    /// Newest run for the commit of the workspace's current configuration.
    async fn latest_run(&self, workspace: &Workspace) -> Result<Run> {
        let target = workspace.target.to_string();
        let configuration = workspace.current_configuration.as_ref().ok_or_else(|| {
            DriftError::ConfigurationUnavailable {
                workspace: target.clone(),
                reason: "workspace has no current configuration version".to_string(),
            }
        })?;
        let commit_sha = configuration
            .commit_sha
            .as_deref()
            .filter(|sha| !sha.is_empty())
            .ok_or_else(|| DriftError::ConfigurationUnavailable {
                workspace: target.clone(),
                reason: format!(
                    "configuration version {} has no commit sha",
                    configuration.id
                ),
            })?;

        self.directory
            .latest_run(workspace, commit_sha)
            .await
            .map_err(|e| {
                DriftError::remote(
                    DirectoryOperation::ListRuns,
                    format!("{}@{}", workspace.id, commit_sha),
                    e,
                )
            })?
            .ok_or_else(|| DriftError::NoRunsFound {
                workspace: target,
                configuration: configuration.id.clone(),
                commit_sha: commit_sha.to_string(),
            })
    }

    /// Timestamp the polling period is measured from.
    async fn reference_time(&self, run: &Run) -> Result<DateTime<Utc>> {
        match self.policy.throttle_from {
            ThrottleReference::Created => Ok(run.created_at),
            ThrottleReference::Finished => {
                let events = self.directory.run_events(&run.id).await.map_err(|e| {
                    DriftError::remote(DirectoryOperation::ListRunEvents, run.id.to_string(), e)
                })?;
                finished_at(&events).ok_or_else(|| DriftError::MissingFinishedEvent {
                    run_id: run.id.to_string(),
                })
            }
        }
    }

    /// Re-read a freshly created run until it settles or `timeout` elapses.
    async fn await_created(
        &self,
        mut run: Run,
        interval: Duration,
        timeout: Duration,
        unchanged: Version,
    ) -> Result<Vec<Version>> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let class = classify(&run);
            obs::emit_await_progress(&run, class);
            match class {
                RunClass::FinalWithDrift => {
                    obs::emit_drift_detected(&run.id);
                    return Ok(vec![Version::from(&run.id)]);
                }
                RunClass::FinalNoChange => return Ok(vec![unchanged]),
                RunClass::NonFinal => {}
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(DriftError::AwaitTimeout {
                    run_id: run.id.to_string(),
                    waited_secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(interval.min(deadline - now)).await;

            run = self.directory.read_run(&run.id).await.map_err(|e| {
                DriftError::remote(DirectoryOperation::ReadRun, run.id.to_string(), e)
            })?;
        }
    }
}

/// Timestamp of the last `finished` event in an oldest-first log.
fn finished_at(events: &[RunEvent]) -> Option<DateTime<Utc>> {
    events
        .iter()
        .rev()
        .find(|e| e.is_finished())
        .map(|e| e.created_at)
}
