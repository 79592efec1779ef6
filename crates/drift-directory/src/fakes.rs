//! In-memory fake run directory (testing only)
//!
//! `MemoryRunDirectory` satisfies the [`RunDirectory`] contract without any
//! network access and records every call, so tests can assert how often a
//! run was created.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::directory::*;
use crate::error::DirectoryError;
use crate::status::RunStatus;

/// A run queued through [`RunDirectory::create_run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRun {
    pub run_id: RunId,
    pub workspace_id: String,
    pub message: String,
}

#[derive(Debug, Default)]
struct DirectoryState {
    workspace: Option<Workspace>,
    /// (commit sha, run), in insertion order
    runs: Vec<(String, Run)>,
    events: HashMap<String, Vec<RunEvent>>,
    created: Vec<CreatedRun>,
    /// States handed out on successive reads of created runs
    created_progress: VecDeque<(RunStatus, bool)>,
    failures: HashMap<DirectoryOperation, String>,
    calls: Vec<DirectoryOperation>,
}

/// In-memory run directory backed by a single workspace.
#[derive(Debug, Default)]
pub struct MemoryRunDirectory {
    state: Mutex<DirectoryState>,
}

impl MemoryRunDirectory {
    /// Empty directory: every workspace lookup fails with `NotFound`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory holding one workspace whose current configuration points
    /// at `commit_sha`.
    pub fn with_workspace(target: WorkspaceTarget, commit_sha: &str) -> Self {
        let directory = Self::new();
        directory.set_workspace(Workspace {
            id: format!("ws-{}", target.name),
            target,
            current_configuration: Some(ConfigurationRevision {
                id: "cv-current".to_string(),
                commit_sha: Some(commit_sha.to_string()),
            }),
        });
        directory
    }

    pub fn set_workspace(&self, workspace: Workspace) {
        self.state.lock().unwrap().workspace = Some(workspace);
    }

    /// Add (or replace) a run associated with `commit_sha`.
    pub fn insert_run(&self, commit_sha: &str, run: Run) {
        let mut state = self.state.lock().unwrap();
        state.runs.retain(|(_, existing)| existing.id != run.id);
        state.runs.push((commit_sha.to_string(), run));
    }

    /// Replace the event log of a run.
    pub fn set_events(&self, run_id: &RunId, events: Vec<RunEvent>) {
        let mut state = self.state.lock().unwrap();
        state.events.insert(run_id.0.clone(), events);
    }

    /// Move an existing run to a new status.
    pub fn update_run(&self, run_id: &RunId, status: RunStatus, has_changes: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some((_, run)) = state.runs.iter_mut().find(|(_, r)| &r.id == run_id) {
            run.status = status;
            run.has_changes = has_changes;
        }
    }

    /// Script what successive `read_run` calls on created runs observe.
    pub fn queue_created_run_states(&self, states: Vec<(RunStatus, bool)>) {
        self.state.lock().unwrap().created_progress.extend(states);
    }

    /// Make `operation` fail with a transport error until cleared.
    pub fn fail_on(&self, operation: DirectoryOperation, message: &str) {
        let mut state = self.state.lock().unwrap();
        state.failures.insert(operation, message.to_string());
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    /// Runs queued through `create_run`, oldest first.
    pub fn created_runs(&self) -> Vec<CreatedRun> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn create_count(&self) -> usize {
        self.state.lock().unwrap().created.len()
    }

    /// Every operation invoked so far, in order.
    pub fn calls(&self) -> Vec<DirectoryOperation> {
        self.state.lock().unwrap().calls.clone()
    }

    fn enter(&self, operation: DirectoryOperation) -> DirectoryResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(operation);
        match state.failures.get(&operation) {
            Some(message) => Err(DirectoryError::Transport(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RunDirectory for MemoryRunDirectory {
    async fn workspace(&self, target: &WorkspaceTarget) -> DirectoryResult<Workspace> {
        self.enter(DirectoryOperation::WorkspaceLookup)?;
        let state = self.state.lock().unwrap();
        state
            .workspace
            .as_ref()
            .filter(|ws| &ws.target == target)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound {
                resource: format!("workspace {}", target),
            })
    }

    async fn latest_run(
        &self,
        _workspace: &Workspace,
        commit_sha: &str,
    ) -> DirectoryResult<Option<Run>> {
        self.enter(DirectoryOperation::ListRuns)?;
        let state = self.state.lock().unwrap();
        // later insertions win ties, matching "newest first" on equal timestamps
        let latest = state
            .runs
            .iter()
            .enumerate()
            .filter(|(_, (sha, _))| sha == commit_sha)
            .max_by_key(|(idx, (_, run))| (run.created_at, *idx))
            .map(|(_, (_, run))| run.clone());
        Ok(latest)
    }

    async fn run_events(&self, run_id: &RunId) -> DirectoryResult<Vec<RunEvent>> {
        self.enter(DirectoryOperation::ListRunEvents)?;
        let state = self.state.lock().unwrap();
        if !state.runs.iter().any(|(_, r)| &r.id == run_id) {
            return Err(DirectoryError::NotFound {
                resource: format!("run {}", run_id),
            });
        }
        Ok(state.events.get(&run_id.0).cloned().unwrap_or_default())
    }

    async fn create_run(&self, workspace: &Workspace, message: &str) -> DirectoryResult<Run> {
        self.enter(DirectoryOperation::CreateRun)?;
        let mut state = self.state.lock().unwrap();
        let run = Run {
            id: RunId(format!("run-{}", uuid::Uuid::new_v4().simple())),
            status: RunStatus::Pending,
            created_at: Utc::now(),
            has_changes: false,
            message: Some(message.to_string()),
        };
        let commit_sha = workspace
            .current_configuration
            .as_ref()
            .and_then(|cv| cv.commit_sha.clone())
            .unwrap_or_default();
        state.runs.push((commit_sha, run.clone()));
        state.created.push(CreatedRun {
            run_id: run.id.clone(),
            workspace_id: workspace.id.clone(),
            message: message.to_string(),
        });
        Ok(run)
    }

    async fn read_run(&self, run_id: &RunId) -> DirectoryResult<Run> {
        self.enter(DirectoryOperation::ReadRun)?;
        let mut state = self.state.lock().unwrap();
        let was_created = state.created.iter().any(|c| &c.run_id == run_id);
        let next = if was_created {
            state.created_progress.pop_front()
        } else {
            None
        };
        let run = state
            .runs
            .iter_mut()
            .find(|(_, r)| &r.id == run_id)
            .map(|(_, r)| r)
            .ok_or_else(|| DirectoryError::NotFound {
                resource: format!("run {}", run_id),
            })?;
        if let Some((status, has_changes)) = next {
            run.status = status;
            run.has_changes = has_changes;
        }
        Ok(run.clone())
    }
}
