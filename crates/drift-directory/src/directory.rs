//! Run directory trait definitions
//!
//! The directory is the engine's whole view of the remote service:
//! - workspace lookup (id + current configuration revision)
//! - newest run for a commit
//! - lifecycle events of a run
//! - run creation and re-reads
//!
//! The trait is async and backend-agnostic. An in-memory fake is provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DirectoryError;
use crate::status::RunStatus;

/// Result type for directory operations
pub type DirectoryResult<T> = std::result::Result<T, DirectoryError>;

/// Event action that marks a run's terminal transition.
pub const FINISHED_ACTION: &str = "finished";

// ---------------------------------------------------------------------------
// Workspaces
// ---------------------------------------------------------------------------

/// Organization + workspace name, as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceTarget {
    pub organization: String,
    pub name: String,
}

impl WorkspaceTarget {
    pub fn new(organization: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for WorkspaceTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.organization, self.name)
    }
}

/// Versioned snapshot of the workspace's declared configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationRevision {
    /// Configuration version id (e.g. `cv-abc123`)
    pub id: String,
    /// Source commit, absent for CLI/API uploads
    pub commit_sha: Option<String>,
}

/// A resolved remote workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// Remote id (e.g. `ws-abc123`)
    pub id: String,
    pub target: WorkspaceTarget,
    pub current_configuration: Option<ConfigurationRevision>,
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// Remote run identifier. Opaque to this system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RunId {
    fn from(id: &str) -> Self {
        RunId(id.to_string())
    }
}

/// One plan/apply execution on the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    /// Set once planning completes
    pub has_changes: bool,
    pub message: Option<String>,
}

/// A single lifecycle event of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEvent {
    /// Event action (e.g. "queued", "planned", "finished")
    pub action: String,
    pub created_at: DateTime<Utc>,
}

impl RunEvent {
    pub fn new(action: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            action: action.into(),
            created_at,
        }
    }

    /// Whether this event marks the run's terminal transition.
    pub fn is_finished(&self) -> bool {
        self.action == FINISHED_ACTION
    }
}

// ---------------------------------------------------------------------------
// RunDirectory
// ---------------------------------------------------------------------------

/// Operations exposed by a run directory, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryOperation {
    WorkspaceLookup,
    ListRuns,
    ListRunEvents,
    CreateRun,
    ReadRun,
}

impl DirectoryOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectoryOperation::WorkspaceLookup => "workspace lookup",
            DirectoryOperation::ListRuns => "run listing",
            DirectoryOperation::ListRunEvents => "run event listing",
            DirectoryOperation::CreateRun => "run creation",
            DirectoryOperation::ReadRun => "run read",
        }
    }
}

impl std::fmt::Display for DirectoryOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote run directory.
///
/// Guarantees:
/// - `latest_run` returns the newest run for the commit, or `None`.
/// - `run_events` returns events oldest first.
/// - Nothing here retries; failures surface to the caller as-is.
#[async_trait]
pub trait RunDirectory: Send + Sync {
    /// Resolve a workspace and its current configuration revision.
    async fn workspace(&self, target: &WorkspaceTarget) -> DirectoryResult<Workspace>;

    /// Newest run associated with `commit_sha` (page size 1, newest first).
    async fn latest_run(
        &self,
        workspace: &Workspace,
        commit_sha: &str,
    ) -> DirectoryResult<Option<Run>>;

    /// Lifecycle events of a run, oldest first.
    async fn run_events(&self, run_id: &RunId) -> DirectoryResult<Vec<RunEvent>>;

    /// Queue a new run against the workspace.
    async fn create_run(&self, workspace: &Workspace, message: &str) -> DirectoryResult<Run>;

    /// Re-read a single run.
    async fn read_run(&self, run_id: &RunId) -> DirectoryResult<Run>;
}
