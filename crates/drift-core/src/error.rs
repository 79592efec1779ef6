//! Error taxonomy for the drift check.

use drift_directory::{DirectoryError, DirectoryOperation};

/// Errors that end a check cycle. None are retried internally.
#[derive(Debug, thiserror::Error)]
pub enum DriftError {
    #[error("workspace {workspace} has no usable configuration: {reason}")]
    ConfigurationUnavailable { workspace: String, reason: String },

    #[error(
        "no runs found for commit \"{commit_sha}\" of configuration version \"{configuration}\" \
         in workspace {workspace}"
    )]
    NoRunsFound {
        workspace: String,
        configuration: String,
        commit_sha: String,
    },

    #[error("run {run_id} is final but its event log has no \"finished\" event")]
    MissingFinishedEvent { run_id: String },

    #[error("{operation} failed for {target}: {source}")]
    RemoteUnavailable {
        operation: DirectoryOperation,
        target: String,
        #[source]
        source: DirectoryError,
    },

    #[error("run {run_id} did not reach a final state within {waited_secs}s")]
    AwaitTimeout { run_id: String, waited_secs: u64 },

    #[error("invalid check policy: {0}")]
    InvalidPolicy(String),
}

impl DriftError {
    pub(crate) fn remote(
        operation: DirectoryOperation,
        target: impl Into<String>,
        source: DirectoryError,
    ) -> Self {
        DriftError::RemoteUnavailable {
            operation,
            target: target.into(),
            source,
        }
    }
}

/// Result type for drift-check operations.
pub type Result<T> = std::result::Result<T, DriftError>;
