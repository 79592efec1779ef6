//! Drift-Directory: Run Directory for tfe-drift
//!
//! This crate is the only place that talks to the remote provisioning
//! service. The drift engine consumes it through the [`RunDirectory`] trait
//! and never sees HTTP.
//!
//! ## Key Components
//!
//! - `RunDirectory`: workspace lookup, latest run, run events, run creation
//! - `RunStatus`: open vocabulary of remote run states
//! - `TfeDirectory`: Terraform Cloud / Enterprise JSON:API backend
//! - `fakes::MemoryRunDirectory`: in-memory backend for tests

mod error;
pub mod directory;
pub mod fakes;
pub mod status;
pub mod tfe;

pub use directory::{
    ConfigurationRevision, DirectoryOperation, DirectoryResult, Run, RunDirectory, RunEvent,
    RunId, Workspace, WorkspaceTarget, FINISHED_ACTION,
};
pub use error::DirectoryError;
pub use status::RunStatus;
pub use tfe::{TfeConfig, TfeDirectory, DEFAULT_ADDRESS};
