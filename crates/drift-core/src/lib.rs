//! Drift Core Library
//!
//! The drift-check decision engine: inspect the newest run of a workspace,
//! classify it, and decide whether to wait, report drift, or queue a new
//! speculative plan.

pub mod classify;
pub mod engine;
pub mod error;
pub mod obs;
pub mod policy;
pub mod telemetry;
pub mod version;

pub use classify::{classify, RunClass};
pub use engine::{CheckRequest, DriftEngine};
pub use error::{DriftError, Result};
pub use policy::{
    CheckPolicy, CreationMode, ThrottleReference, DEFAULT_AWAIT_INTERVAL, DEFAULT_AWAIT_TIMEOUT,
    DEFAULT_POLLING_PERIOD, DEFAULT_RUN_MESSAGE,
};
pub use telemetry::init_tracing;
pub use version::Version;

pub use drift_directory::{
    DirectoryError, DirectoryOperation, Run, RunDirectory, RunEvent, RunId, RunStatus, Workspace,
    WorkspaceTarget,
};
