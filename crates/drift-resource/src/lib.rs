//! Concourse `check` for Terraform Cloud drift detection.
//!
//! Reads the resource input, runs one drift-check cycle against the
//! workspace it names, and reports the resulting version list.

pub mod input;
pub mod output;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use drift_core::{DriftEngine, RunDirectory, Version};

pub use input::{CheckInput, InputError};
pub use output::write_versions;

/// Run one check cycle for `input` against `directory`.
pub async fn run_check(
    input: &CheckInput,
    directory: Arc<dyn RunDirectory>,
) -> drift_core::Result<Vec<Version>> {
    run_check_at(input, directory, Utc::now()).await
}

/// [`run_check`] with an explicit clock.
pub async fn run_check_at(
    input: &CheckInput,
    directory: Arc<dyn RunDirectory>,
    now: DateTime<Utc>,
) -> drift_core::Result<Vec<Version>> {
    let engine = DriftEngine::new(directory, input.policy())?;
    engine.check_at(&input.request(), now).await
}
