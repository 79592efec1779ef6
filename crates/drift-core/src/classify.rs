//! Run state classification.

use drift_directory::{Run, RunStatus};
use serde::{Deserialize, Serialize};

/// What a run's state means for the drift check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunClass {
    /// Still progressing remotely (includes unrecognized statuses).
    NonFinal,
    /// Terminal, nothing left to confirm.
    FinalNoChange,
    /// Plan finished with changes and is waiting for confirmation.
    FinalWithDrift,
}

impl RunClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunClass::NonFinal => "non_final",
            RunClass::FinalNoChange => "final_no_change",
            RunClass::FinalWithDrift => "final_with_drift",
        }
    }
}

impl std::fmt::Display for RunClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a run by status and `has_changes`.
pub fn classify(run: &Run) -> RunClass {
    match &run.status {
        RunStatus::Planned if run.has_changes => RunClass::FinalWithDrift,
        RunStatus::PlannedAndFinished
        | RunStatus::Applied
        | RunStatus::Discarded
        | RunStatus::Errored
        | RunStatus::Canceled
        | RunStatus::ForceCanceled
        | RunStatus::PolicySoftFailed => RunClass::FinalNoChange,
        // Unknown statuses land here too: never trigger on a state we can't read.
        _ => RunClass::NonFinal,
    }
}
