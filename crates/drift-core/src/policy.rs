//! Check policy: throttling and run-creation behavior.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DriftError, Result};

/// Minimum interval between drift runs when none is configured.
pub const DEFAULT_POLLING_PERIOD: Duration = Duration::from_secs(5);

/// Message attached to runs queued by the drift check.
pub const DEFAULT_RUN_MESSAGE: &str = "Triggered by tfe-drift-resource";

pub const DEFAULT_AWAIT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_AWAIT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Which timestamp of the latest run the polling period is measured from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleReference {
    /// Time of the last `finished` event in the run's event log.
    #[default]
    Finished,
    /// The run's creation time. Under-throttles slow runs.
    Created,
}

/// What happens after a new run has been queued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CreationMode {
    /// Return immediately; a later check observes the run.
    #[default]
    Deferred,
    /// Re-read the run until it leaves the in-flight states.
    Await { interval: Duration, timeout: Duration },
}

/// Settings of one check cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckPolicy {
    pub polling_period: Duration,
    pub throttle_from: ThrottleReference,
    pub run_message: String,
    pub creation: CreationMode,
}

impl Default for CheckPolicy {
    fn default() -> Self {
        Self {
            polling_period: DEFAULT_POLLING_PERIOD,
            throttle_from: ThrottleReference::default(),
            run_message: DEFAULT_RUN_MESSAGE.to_string(),
            creation: CreationMode::default(),
        }
    }
}

impl CheckPolicy {
    pub fn new(polling_period: Duration) -> Self {
        Self {
            polling_period,
            ..Self::default()
        }
    }

    pub fn with_throttle_from(mut self, reference: ThrottleReference) -> Self {
        self.throttle_from = reference;
        self
    }

    pub fn with_run_message(mut self, message: impl Into<String>) -> Self {
        self.run_message = message.into();
        self
    }

    pub fn with_creation(mut self, creation: CreationMode) -> Self {
        self.creation = creation;
        self
    }

    /// Enforce the policy invariants (second granularity, period ≥ 1s).
    pub fn validate(&self) -> Result<()> {
        if self.polling_period < Duration::from_secs(1) {
            return Err(DriftError::InvalidPolicy(
                "polling_period must be at least 1 second".to_string(),
            ));
        }
        if self.run_message.trim().is_empty() {
            return Err(DriftError::InvalidPolicy(
                "run message must not be empty".to_string(),
            ));
        }
        if let CreationMode::Await { interval, timeout } = self.creation {
            if interval.is_zero() {
                return Err(DriftError::InvalidPolicy(
                    "await interval must be positive".to_string(),
                ));
            }
            if timeout < interval {
                return Err(DriftError::InvalidPolicy(format!(
                    "await timeout ({}s) is shorter than the await interval ({}s)",
                    timeout.as_secs(),
                    interval.as_secs()
                )));
            }
        }
        Ok(())
    }
}
