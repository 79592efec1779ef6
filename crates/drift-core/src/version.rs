//! Versions reported back to the scheduler.

use drift_directory::RunId;
use serde::{Deserialize, Serialize};

/// A resource version: an opaque run id used as a correlation token.
///
/// Two versions are equal iff their refs are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    #[serde(rename = "ref")]
    pub reference: String,
}

impl Version {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
        }
    }
}

impl From<&RunId> for Version {
    fn from(id: &RunId) -> Self {
        Version::new(id.as_str())
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reference)
    }
}
