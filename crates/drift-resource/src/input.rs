//! Resource input: the JSON document Concourse hands to `check`.
//!
//! Unknown fields are rejected at every level so a typo in a pipeline
//! definition fails loudly instead of silently falling back to a default.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::time::Duration;

use drift_core::{
    CheckPolicy, CheckRequest, CreationMode, ThrottleReference, Version, WorkspaceTarget,
    DEFAULT_AWAIT_INTERVAL, DEFAULT_AWAIT_TIMEOUT, DEFAULT_POLLING_PERIOD, DEFAULT_RUN_MESSAGE,
};
use drift_directory::{TfeConfig, DEFAULT_ADDRESS};
use serde::Deserialize;
use thiserror::Error;

/// Problems with the input document.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("error reading input: {0}")]
    Io(#[from] io::Error),

    #[error("error parsing input: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("error parsing input: workspace, organization, and token fields must be set")]
    MissingSource,

    #[error("error parsing input: invalid source address: {0}")]
    Address(String),

    #[error("error parsing input: polling_period must be at least 1 second")]
    PollingPeriod,

    #[error("error parsing input: {0}")]
    Params(String),
}

/// Full input document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckInput {
    pub source: Source,
    #[serde(default)]
    pub version: Option<Version>,
    #[serde(default)]
    pub params: Params,
}

/// Which workspace to watch and how to reach the API.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Source {
    pub organization: String,
    pub workspace: String,
    pub token: String,
    #[serde(default = "default_address")]
    pub address: String,
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("organization", &self.organization)
            .field("workspace", &self.workspace)
            .field("token", &"<redacted>")
            .field("address", &self.address)
            .finish()
    }
}

/// Step parameters. Only the throttling and run-creation knobs affect `check`;
/// the variable and confirmation fields are shared with `put`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Params {
    /// Seconds between drift runs.
    #[serde(default = "default_polling_period")]
    pub polling_period: u64,
    #[serde(default = "default_message")]
    pub message: String,
    #[serde(default)]
    pub throttle_from: ThrottleReference,
    #[serde(default)]
    pub await_new_run: bool,
    #[serde(default = "default_await_interval")]
    pub await_interval: u64,
    #[serde(default = "default_await_timeout")]
    pub await_timeout: u64,
    #[serde(default)]
    pub vars: BTreeMap<String, Variable>,
    #[serde(default)]
    pub env_vars: BTreeMap<String, Variable>,
    #[serde(default)]
    pub confirm: bool,
    #[serde(default)]
    pub sensitive: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            polling_period: default_polling_period(),
            message: default_message(),
            throttle_from: ThrottleReference::default(),
            await_new_run: false,
            await_interval: default_await_interval(),
            await_timeout: default_await_timeout(),
            vars: BTreeMap::new(),
            env_vars: BTreeMap::new(),
            confirm: false,
            sensitive: false,
        }
    }
}

/// Workspace variable as written in a `put` step.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Variable {
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub hcl: bool,
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

fn default_polling_period() -> u64 {
    DEFAULT_POLLING_PERIOD.as_secs()
}

fn default_message() -> String {
    DEFAULT_RUN_MESSAGE.to_string()
}

fn default_await_interval() -> u64 {
    DEFAULT_AWAIT_INTERVAL.as_secs()
}

fn default_await_timeout() -> u64 {
    DEFAULT_AWAIT_TIMEOUT.as_secs()
}

/// Parse and validate an input document.
pub fn parse<R: Read>(reader: R) -> Result<CheckInput, InputError> {
    let input: CheckInput = serde_json::from_reader(reader)?;
    input.validate()?;
    Ok(input)
}

/// Read the input from `path`, or stdin when no path is given.
pub fn load(path: Option<&Path>) -> Result<CheckInput, InputError> {
    match path {
        Some(path) => parse(BufReader::new(File::open(path)?)),
        None => parse(io::stdin().lock()),
    }
}

impl CheckInput {
    pub fn validate(&self) -> Result<(), InputError> {
        let source = &self.source;
        if source.organization.is_empty() || source.workspace.is_empty() || source.token.is_empty()
        {
            return Err(InputError::MissingSource);
        }
        self.tfe_config()
            .base_url()
            .map_err(|e| InputError::Address(e.to_string()))?;
        if self.params.polling_period < 1 {
            return Err(InputError::PollingPeriod);
        }
        self.policy()
            .validate()
            .map_err(|e| InputError::Params(e.to_string()))
    }

    pub fn target(&self) -> WorkspaceTarget {
        WorkspaceTarget::new(&self.source.organization, &self.source.workspace)
    }

    pub fn tfe_config(&self) -> TfeConfig {
        TfeConfig::new(&self.source.address, &self.source.token)
    }

    pub fn policy(&self) -> CheckPolicy {
        let params = &self.params;
        let creation = if params.await_new_run {
            CreationMode::Await {
                interval: Duration::from_secs(params.await_interval),
                timeout: Duration::from_secs(params.await_timeout),
            }
        } else {
            CreationMode::Deferred
        };
        CheckPolicy::new(Duration::from_secs(params.polling_period))
            .with_throttle_from(params.throttle_from)
            .with_run_message(&params.message)
            .with_creation(creation)
    }

    /// The engine request; an empty ref counts as no previous version.
    pub fn request(&self) -> CheckRequest {
        let previous = self
            .version
            .clone()
            .filter(|version| !version.reference.is_empty());
        CheckRequest::new(self.target(), previous)
    }
}
