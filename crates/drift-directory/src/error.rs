//! Error types for drift-directory

use thiserror::Error;

/// Errors that can occur while talking to a run directory
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// Connection, TLS or timeout failure
    #[error("transport failure: {0}")]
    Transport(String),

    /// Token rejected (401/403)
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Requested resource does not exist (or is hidden from the token)
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Any other non-success response
    #[error("API returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body could not be decoded
    #[error("malformed response: {0}")]
    Decode(String),

    /// Backend configured with unusable settings
    #[error("invalid directory configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for DirectoryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DirectoryError::Decode(err.to_string())
        } else {
            DirectoryError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DirectoryError {
    fn from(err: serde_json::Error) -> Self {
        DirectoryError::Decode(err.to_string())
    }
}
