//! # Errors
//!
//! Typed failures surfaced by command execution and the chat remotes.

use crate::domain::types::ScriptResult;
use thiserror::Error;

/// A `${name}` token that resolved to nothing.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("variable '{name}' could not be found")]
pub struct SubstitutionError {
    pub name: String,
}

/// Why a script execution did not succeed.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Substitution(#[from] SubstitutionError),

    #[error("timeout reached, exec process for action '{action}' cancelled")]
    Timeout { action: String },

    #[error("command not found for action '{action}': {reason}")]
    CommandNotFound { action: String, reason: String },

    #[error("process for action '{action}' exited with status {status}")]
    NonZeroExit { action: String, status: i32 },
}

/// A failed execution together with the result the user should still see.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ScriptFailure {
    pub result: ScriptResult,
    pub error: ExecError,
}

/// Failures talking to a chat platform. These are logged and absorbed by the remotes.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RemoteError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("remote call failed: {0}")]
    Transient(String),
}
