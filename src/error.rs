//! Error handling module for the Guacamole installer
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Every fatal path in the installer surfaces one of these variants, and
//! `main` turns it into a process exit status via [`InstallerError::exit_code`].

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the installer
#[derive(Error, Debug)]
pub enum InstallerError {
    /// IO errors (file operations, terminal, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Host is not in a state where installation may start
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// User input could not be accepted
    #[error("Validation error: {0}")]
    Validation(String),

    /// Two mutually exclusive options both resolved to true
    #[error("Conflicting options: {first} and {second} cannot both be enabled")]
    ExclusiveOptions {
        first: &'static str,
        second: &'static str,
    },

    /// One or more step scripts could not be transferred
    #[error("Failed to fetch {} script(s): {}", .failures.len(), .failures.join("; "))]
    Fetch { failures: Vec<String> },

    /// Placeholder substitution into a step script failed
    #[error("Failed to update {}: {reason}", .path.display())]
    Propagation { path: PathBuf, reason: String },

    /// A pipeline step returned a non-zero status
    #[error("Step '{step}' failed (exit code {code}). See {}", .log.display())]
    StepFailed {
        step: String,
        code: i32,
        log: PathBuf,
    },

    /// Terminal prompt failed (closed stdin, no tty)
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Configuration errors (loading, parsing, preset validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Script manifest validation errors
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// System errors (commands, processes)
    #[error("System error: {0}")]
    System(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for installer operations
pub type Result<T> = std::result::Result<T, InstallerError>;

// Convenient error constructors
impl InstallerError {
    /// Create a precondition error
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a prompt error
    pub fn prompt(msg: impl Into<String>) -> Self {
        Self::Prompt(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a system error
    pub fn system(msg: impl Into<String>) -> Self {
        Self::System(msg.into())
    }

    /// Create a propagation error for `path`
    pub fn propagation(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Propagation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Process exit status for this error.
    ///
    /// Every failure the installer reports is fatal with status 1.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

impl From<dialoguer::Error> for InstallerError {
    fn from(err: dialoguer::Error) -> Self {
        InstallerError::Prompt(err.to_string())
    }
}
