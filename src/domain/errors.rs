//! Domain errors for covergen.

use std::path::PathBuf;
use thiserror::Error;

/// Domain-level errors that can occur while preparing or running a generation run.
///
/// Only [`DomainError::EnvironmentMissing`] and [`DomainError::Interrupted`] are
/// meant to stop a run. Everything else is recoverable at the loop level and is
/// recorded as a [`crate::domain::models::LoopError`] instead of propagated.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Environment not ready: {0}")]
    EnvironmentMissing(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Test generation failed: {0}")]
    GenerationFailed(String),

    #[error("Coverage measurement failed: {0}")]
    MeasurementFailed(String),

    #[error("Tool '{program}' is unavailable: {reason}")]
    ToolUnavailable { program: String, reason: String },

    #[error("Command '{command}' timed out after {timeout_secs}s")]
    CommandTimedOut { command: String, timeout_secs: u64 },

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Run interrupted by user")]
    Interrupted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Returns true for the error kinds that abort a run instead of being recorded.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DomainError::EnvironmentMissing(_) | DomainError::Interrupted
        )
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::MalformedInput(err.to_string())
    }
}
