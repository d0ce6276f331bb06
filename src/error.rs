//! Error handling module for phasebook
//!
//! Provides the error kinds a run can fail with, using thiserror.
//! Each kind maps to one stage of a run so callers can tell a bad
//! configuration apart from a phase that failed while executing.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for phasebook
#[derive(Error, Debug)]
pub enum PhasebookError {
    /// Missing or invalid input
    #[error("Configuration error: {0}")]
    Config(String),

    /// Discovery root does not exist or cannot be listed
    #[error("Path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    /// Discovery root exists but is not a directory
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Declared phase order does not match the phase directories
    #[error("The execution order does not match the names of the phase directories: {0}")]
    PhaseMismatch(String),

    /// Structured extra-options document is malformed
    #[error("Failed to parse extra options: {0}")]
    OptionsParse(String),

    /// Secrets table is not a flat JSON object of strings
    #[error("Failed to parse secrets: {0}")]
    Secrets(String),

    /// A phase's command failed to spawn or exited non-zero
    #[error("Phase '{phase}' failed: {reason}")]
    PhaseExecution { phase: String, reason: String },

    /// IO errors (transient files, state file, outputs)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for phasebook operations
pub type Result<T> = std::result::Result<T, PhasebookError>;

impl PhasebookError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a phase mismatch error
    pub fn phase_mismatch(msg: impl Into<String>) -> Self {
        Self::PhaseMismatch(msg.into())
    }

    /// Create an options parse error
    pub fn options_parse(msg: impl Into<String>) -> Self {
        Self::OptionsParse(msg.into())
    }

    /// Create a phase execution error
    pub fn phase_execution(phase: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PhaseExecution {
            phase: phase.into(),
            reason: reason.into(),
        }
    }

    /// True for failures that happened while a phase was running, as opposed
    /// to failures detected before the first phase started.
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, Self::PhaseExecution { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PhasebookError::config("execution_order is required");
        assert_eq!(
            err.to_string(),
            "Configuration error: execution_order is required"
        );

        let err = PhasebookError::phase_execution("setup", "exit code 2");
        assert_eq!(err.to_string(), "Phase 'setup' failed: exit code 2");
    }

    #[test]
    fn test_path_errors_include_path() {
        let err = PhasebookError::PathNotFound(PathBuf::from("/no/such/dir"));
        assert!(err.to_string().contains("/no/such/dir"));

        let err = PhasebookError::NotADirectory(PathBuf::from("playbooks.yml"));
        assert!(err.to_string().contains("playbooks.yml"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PhasebookError = io_err.into();
        assert!(matches!(err, PhasebookError::Io(_)));
    }

    #[test]
    fn test_execution_failure_is_distinguishable() {
        assert!(PhasebookError::phase_execution("run", "boom").is_execution_failure());
        assert!(!PhasebookError::phase_mismatch("missing: a").is_execution_failure());
        assert!(!PhasebookError::options_parse("bad yaml").is_execution_failure());
    }
}
