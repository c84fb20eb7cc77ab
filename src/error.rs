//! Structured error handling and exit codes.

use serde::Serialize;

use crate::config::ConfigError;
use crate::scanner::ScanError;

/// Exit codes for the dupindex binary.
///
/// - 0: Success
/// - 1: General error (storage failure, failed worker, unexpected error)
/// - 2: Configuration error (bad root, bad database path, unreadable config)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: the command completed.
    Success = 0,
    /// General error: An unexpected error occurred.
    GeneralError = 1,
    /// Configuration error: nothing was run.
    ConfigError = 2,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "RD000",
            Self::GeneralError => "RD001",
            Self::ConfigError => "RD002",
        }
    }

    /// Pick the exit code for an error returned by the application.
    ///
    /// Errors raised before any pipeline runs map to [`ExitCode::ConfigError`].
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        let is_config = err.chain().any(|cause| {
            cause.downcast_ref::<ConfigError>().is_some()
                || cause.downcast_ref::<ScanError>().is_some_and(|e| {
                    matches!(e, ScanError::NotFound(_) | ScanError::NotADirectory(_))
                })
        });
        if is_config {
            Self::ConfigError
        } else {
            Self::GeneralError
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "RD001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Messages of the underlying causes, outermost first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: err.to_string(),
            causes: err.chain().skip(1).map(ToString::to_string).collect(),
        }
    }
}
