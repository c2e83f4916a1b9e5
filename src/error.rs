//! Exit codes and structured error output.

use serde::Serialize;

use crate::duplicates::FinderError;

/// Exit codes for the dupsort binary.
///
/// - 0: Success (report written, or configuration installed on first run)
/// - 1: Fatal error
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// The run completed, or first-run setup finished.
    Success = 0,
    /// A fatal error stopped the run.
    GeneralError = 1,
    /// The run was interrupted by user (Ctrl+C).
    Interrupted = 130,
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
            Self::Success => "DS000",
            Self::GeneralError => "DS001",
            Self::Interrupted => "DS130",
        }
    }

    /// Exit code for an error returned by the application.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        let interrupted = err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<FinderError>(),
                Some(FinderError::Interrupted)
            )
        });
        if interrupted {
            Self::Interrupted
        } else {
            Self::GeneralError
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "DS001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including its causes
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{:#}", err),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
