//! Error types module
//!
//! Every fallible srce operation returns [`AppError`]. The variants follow the
//! ingest/transcode taxonomy: rejected content, infrastructure failures,
//! transcode failures, missing records and conflicts are kept apart so callers
//! can react to each differently.
//!
//! The `Database` variant wraps `sqlx::Error` when the `sqlx` feature is on and a
//! plain message otherwise.

use std::io;
use std::path::PathBuf;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

use crate::models::ProcessingStatus;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Expected errors like rejected uploads
    Debug,
    /// Recoverable issues like a saturated queue
    Warn,
    /// Unexpected failures
    Error,
}

/// Coarse classification of an error, independent of its exact variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The caller sent something unacceptable (bad names, undecodable media).
    InvalidInput,
    /// A dependency could not be used at all (tool missing, disk, database).
    Infrastructure,
    /// An external media step ran and reported failure.
    Transcode,
    NotFound,
    Conflict,
    Internal,
}

/// Metadata describing how an error should be presented and logged.
pub trait ErrorMetadata {
    fn category(&self) -> ErrorCategory;

    /// HTTP status code an HTTP front end should map this error to
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "INVALID_MEDIA")
    fn error_code(&self) -> &'static str;

    /// Whether retrying the same operation later may succeed
    fn is_recoverable(&self) -> bool;

    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid media file: {0}")]
    InvalidMedia(String),

    #[error("Failed to invoke {tool}: {source}")]
    ToolUnavailable {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} failed ({}): {stderr}", describe_exit(exit_code))]
    ToolFailed {
        tool: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("No staged chunks for {owner}/{logical_name}")]
    NoChunks { owner: String, logical_name: String },

    #[error("Merge already in progress for {owner}/{logical_name}")]
    MergeInProgress { owner: String, logical_name: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: ProcessingStatus,
        to: ProcessingStatus,
    },

    #[error("Video job queue is full, please try again later")]
    QueueFull,

    #[error("Video job queue is closed")]
    QueueClosed,

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// Result type for srce operations
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Wrap an I/O error together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        AppError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the error means "the content was rejected", as opposed to the
    /// system failing to look at it.
    pub fn is_rejected_content(&self) -> bool {
        matches!(self, AppError::InvalidMedia(_))
    }
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

/// Static metadata for each variant: (category, http_status, error_code, recoverable, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (ErrorCategory, u16, &'static str, bool, LogLevel) {
    match err {
        AppError::InvalidInput(_) => (
            ErrorCategory::InvalidInput,
            400,
            "INVALID_INPUT",
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidMedia(_) => (
            ErrorCategory::InvalidInput,
            400,
            "INVALID_MEDIA",
            false,
            LogLevel::Debug,
        ),
        AppError::ToolUnavailable { .. } => (
            ErrorCategory::Infrastructure,
            503,
            "TOOL_UNAVAILABLE",
            true,
            LogLevel::Error,
        ),
        AppError::ToolFailed { .. } => (
            ErrorCategory::Transcode,
            500,
            "TOOL_FAILED",
            false,
            LogLevel::Error,
        ),
        AppError::Timeout { .. } => (
            ErrorCategory::Transcode,
            504,
            "TIMEOUT",
            true,
            LogLevel::Warn,
        ),
        AppError::NoChunks { .. } => (
            ErrorCategory::InvalidInput,
            400,
            "NO_CHUNKS",
            false,
            LogLevel::Debug,
        ),
        AppError::MergeInProgress { .. } => (
            ErrorCategory::Conflict,
            409,
            "MERGE_IN_PROGRESS",
            true,
            LogLevel::Warn,
        ),
        AppError::NotFound(_) => (
            ErrorCategory::NotFound,
            404,
            "NOT_FOUND",
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidTransition { .. } => (
            ErrorCategory::Conflict,
            409,
            "INVALID_STATUS_TRANSITION",
            false,
            LogLevel::Warn,
        ),
        AppError::QueueFull => (
            ErrorCategory::Infrastructure,
            503,
            "QUEUE_FULL",
            true,
            LogLevel::Warn,
        ),
        AppError::QueueClosed => (
            ErrorCategory::Infrastructure,
            503,
            "QUEUE_CLOSED",
            false,
            LogLevel::Error,
        ),
        AppError::Io { .. } => (
            ErrorCategory::Infrastructure,
            500,
            "IO_ERROR",
            true,
            LogLevel::Error,
        ),
        AppError::Database(_) => (
            ErrorCategory::Infrastructure,
            500,
            "DATABASE_ERROR",
            true,
            LogLevel::Error,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            ErrorCategory::Internal,
            500,
            "INTERNAL_ERROR",
            true,
            LogLevel::Error,
        ),
    }
}

impl ErrorMetadata for AppError {
    fn category(&self) -> ErrorCategory {
        app_error_static_metadata(self).0
    }

    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).1
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).2
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).3
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).4
    }
}
