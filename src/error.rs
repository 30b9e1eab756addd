//! Error types for formfill
//!
//! This module provides the error taxonomy for the generation pipeline:
//! - Per-segment errors (mapping load, template lookup, fill attempts)
//! - Whole-batch errors (batch exhausted, dispatch failure)
//! - HTTP status code mapping for the hosting layer
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for formfill operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for formfill
///
/// Per-segment failures (`MappingLoad`, `TemplateNotFound`, `Fill`) are
/// recorded as data inside the batch results and never cross the batch
/// boundary as errors; only whole-batch failures (`BatchExhausted`,
/// `Dispatch`) propagate to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "engine_path")
        key: Option<String>,
    },

    /// Mapping file missing or unparsable for a segment
    #[error("mapping load failed for segment {segment}: {reason}")]
    MappingLoad {
        /// The segment whose mapping could not be loaded
        segment: String,
        /// Why loading or parsing failed
        reason: String,
    },

    /// Template file missing; terminal, no fallback attempt is made
    #[error("template not found for segment {segment}: {path}")]
    TemplateNotFound {
        /// The segment whose template is missing
        segment: String,
        /// The path where the template was expected
        path: PathBuf,
    },

    /// Forms-engine fill attempt failed
    #[error("fill error: {0}")]
    Fill(#[from] FillError),

    /// Zero segments succeeded; nothing is dispatched
    #[error("no segments could be generated ({attempted} attempted, all failed)")]
    BatchExhausted {
        /// Number of segments that were attempted
        attempted: usize,
    },

    /// Documents were generated but delivery/archival failed
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Forms-engine process failures
///
/// All variants are retryable by the fallback controller; the terminal
/// template-not-found case is classified before any fill attempt and lives
/// on [`Error`] instead.
#[derive(Debug, Error)]
pub enum FillError {
    /// The engine binary could not be started (missing or unexecutable)
    #[error("failed to spawn forms engine at {binary}: {reason}")]
    SpawnFailed {
        /// Path to the engine binary that failed to spawn
        binary: PathBuf,
        /// The underlying spawn error
        reason: String,
    },

    /// The engine exited with a non-zero status
    #[error("forms engine exited with {code:?}: {stderr}")]
    ExitFailed {
        /// Process exit code, if one was reported
        code: Option<i32>,
        /// Captured stderr from the engine
        stderr: String,
    },

    /// The engine exceeded the wall-clock timeout and was killed
    #[error("forms engine timed out after {seconds}s and was killed")]
    TimedOut {
        /// The timeout that was exceeded, in seconds
        seconds: u64,
    },
}

/// Dispatch failures (archive construction or mail transport)
///
/// Carries the count of successfully generated documents so the caller can
/// retry dispatch without regenerating.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Mail transport rejected or failed the send
    #[error("mail transport failed ({generated} documents generated but undelivered): {reason}")]
    MailFailed {
        /// Why the transport failed
        reason: String,
        /// Number of documents that were generated but not delivered
        generated: usize,
    },

    /// Archive container could not be built
    #[error("archive construction failed ({generated} documents generated): {reason}")]
    ArchiveFailed {
        /// Why archive construction failed
        reason: String,
        /// Number of documents that were generated but not archived
        generated: usize,
    },
}

impl DispatchError {
    /// Number of documents that were generated but not delivered
    pub fn generated(&self) -> usize {
        match self {
            DispatchError::MailFailed { generated, .. } => *generated,
            DispatchError::ArchiveFailed { generated, .. } => *generated,
        }
    }
}

/// API error response format
///
/// Returned by the hosting layer when a request-level error occurs. Follows
/// a standard format with a machine-readable code, a human-readable message,
/// and optional contextual details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "template_not_found")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }
}

/// Convert errors to HTTP status codes for the hosting layer
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - invalid configuration input
            Error::Config { .. } => 400,

            // 404 Not Found - missing template or mapping on disk
            Error::MappingLoad { .. } => 404,
            Error::TemplateNotFound { .. } => 404,

            // 422 Unprocessable Entity - nothing could be generated
            Error::BatchExhausted { .. } => 422,

            // 500 Internal Server Error
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::Other(_) => 500,

            // 502 Bad Gateway - downstream transport failed after generation
            Error::Dispatch(_) => 502,

            // 503 Service Unavailable - the engine itself is unhealthy
            Error::Fill(_) => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::MappingLoad { .. } => "mapping_load_error",
            Error::TemplateNotFound { .. } => "template_not_found",
            Error::Fill(e) => match e {
                FillError::SpawnFailed { .. } => "engine_spawn_failed",
                FillError::ExitFailed { .. } => "engine_exit_failed",
                FillError::TimedOut { .. } => "engine_timeout",
            },
            Error::BatchExhausted { .. } => "batch_exhausted",
            Error::Dispatch(e) => match e {
                DispatchError::MailFailed { .. } => "mail_failed",
                DispatchError::ArchiveFailed { .. } => "archive_failed",
            },
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        // Add contextual details for specific error types
        let details = match &error {
            Error::TemplateNotFound { segment, path } => Some(serde_json::json!({
                "segment": segment,
                "path": path,
            })),
            Error::MappingLoad { segment, .. } => Some(serde_json::json!({
                "segment": segment,
            })),
            Error::BatchExhausted { attempted } => Some(serde_json::json!({
                "attempted": attempted,
            })),
            Error::Dispatch(e) => Some(serde_json::json!({
                "generated": e.generated(),
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
