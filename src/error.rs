//! Error types for tube-dl
//!
//! This module provides:
//! - The crate-wide [`Error`] taxonomy (resolver, job, store and server errors)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes
//!
//! Extractor-originated failures live in [`crate::extractor::ExtractError`] and
//! are folded into [`Error::JobFailed`] once they become terminal.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::key::JobKey;
use crate::types::{JobFailure, JobState};

/// Result type alias for tube-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tube-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download_dir")
        key: Option<String>,
    },

    /// The video id does not have the platform's identifier shape
    #[error("invalid video id: {0:?}")]
    InvalidVideoId(String),

    /// Unknown media kind name
    #[error("invalid media kind: {0:?} (expected audio or video)")]
    InvalidMediaKind(String),

    /// The job was never requested or has been garbage-collected
    #[error("unknown job {0}")]
    UnknownJob(JobKey),

    /// The job exists but its artifact is not available yet
    #[error("job {key} is not ready (state: {state})")]
    JobNotReady {
        /// Job key
        key: JobKey,
        /// Current state (pending or running)
        state: JobState,
    },

    /// The job's latest attempt failed
    #[error("job {key} failed: {reason}")]
    JobFailed {
        /// Job key
        key: JobKey,
        /// Recorded failure
        reason: JobFailure,
    },

    /// The job's artifact was evicted
    #[error("job {0} expired: artifact was evicted")]
    JobExpired(JobKey),

    /// The store holds no committed artifact for this key
    #[error("artifact not found for {0}")]
    ArtifactNotFound(JobKey),

    /// A download file name does not map to any artifact
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Store I/O failed while publishing an artifact
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Operation not supported (missing binary, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// API error response format
///
/// Returned by API endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "job_not_ready",
///     "message": "job dQw4w9WgXcQ:audio is not ready (state: running)",
///     "details": {
///       "video_id": "dQw4w9WgXcQ",
///       "kind": "audio",
///       "state": "running"
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "unknown_job", "unauthorized")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context (video_id, kind, state, failure reason)
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

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - invalid input
            Error::Config { .. } => 400,
            Error::InvalidVideoId(_) => 400,
            Error::InvalidMediaKind(_) => 400,

            // 404 Not Found
            Error::UnknownJob(_) => 404,
            Error::JobExpired(_) => 404,
            Error::ArtifactNotFound(_) => 404,
            Error::FileNotFound(_) => 404,

            // 409 Conflict - job exists but cannot serve an artifact
            Error::JobNotReady { .. } => 409,
            Error::JobFailed { .. } => 409,

            // 500 Internal Server Error
            Error::Storage(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            // 501 Not Implemented
            Error::NotSupported(_) => 501,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidVideoId(_) => "invalid_video_id",
            Error::InvalidMediaKind(_) => "invalid_media_kind",
            Error::UnknownJob(_) => "unknown_job",
            Error::JobNotReady { .. } => "job_not_ready",
            Error::JobFailed { .. } => "job_failed",
            Error::JobExpired(_) => "job_expired",
            Error::ArtifactNotFound(_) => "artifact_not_found",
            Error::FileNotFound(_) => "file_not_found",
            Error::Storage(_) => "storage_error",
            Error::Io(_) => "io_error",
            Error::ShuttingDown => "shutting_down",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::NotSupported(_) => "not_supported",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::InvalidVideoId(video_id) => Some(serde_json::json!({
                "video_id": video_id,
            })),
            Error::UnknownJob(key) | Error::JobExpired(key) | Error::ArtifactNotFound(key) => {
                Some(serde_json::json!({
                    "video_id": key.video_id(),
                    "kind": key.kind(),
                }))
            }
            Error::JobNotReady { key, state } => Some(serde_json::json!({
                "video_id": key.video_id(),
                "kind": key.kind(),
                "state": state,
            })),
            Error::JobFailed { key, reason } => Some(serde_json::json!({
                "video_id": key.video_id(),
                "kind": key.kind(),
                "reason": reason.kind,
            })),
            Error::FileNotFound(file_name) => Some(serde_json::json!({
                "filename": file_name,
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
