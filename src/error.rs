//! Error types for hls-dl
//!
//! This module provides error handling for the library, including:
//! - Pipeline failures (network, empty playlist, all segments failed, merge)
//! - Batch lookup and readiness errors
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use crate::types::{BatchId, BatchStatus, TaskId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for hls-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for hls-dl
///
/// Every pipeline failure ends up recorded verbatim (via `Display`) as the
/// terminal message of the owning task or batch item.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "temp_dir")
        key: Option<String>,
    },

    /// Caller input was rejected (bad URL, oversized batch, ...)
    #[error("{0}")]
    Validation(String),

    /// Network request failed (connect error, non-success status, timeout)
    #[error("network error: {0}")]
    Network(String),

    /// The playlist was fetched but its body is empty
    #[error("playlist at {url} is empty")]
    EmptyPlaylist {
        /// Playlist URL
        url: String,
    },

    /// The playlist contains no segment references
    #[error("no video segments found in playlist {url}")]
    EmptySegmentList {
        /// Playlist URL
        url: String,
    },

    /// Every segment download failed
    #[error("failed to download any of {total} video segments")]
    AllSegmentsFailed {
        /// Number of segments that were attempted
        total: usize,
    },

    /// Merging the downloaded segments failed
    #[error("failed to merge video segments: {0}")]
    Merge(#[from] MergeError),

    /// Batch lookup or readiness error
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// The pipeline exceeded its overall time budget
    #[error("pipeline timed out after {seconds} seconds")]
    PipelineTimeout {
        /// The configured budget in seconds
        seconds: u64,
    },

    /// Work was cancelled before it finished
    #[error("download cancelled")]
    Cancelled,

    /// Unknown single-download task
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    /// The task has not produced its output yet
    #[error("task {0} is still running")]
    TaskNotReady(TaskId),

    /// The task finished with an error
    #[error("task {id} failed: {message}")]
    TaskFailed {
        /// The failed task
        id: TaskId,
        /// The terminal error message recorded for the task
        message: String,
    },

    /// Link discovery found no playlist on the page
    #[error("no video streams found on {url}")]
    NoPlaylistFound {
        /// The page that was searched
        url: String,
    },

    /// External tool could not be executed (ffmpeg missing, spawn failure)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP archive creation failed
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Shutdown in progress - not accepting new downloads
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Failure kinds of the merge step
#[derive(Debug, Error)]
pub enum MergeError {
    /// The merge exceeded its time budget
    #[error("video processing timed out after {seconds} seconds, file may be too large")]
    Timeout {
        /// The configured budget in seconds
        seconds: u64,
    },

    /// The merge tool exited with a non-zero status
    #[error("merge tool exited with {}: {stderr}", exit_label(.code))]
    ToolFailure {
        /// Exit code (None when killed by a signal)
        code: Option<i32>,
        /// Tail of the tool's standard error output
        stderr: String,
    },

    /// The merge tool reported success but the output is missing or empty
    #[error("output file {path} is missing or empty")]
    EmptyOutput {
        /// Expected output path
        path: PathBuf,
    },
}

/// Batch-related errors
#[derive(Debug, Error)]
pub enum BatchError {
    /// Batch id is unknown (never submitted, released or evicted)
    #[error("batch {id} not found")]
    NotFound {
        /// The batch id that was not found
        id: BatchId,
    },

    /// Batch has not reached a state that allows the operation
    #[error("batch {id} is not ready for download (status: {status})")]
    NotReady {
        /// The batch id
        id: BatchId,
        /// The current batch status
        status: BatchStatus,
    },

    /// No item of the batch completed successfully
    #[error("no videos were successfully downloaded in batch {id}")]
    NoSuccessfulItems {
        /// The batch id
        id: BatchId,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

impl Error {
    /// Shorthand for a network error built from any displayable cause
    pub(crate) fn network(message: impl Into<String>) -> Self {
        Error::Network(message.into())
    }
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "batch_not_found",
///     "message": "batch 3f2a... not found",
///     "details": {
///       "batch_id": "3f2a..."
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
    /// Machine-readable error code (e.g., "batch_not_found", "validation_error")
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

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
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
            // 400 Bad Request - Client error (invalid input)
            Error::Config { .. } => 400,
            Error::Validation(_) => 400,

            // 404 Not Found
            Error::TaskNotFound(_) => 404,
            Error::Batch(BatchError::NotFound { .. }) => 404,
            Error::NoPlaylistFound { .. } => 404,

            // 409 Conflict - Resource not in a usable state
            Error::TaskNotReady(_) => 409,
            Error::Batch(BatchError::NotReady { .. }) => 409,
            Error::Batch(BatchError::NoSuccessfulItems { .. }) => 409,
            Error::Cancelled => 409,

            // 422 Unprocessable Entity - Semantic errors in the source
            Error::EmptyPlaylist { .. } => 422,
            Error::EmptySegmentList { .. } => 422,
            Error::TaskFailed { .. } => 422,

            // 500 Internal Server Error - Server-side issues
            Error::Merge(MergeError::ToolFailure { .. }) => 500,
            Error::Merge(MergeError::EmptyOutput { .. }) => 500,
            Error::Io(_) => 500,
            Error::Archive(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            // 502 Bad Gateway - Upstream failures
            Error::Network(_) => 502,
            Error::AllSegmentsFailed { .. } => 502,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,
            Error::ExternalTool(_) => 503,

            // 504 Gateway Timeout - Time budget exceeded
            Error::Merge(MergeError::Timeout { .. }) => 504,
            Error::PipelineTimeout { .. } => 504,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Validation(_) => "validation_error",
            Error::Network(_) => "network_error",
            Error::EmptyPlaylist { .. } => "empty_playlist",
            Error::EmptySegmentList { .. } => "empty_segment_list",
            Error::AllSegmentsFailed { .. } => "all_segments_failed",
            Error::Merge(e) => match e {
                MergeError::Timeout { .. } => "processing_timeout",
                MergeError::ToolFailure { .. } => "merge_tool_failure",
                MergeError::EmptyOutput { .. } => "empty_output",
            },
            Error::Batch(e) => match e {
                BatchError::NotFound { .. } => "batch_not_found",
                BatchError::NotReady { .. } => "batch_not_ready",
                BatchError::NoSuccessfulItems { .. } => "no_successful_items",
            },
            Error::PipelineTimeout { .. } => "pipeline_timeout",
            Error::Cancelled => "cancelled",
            Error::TaskNotFound(_) => "task_not_found",
            Error::TaskNotReady(_) => "task_not_ready",
            Error::TaskFailed { .. } => "task_failed",
            Error::NoPlaylistFound { .. } => "no_playlist_found",
            Error::ExternalTool(_) => "external_tool_error",
            Error::Io(_) => "io_error",
            Error::Archive(_) => "archive_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::ShuttingDown => "shutting_down",
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
            Error::Batch(BatchError::NotFound { id }) => Some(serde_json::json!({
                "batch_id": id,
            })),
            Error::Batch(BatchError::NotReady { id, status }) => Some(serde_json::json!({
                "batch_id": id,
                "status": status,
            })),
            Error::Batch(BatchError::NoSuccessfulItems { id }) => Some(serde_json::json!({
                "batch_id": id,
            })),
            Error::TaskNotFound(id) | Error::TaskNotReady(id) => Some(serde_json::json!({
                "task_id": id,
            })),
            Error::TaskFailed { id, .. } => Some(serde_json::json!({
                "task_id": id,
            })),
            Error::AllSegmentsFailed { total } => Some(serde_json::json!({
                "segments_total": total,
            })),
            Error::Merge(MergeError::ToolFailure { code, .. }) => Some(serde_json::json!({
                "exit_code": code,
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
