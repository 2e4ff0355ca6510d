//! Core types for hls-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;

/// Unique identifier for a single-playlist download task
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct TaskId(String);

/// Unique identifier for a batch job
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct BatchId(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            /// Generate a fresh random (UUID v4) identifier
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Borrow the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// First eight characters, used in file names
            pub fn short(&self) -> &str {
                self.0.get(..8).unwrap_or(&self.0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(TaskId);
string_id!(BatchId);

/// Status of a single playlist segment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SegmentStatus {
    /// Not attempted yet
    Pending,
    /// Stored on local disk
    Fetched,
    /// Download failed and the segment was skipped
    Failed,
}

/// One media chunk referenced by a playlist
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    /// Position in the playlist (defines playback order)
    pub index: usize,
    /// Resolved absolute URL
    pub url: url::Url,
    /// Local file once fetched
    pub path: Option<PathBuf>,
    /// Fetch status
    pub status: SegmentStatus,
}

impl Segment {
    /// Create a pending segment
    pub fn pending(index: usize, url: url::Url) -> Self {
        Self {
            index,
            url,
            path: None,
            status: SegmentStatus::Pending,
        }
    }
}

/// Poll view of a task's progress
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Progress {
    /// Completion percentage (0-100, never decreases for a task)
    pub percent: u8,
    /// Human-readable status message
    pub message: String,
}

impl Progress {
    /// Value reported for ids the tracker does not (or no longer) know
    pub fn unknown() -> Self {
        Self {
            percent: 0,
            message: "Unknown task".to_string(),
        }
    }
}

/// How a single-download request URL is turned into a playlist URL
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DownloadMode {
    /// The URL must already be a `.m3u8` playlist
    #[default]
    Direct,
    /// Always search the URL as a web page
    Extract,
    /// Search the page only when the URL is not a playlist
    Auto,
}

/// Status of one item in a batch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Waiting for a worker slot
    Pending,
    /// Pipeline running
    Downloading,
    /// Pipeline succeeded
    Completed,
    /// Pipeline failed
    Failed,
}

impl ItemStatus {
    /// Whether the item has reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed)
    }
}

/// Overall status of a batch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// At least one item has not finished
    Processing,
    /// Every item completed
    Completed,
    /// Some items completed, some failed
    CompletedWithErrors,
    /// No item completed
    Failed,
}

impl BatchStatus {
    /// Whether the batch has reached a final state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BatchStatus::Processing)
    }

    /// Resolve the terminal status from the final counters
    pub fn from_counts(completed: usize, failed: usize) -> Self {
        match (completed, failed) {
            (0, _) => BatchStatus::Failed,
            (_, 0) => BatchStatus::Completed,
            _ => BatchStatus::CompletedWithErrors,
        }
    }

    /// Whether an archive may be fetched in this state
    pub fn allows_archive(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed | BatchStatus::CompletedWithErrors
        )
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::CompletedWithErrors => "completed_with_errors",
            BatchStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Poll view of one batch item
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ItemSnapshot {
    /// Source playlist URL
    pub url: String,
    /// Item status
    pub status: ItemStatus,
    /// Completion percentage
    pub percent: u8,
    /// Latest status message
    pub message: String,
    /// Error message if the item failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Poll view of a batch job
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchSnapshot {
    /// Batch id
    pub id: BatchId,
    /// Overall status
    pub status: BatchStatus,
    /// Number of items
    pub total_count: usize,
    /// Items that completed successfully
    pub completed_count: usize,
    /// Items that failed
    pub failed_count: usize,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// Time the last item reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Per-item state, in submission order
    pub items: Vec<ItemSnapshot>,
}

/// Event emitted by the downloader
///
/// Consumers subscribe via `HlsDownloader::subscribe()`.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A single task reported progress
    TaskProgress {
        /// Task id
        task_id: TaskId,
        /// Completion percentage
        percent: u8,
        /// Status message
        message: String,
    },

    /// A single task produced its output
    TaskComplete {
        /// Task id
        task_id: TaskId,
        /// Number of segments in the playlist
        segments_total: usize,
        /// Number of segments skipped after failing
        segments_failed: usize,
    },

    /// A single task failed
    TaskFailed {
        /// Task id
        task_id: TaskId,
        /// Error message
        error: String,
    },

    /// A batch item completed
    BatchItemComplete {
        /// Batch id
        batch_id: BatchId,
        /// Item position in the batch
        index: usize,
        /// Number of segments in the playlist
        segments_total: usize,
        /// Number of segments skipped after failing
        segments_failed: usize,
    },

    /// A batch item failed
    BatchItemFailed {
        /// Batch id
        batch_id: BatchId,
        /// Item position in the batch
        index: usize,
        /// Error message
        error: String,
    },

    /// Every item of a batch reached a terminal state
    BatchComplete {
        /// Batch id
        batch_id: BatchId,
        /// Final status
        status: BatchStatus,
        /// Items that completed
        completed_count: usize,
        /// Items that failed
        failed_count: usize,
    },
}

/// Information about the active merge implementation
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Capabilities {
    /// Merger name (e.g. "ffmpeg", "concat")
    pub merger: String,
    /// Whether the merger re-muxes into an MP4 container
    pub remuxes: bool,
}
