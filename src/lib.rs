//! # hls-dl
//!
//! Backend library for downloading HLS (M3U8) streams.
//!
//! A playlist URL is fetched, its segment list is planned, the segments
//! are downloaded concurrently into a private scratch directory and merged
//! losslessly into one media file. Batches run many playlists under a
//! concurrency bound and package the results as a ZIP archive. Playlists
//! can also be discovered on ordinary web pages.
//!
//! ## Design Philosophy
//!
//! - **Sensible defaults** - Works out of the box with zero configuration
//! - **Library-first** - The REST API is an optional layer over [`HlsDownloader`]
//! - **Event-driven** - Consumers subscribe to events or poll progress
//! - **Lossless** - Segments are remuxed (ffmpeg) or concatenated, never re-encoded
//!
//! ## Quick Start
//!
//! ```no_run
//! use hls_dl::{HlsDownloader, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = HlsDownloader::new(Config::default()).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let task = downloader
//!         .start_single("https://cdn.example.com/show/index.m3u8")
//!         .await?;
//!     downloader.wait_single(&task).await?;
//!
//!     let output = downloader.take_output(&task).await?;
//!     println!("merged into {}", output.path.display());
//!     output.release().await;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Batch jobs and ZIP packaging
pub mod batch;
/// Configuration types
pub mod config;
/// Playlist discovery on web pages
pub mod discovery;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Lossless segment merging
pub mod merge;
/// Fetch, plan, download and merge one playlist
pub mod pipeline;
/// Playlist fetching and segment planning
pub mod playlist;
/// Progress tracking
pub mod progress;
/// Concurrent segment downloads
pub mod segments;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod test_helpers;

// Re-export commonly used types
pub use batch::{ArchiveFile, BatchCoordinator};
pub use config::Config;
pub use discovery::{LinkExtractor, WebpageInfo};
pub use downloader::{HlsDownloader, SweepReport};
pub use error::{ApiError, BatchError, Error, ErrorDetail, MergeError, Result, ToHttpStatus};
pub use merge::{ConcatMerger, FfmpegMerger, Merger};
pub use pipeline::{PipelineOutput, Stage};
pub use progress::{ProgressSink, ProgressTracker};
pub use types::{
    BatchId, BatchSnapshot, BatchStatus, Capabilities, DownloadMode, Event, ItemSnapshot,
    ItemStatus, Progress, Segment, SegmentStatus, TaskId,
};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use hls_dl::{HlsDownloader, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let downloader = HlsDownloader::new(config).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: HlsDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
