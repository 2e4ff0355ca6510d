//! The merge seam

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Concatenates downloaded segments losslessly into one output file
///
/// Implementations can wrap an external tool or do the work in-process.
/// The pipeline holds the merger as `Arc<dyn Merger>`, so tests inject
/// their own.
///
/// # Examples
///
/// ```no_run
/// use hls_dl::merge::{FfmpegMerger, Merger};
/// use std::path::{Path, PathBuf};
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let merger = FfmpegMerger::from_path(Duration::from_secs(300))
///     .expect("ffmpeg not found");
///
/// let segments = vec![PathBuf::from("/tmp/job/segment_000000.ts")];
/// let output = merger
///     .merge(&segments, Path::new("/tmp/job"), &CancellationToken::new())
///     .await?;
/// println!("merged into {}", output.display());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Merger: Send + Sync {
    /// Merge `segments` (already in playback order) into a file inside
    /// `scratch_dir` and return its path
    ///
    /// # Errors
    ///
    /// - `MergeError::Timeout` when the time budget is exceeded
    /// - `MergeError::ToolFailure` when an external tool exits non-zero
    /// - `MergeError::EmptyOutput` when the output is missing or zero bytes
    /// - `Error::ExternalTool` when the tool cannot be started
    /// - `Error::Cancelled` when `cancel` fires first
    async fn merge(
        &self,
        segments: &[PathBuf],
        scratch_dir: &Path,
        cancel: &CancellationToken,
    ) -> crate::Result<PathBuf>;

    /// Human-readable name for logging and status messages
    fn name(&self) -> &'static str;

    /// Whether the output is re-muxed into a different container
    fn remuxes(&self) -> bool;
}
