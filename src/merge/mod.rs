//! Lossless segment merging
//!
//! [`FfmpegMerger`] stream-copies the segments into an MP4 container with
//! ffmpeg's concat demuxer. [`ConcatMerger`] is the in-process fallback used
//! when no ffmpeg binary is available: it appends the MPEG-TS segments byte
//! for byte, which is valid for transport streams.

mod concat;
mod ffmpeg;
mod traits;

pub use concat::ConcatMerger;
pub use ffmpeg::{FfmpegMerger, concat_manifest};
pub use traits::Merger;

use crate::error::{Error, MergeError, Result};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Run `work` under the merge time budget, aborting on cancellation
///
/// Dropping `work` on timeout or cancel is what kills a spawned tool
/// (commands are spawned with `kill_on_drop`).
async fn bounded<T>(
    work: impl Future<Output = Result<T>>,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = tokio::time::timeout(timeout, work) => match result {
            Ok(inner) => inner,
            Err(_) => Err(MergeError::Timeout { seconds: timeout.as_secs() }.into()),
        },
    }
}

/// Every merger checks its output before declaring success
async fn ensure_output(path: &Path) -> Result<()> {
    if crate::utils::file_has_content(path).await {
        Ok(())
    } else {
        Err(MergeError::EmptyOutput {
            path: path.to_path_buf(),
        }
        .into())
    }
}
