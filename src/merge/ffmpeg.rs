//! ffmpeg-based merger using the concat demuxer

use super::traits::Merger;
use super::{bounded, ensure_output};
use crate::error::{Error, MergeError, Result};
use crate::utils::stderr_tail;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

const MANIFEST_NAME: &str = "concat.txt";
const OUTPUT_NAME: &str = "output.mp4";

/// Merger that runs an external ffmpeg binary
///
/// Segments are stream-copied (`-c copy`), never re-encoded.
///
/// # Examples
///
/// ```no_run
/// use hls_dl::merge::FfmpegMerger;
/// use std::path::PathBuf;
/// use std::time::Duration;
///
/// // Explicit binary
/// let merger = FfmpegMerger::new(PathBuf::from("/usr/bin/ffmpeg"), Duration::from_secs(300));
///
/// // Or auto-discover from PATH
/// let merger = FfmpegMerger::from_path(Duration::from_secs(300));
/// ```
#[derive(Debug, Clone)]
pub struct FfmpegMerger {
    binary_path: PathBuf,
    timeout: Duration,
}

impl FfmpegMerger {
    /// Create a merger with an explicit binary path
    pub fn new(binary_path: PathBuf, timeout: Duration) -> Self {
        Self {
            binary_path,
            timeout,
        }
    }

    /// Attempt to find ffmpeg in PATH
    ///
    /// Returns `None` if the binary is not found.
    pub fn from_path(timeout: Duration) -> Option<Self> {
        which::which("ffmpeg")
            .ok()
            .map(|path| Self::new(path, timeout))
    }

    /// Path of the binary this merger runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    async fn run(&self, segments: &[PathBuf], scratch_dir: &Path) -> Result<PathBuf> {
        let manifest = concat_manifest(segments)?;
        tokio::fs::write(scratch_dir.join(MANIFEST_NAME), manifest).await?;

        let child = Command::new(&self.binary_path)
            .args(["-hide_banner", "-loglevel", "error"])
            .args(["-f", "concat", "-safe", "0", "-i", MANIFEST_NAME])
            .args(["-c", "copy", "-y", OUTPUT_NAME])
            .current_dir(scratch_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("Failed to execute ffmpeg: {}", e)))?;

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(MergeError::ToolFailure {
                code: output.status.code(),
                stderr: stderr_tail(&output.stderr),
            }
            .into());
        }

        let output_path = scratch_dir.join(OUTPUT_NAME);
        ensure_output(&output_path).await?;
        Ok(output_path)
    }
}

#[async_trait]
impl Merger for FfmpegMerger {
    async fn merge(
        &self,
        segments: &[PathBuf],
        scratch_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        bounded(self.run(segments, scratch_dir), self.timeout, cancel).await
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn remuxes(&self) -> bool {
        true
    }
}

/// Build the concat demuxer manifest: one `file '<absolute path>'` line per
/// segment, with single quotes escaped as `'\''`
pub fn concat_manifest(segments: &[PathBuf]) -> Result<String> {
    let mut manifest = String::new();
    for segment in segments {
        let absolute = std::path::absolute(segment)?;
        let escaped = absolute.to_string_lossy().replace('\'', r"'\''");
        manifest.push_str("file '");
        manifest.push_str(&escaped);
        manifest.push_str("'\n");
    }
    Ok(manifest)
}
