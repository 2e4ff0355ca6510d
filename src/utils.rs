//! Utility functions for scratch areas, URL checks and tool output

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Number of stderr lines kept when an external tool fails
const STDERR_TAIL_LINES: usize = 20;

/// Per-pipeline working directory
///
/// A scratch area is never removed by a destructor. Whoever ends up owning it
/// calls [`ScratchDir::release`] once the files inside are no longer needed.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create `root/<prefix>_<uuid>`
    pub async fn create(root: &Path, prefix: &str) -> Result<Self> {
        let path = root.join(format!("{}_{}", prefix, uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self { path })
    }

    /// Directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory and everything inside it
    ///
    /// Failures are logged and swallowed: a leftover directory is not worth
    /// failing a finished download over.
    pub async fn release(self) {
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => tracing::debug!(path = %self.path.display(), "released scratch directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove scratch directory"
            ),
        }
    }
}

/// Parse a caller-supplied URL, accepting only http and https
///
/// # Examples
///
/// ```
/// use hls_dl::utils::validate_http_url;
///
/// assert!(validate_http_url("https://cdn.example.com/live/index.m3u8").is_ok());
/// assert!(validate_http_url("ftp://example.com/index.m3u8").is_err());
/// ```
pub fn validate_http_url(raw: &str) -> Result<url::Url> {
    let trimmed = raw.trim();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(Error::Validation(
            "invalid URL format: must start with http:// or https://".to_string(),
        ));
    }
    url::Url::parse(trimmed).map_err(|e| Error::Validation(format!("invalid URL {trimmed}: {e}")))
}

/// Whether the URL path names a playlist file (`.m3u8`)
pub fn is_playlist_url(url: &url::Url) -> bool {
    url.path().to_ascii_lowercase().ends_with(".m3u8")
}

/// Keep the last lines of a tool's stderr for error reporting
pub fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// MIME type for a merged output file, based on its extension
pub fn media_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("mp4") => "video/mp4",
        Some("ts") => "video/mp2t",
        _ => "application/octet-stream",
    }
}

/// Whether `path` is a regular file with at least one byte
pub(crate) async fn file_has_content(path: &Path) -> bool {
    matches!(tokio::fs::metadata(path).await, Ok(meta) if meta.is_file() && meta.len() > 0)
}

/// Text carried by a caught panic payload
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
