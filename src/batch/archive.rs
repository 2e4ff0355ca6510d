//! ZIP packaging of a batch's merged outputs

use crate::error::{BatchError, Error, Result};
use crate::types::BatchId;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};

/// Entries at or above this size need ZIP64 headers
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// A finished archive ready to be streamed
///
/// The caller owns the file and deletes it once it has been sent.
#[derive(Debug, Clone)]
pub struct ArchiveFile {
    /// Archive location on disk
    pub path: PathBuf,
    /// File name offered to the client (`m3u8_batch_<id8>_<n>_videos.zip`)
    pub download_name: String,
}

/// Builds flat ZIP archives with sequentially named entries
pub struct ArchiveBuilder;

impl ArchiveBuilder {
    /// Entry name for the `position`-th output (0-based)
    pub fn entry_name(position: usize, source: &Path) -> String {
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        format!("video_{:03}.{}", position + 1, ext)
    }

    /// Download name for a batch archive holding `count` videos
    pub fn download_name(id: &BatchId, count: usize) -> String {
        format!("m3u8_batch_{}_{}_videos.zip", id.short(), count)
    }

    /// Write `outputs` into a ZIP at `dest`, in the given order
    ///
    /// Runs on the blocking pool. Fails with
    /// [`BatchError::NoSuccessfulItems`] when `outputs` is empty.
    pub async fn build(id: &BatchId, outputs: Vec<PathBuf>, dest: PathBuf) -> Result<PathBuf> {
        if outputs.is_empty() {
            return Err(BatchError::NoSuccessfulItems { id: id.clone() }.into());
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let count = outputs.len();
        let target = dest.clone();
        let written = spawn_blocking(move || write_archive(&outputs, &target))
            .await
            .map_err(|e| Error::Other(format!("archive task panicked: {}", e)))
            .and_then(|r| r);
        if let Err(e) = written {
            discard_partial(&dest).await;
            return Err(e);
        }

        info!(batch_id = %id, entries = count, archive = %dest.display(), "batch archive created");
        Ok(dest)
    }
}

async fn discard_partial(dest: &Path) {
    match tokio::fs::remove_file(dest).await {
        Ok(()) => debug!(archive = %dest.display(), "removed partial archive"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(archive = %dest.display(), error = %e, "failed to remove partial archive"),
    }
}

fn write_archive(outputs: &[PathBuf], dest: &Path) -> Result<()> {
    let file = std::fs::File::create(dest)?;
    let mut zip = zip::ZipWriter::new(file);

    for (position, source) in outputs.iter().enumerate() {
        let name = ArchiveBuilder::entry_name(position, source);
        let size = std::fs::metadata(source)?.len();
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .large_file(size >= ZIP64_THRESHOLD);

        debug!(entry = %name, source = %source.display(), "adding archive entry");
        zip.start_file(name, options)?;
        let mut input = std::fs::File::open(source)?;
        std::io::copy(&mut input, &mut zip)?;
    }

    let mut file = zip.finish()?;
    file.flush()?;
    Ok(())
}
