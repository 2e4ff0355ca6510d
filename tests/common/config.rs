//! Test configuration and downloader construction

use hls_dl::{ConcatMerger, Config, HlsDownloader};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Configuration rooted in `root` that never looks for ffmpeg
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.download.temp_dir = root.join("temp");
    config.download.archive_dir = Some(root.join("archives"));
    config.download.playlist_timeout = Duration::from_secs(5);
    config.download.segment_timeout = Duration::from_secs(5);
    config.tools.search_path = false;
    config.tools.merge_timeout = Duration::from_secs(10);
    config.discovery.validate_links = false;
    config
}

/// Downloader using the in-process concat merger
///
/// The returned `TempDir` must outlive the downloader.
pub async fn create_downloader() -> (Arc<HlsDownloader>, TempDir) {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp_dir.path());
    let downloader = HlsDownloader::with_merger(
        config,
        Arc::new(ConcatMerger::new(Duration::from_secs(10))),
    )
    .await
    .expect("downloader");
    (Arc::new(downloader), temp_dir)
}
