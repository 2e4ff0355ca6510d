use super::*;
use crate::test_helpers::{PlaylistServer, concat_merger, create_test_downloader, test_config};
use crate::types::DownloadMode;
use std::time::Duration;
use tempfile::tempdir;

mod single;

#[tokio::test]
async fn test_new_creates_directories() {
    let temp = tempdir().unwrap();
    let config = test_config(temp.path());
    let temp_dir = config.download.temp_dir.clone();
    let archive_dir = config.archive_dir();

    HlsDownloader::new(config).await.unwrap();

    assert!(temp_dir.is_dir());
    assert!(archive_dir.is_dir());
}

#[tokio::test]
async fn test_without_ffmpeg_falls_back_to_concat() {
    let temp = tempdir().unwrap();
    let downloader = HlsDownloader::new(test_config(temp.path())).await.unwrap();

    let caps = downloader.capabilities();
    assert_eq!(caps.merger, "concat");
    assert!(!caps.remuxes);
}

#[tokio::test]
async fn test_configured_ffmpeg_path_is_used() {
    let temp = tempdir().unwrap();
    let mut config = test_config(temp.path());
    config.tools.ffmpeg_path = Some("/opt/tools/ffmpeg".into());

    let downloader = HlsDownloader::new(config).await.unwrap();

    let caps = downloader.capabilities();
    assert_eq!(caps.merger, "ffmpeg");
    assert!(caps.remuxes);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let temp = tempdir().unwrap();
    let mut config = test_config(temp.path());
    config.download.max_batch_size = 0;

    let err = HlsDownloader::with_merger(config, concat_merger())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::Config { .. }));
}

#[tokio::test]
async fn test_get_config_shares_instance() {
    let (downloader, _temp) = create_test_downloader().await;
    let a = downloader.get_config();
    let b = downloader.clone().get_config();
    assert!(Arc::ptr_eq(&a, &b));
}
