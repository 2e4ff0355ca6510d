use super::*;
use crate::pipeline::COMPLETE_MESSAGE;
use crate::types::TaskId;

#[tokio::test]
async fn test_single_download_produces_merged_file() {
    let origin = PlaylistServer::start().await;
    let url = origin.playlist("clip", 3, &[]).await;
    let (downloader, _temp) = create_test_downloader().await;

    let id = downloader.start_single(&url).await.unwrap();
    downloader.wait_single(&id).await.unwrap();

    let progress = downloader.poll_single(&id);
    assert_eq!(progress.percent, 100);
    assert_eq!(progress.message, COMPLETE_MESSAGE);

    let output = downloader.take_output(&id).await.unwrap();
    assert_eq!(
        tokio::fs::read_to_string(&output.path).await.unwrap(),
        "clip:0;clip:1;clip:2;"
    );
    assert_eq!(output.segments_total, 3);
    assert_eq!(output.segments_failed, 0);

    let scratch = output.scratch.path().to_path_buf();
    assert!(
        scratch
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("m3u8_download_")
    );
    output.release().await;
    assert!(!scratch.exists());
}

#[tokio::test]
async fn test_output_can_be_claimed_once() {
    let origin = PlaylistServer::start().await;
    let url = origin.playlist("once", 1, &[]).await;
    let (downloader, _temp) = create_test_downloader().await;

    let id = downloader.start_single(&url).await.unwrap();
    downloader.wait_single(&id).await.unwrap();

    let output = downloader.take_output(&id).await.unwrap();
    let err = downloader.take_output(&id).await.unwrap_err();
    assert!(matches!(err, Error::TaskNotFound(_)));

    // progress stays pollable after the output was claimed
    assert_eq!(downloader.poll_single(&id).percent, 100);
    output.release().await;
}

#[tokio::test]
async fn test_failed_task_reports_error_verbatim() {
    let origin = PlaylistServer::start().await;
    let url = origin.missing("gone").await;
    let (downloader, _temp) = create_test_downloader().await;

    let id = downloader.start_single(&url).await.unwrap();
    downloader.wait_single(&id).await.unwrap();

    let progress = downloader.poll_single(&id);
    assert!(progress.message.contains("404"), "{}", progress.message);

    match downloader.take_output(&id).await.unwrap_err() {
        Error::TaskFailed { id: failed, message } => {
            assert_eq!(failed, id);
            assert_eq!(message, progress.message);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_running_task_is_not_ready() {
    let origin = PlaylistServer::start().await;
    let url = origin.stalled("slow", Duration::from_secs(30)).await;
    let (downloader, _temp) = create_test_downloader().await;

    let id = downloader.start_single(&url).await.unwrap();

    let err = downloader.take_output(&id).await.unwrap_err();
    assert!(matches!(err, Error::TaskNotReady(_)));

    downloader.cancel_single(&id).await.unwrap();
}

#[tokio::test]
async fn test_cancel_single_fails_the_task() {
    let origin = PlaylistServer::start().await;
    let url = origin.stalled("stuck", Duration::from_secs(30)).await;
    let (downloader, _temp) = create_test_downloader().await;

    let id = downloader.start_single(&url).await.unwrap();
    downloader.cancel_single(&id).await.unwrap();
    downloader.wait_single(&id).await.unwrap();

    assert_eq!(downloader.poll_single(&id).message, "download cancelled");
    assert!(matches!(
        downloader.take_output(&id).await.unwrap_err(),
        Error::TaskFailed { .. }
    ));
}

#[tokio::test]
async fn test_unknown_task_ids() {
    let (downloader, _temp) = create_test_downloader().await;
    let id = TaskId::from("does-not-exist");

    let progress = downloader.poll_single(&id);
    assert_eq!(progress.percent, 0);
    assert_eq!(progress.message, "Unknown task");
    assert!(matches!(
        downloader.take_output(&id).await.unwrap_err(),
        Error::TaskNotFound(_)
    ));
    assert!(matches!(
        downloader.cancel_single(&id).await.unwrap_err(),
        Error::TaskNotFound(_)
    ));
}

#[tokio::test]
async fn test_start_single_rejects_non_http_urls() {
    let (downloader, _temp) = create_test_downloader().await;

    let err = downloader
        .start_single("ftp://example.com/list.m3u8")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_task_events_carry_segment_counts() {
    let origin = PlaylistServer::start().await;
    let url = origin.playlist("partial", 5, &[3]).await;
    let (downloader, _temp) = create_test_downloader().await;
    let mut events = downloader.subscribe();

    let id = downloader.start_single(&url).await.unwrap();

    loop {
        match events.recv().await.unwrap() {
            Event::TaskProgress { task_id, .. } => assert_eq!(task_id, id),
            Event::TaskComplete {
                task_id,
                segments_total,
                segments_failed,
            } => {
                assert_eq!(task_id, id);
                assert_eq!(segments_total, 5);
                assert_eq!(segments_failed, 1);
                break;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    let output = downloader.take_output(&id).await.unwrap();
    assert_eq!(
        tokio::fs::read_to_string(&output.path).await.unwrap(),
        "partial:0;partial:1;partial:2;partial:4;"
    );
    output.release().await;
}

#[tokio::test]
async fn test_resolve_direct_mode_requires_playlist() {
    let (downloader, _temp) = create_test_downloader().await;

    let url = downloader
        .resolve_playlist("https://cdn.test/live/index.m3u8", DownloadMode::Direct)
        .await
        .unwrap();
    assert_eq!(url.as_str(), "https://cdn.test/live/index.m3u8");

    let err = downloader
        .resolve_playlist("https://site.test/watch?v=1", DownloadMode::Direct)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "URL must be a valid M3U8 playlist file");
}

#[tokio::test]
async fn test_resolve_auto_mode_extracts_from_pages() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    let origin = PlaylistServer::start().await;
    Mock::given(method("GET"))
        .and(path("/watch"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<video data-src="/hls/first.m3u8"></video><a href="https://cdn.test/second.m3u8">"#,
        ))
        .mount(&origin.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>no video</p>"))
        .mount(&origin.server)
        .await;
    let (downloader, _temp) = create_test_downloader().await;

    // playlists pass through untouched in auto mode
    let direct = downloader
        .resolve_playlist("https://cdn.test/x.m3u8", DownloadMode::Auto)
        .await
        .unwrap();
    assert_eq!(direct.as_str(), "https://cdn.test/x.m3u8");

    let resolved = downloader
        .resolve_playlist(&origin.url("/watch"), DownloadMode::Auto)
        .await
        .unwrap();
    assert_eq!(resolved.as_str(), "https://cdn.test/second.m3u8");

    let err = downloader
        .resolve_playlist(&origin.url("/empty"), DownloadMode::Extract)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoPlaylistFound { .. }));
}

#[tokio::test]
async fn test_resolve_extract_mode_keeps_playlist_urls() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    let origin = PlaylistServer::start().await;
    let playlist = origin.playlist("media", 2, &[]).await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<video data-src="https://cdn.test/page.m3u8"></video>"#),
        )
        .mount(&origin.server)
        .await;
    let (downloader, _temp) = create_test_downloader().await;

    let resolved = downloader
        .resolve_playlist(&playlist, DownloadMode::Extract)
        .await
        .unwrap();
    assert_eq!(resolved.as_str(), playlist);

    let from_page = downloader
        .resolve_playlist(&origin.url("/page"), DownloadMode::Extract)
        .await
        .unwrap();
    assert_eq!(from_page.as_str(), "https://cdn.test/page.m3u8");

    // the resolved playlist downloads like a direct one
    let id = downloader.start_single(resolved.as_str()).await.unwrap();
    downloader.wait_single(&id).await.unwrap();
    let output = downloader.take_output(&id).await.unwrap();
    assert_eq!(
        tokio::fs::read_to_string(&output.path).await.unwrap(),
        "media:0;media:1;"
    );
    output.release().await;
}
