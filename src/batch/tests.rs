use super::*;
use crate::merge::Merger;
use crate::test_helpers::{
    GaugedMerger, PanickingMerger, PlaylistServer, concat_merger, test_config,
};
use crate::types::{BatchStatus, ItemStatus};
use std::io::Read;
use std::sync::atomic::Ordering;

struct Harness {
    coordinator: BatchCoordinator,
    events: broadcast::Receiver<Event>,
    temp: tempfile::TempDir,
}

fn harness_with(merger: Arc<dyn Merger>, tweak: impl FnOnce(&mut Config)) -> Harness {
    let temp = tempfile::tempdir().unwrap();
    let mut config = test_config(temp.path());
    tweak(&mut config);
    let (tx, rx) = broadcast::channel(256);
    let factory = PipelineFactory::new(&config, reqwest::Client::new(), merger);
    Harness {
        coordinator: BatchCoordinator::new(&config, factory, tx),
        events: rx,
        temp,
    }
}

fn harness() -> Harness {
    harness_with(concat_merger(), |_| {})
}

#[tokio::test]
async fn two_successes_and_one_failure_complete_with_errors() {
    let origin = PlaylistServer::start().await;
    let urls = vec![
        origin.playlist("a", 3, &[]).await,
        origin.missing("b").await,
        origin.playlist("c", 2, &[]).await,
    ];
    let h = harness();

    let id = h.coordinator.submit(urls.clone()).await.unwrap();
    let snapshot = h.coordinator.join(&id).await.unwrap();

    assert_eq!(snapshot.status, BatchStatus::CompletedWithErrors);
    assert_eq!(snapshot.total_count, 3);
    assert_eq!(snapshot.completed_count, 2);
    assert_eq!(snapshot.failed_count, 1);
    assert!(snapshot.finished_at.is_some());

    let items = &snapshot.items;
    assert_eq!(items[0].url, urls[0]);
    assert_eq!(items[0].status, ItemStatus::Completed);
    assert_eq!(items[0].percent, 100);
    assert_eq!(items[0].message, ITEM_COMPLETE_MESSAGE);
    assert_eq!(items[1].status, ItemStatus::Failed);
    assert!(items[1].message.starts_with("Error: "));
    assert!(items[1].error.as_deref().unwrap().contains("404"));
    assert_eq!(items[2].status, ItemStatus::Completed);
}

#[tokio::test]
async fn counters_match_total_once_terminal() {
    let origin = PlaylistServer::start().await;
    let urls = vec![
        origin.playlist("ok", 2, &[]).await,
        origin.playlist("broken", 2, &[0, 1]).await,
    ];
    let h = harness();

    let id = h.coordinator.submit(urls).await.unwrap();
    let snapshot = h.coordinator.join(&id).await.unwrap();

    assert!(snapshot.status.is_terminal());
    assert_eq!(
        snapshot.completed_count + snapshot.failed_count,
        snapshot.total_count
    );
    assert!(snapshot.items.iter().all(|i| i.status.is_terminal()));
}

#[tokio::test]
async fn every_item_failing_is_failed() {
    let origin = PlaylistServer::start().await;
    let urls = vec![origin.missing("x").await, origin.missing("y").await];
    let h = harness();

    let id = h.coordinator.submit(urls).await.unwrap();
    let snapshot = h.coordinator.join(&id).await.unwrap();

    assert_eq!(snapshot.status, BatchStatus::Failed);
    assert_eq!(snapshot.failed_count, 2);

    let err = h.coordinator.fetch_archive(&id).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Batch(BatchError::NotReady {
            status: BatchStatus::Failed,
            ..
        })
    ));
}

#[tokio::test]
async fn archive_holds_one_entry_per_completed_item() {
    let origin = PlaylistServer::start().await;
    let urls = vec![
        origin.playlist("first", 2, &[]).await,
        origin.missing("second").await,
        origin.playlist("third", 1, &[]).await,
    ];
    let h = harness();

    let id = h.coordinator.submit(urls).await.unwrap();
    h.coordinator.join(&id).await.unwrap();
    let archive = h.coordinator.fetch_archive(&id).await.unwrap();

    assert_eq!(
        archive.download_name,
        format!("m3u8_batch_{}_2_videos.zip", id.short())
    );
    assert!(archive.path.starts_with(h.temp.path().join("archives")));

    let mut zip = zip::ZipArchive::new(std::fs::File::open(&archive.path).unwrap()).unwrap();
    assert_eq!(zip.len(), 2);
    let mut names = Vec::new();
    let mut bodies = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).unwrap();
        names.push(entry.name().to_string());
        let mut body = String::new();
        entry.read_to_string(&mut body).unwrap();
        bodies.push(body);
    }
    assert_eq!(names, vec!["video_001.ts", "video_002.ts"]);
    bodies.sort();
    assert_eq!(bodies, vec!["first:0;first:1;", "third:0;"]);
}

#[tokio::test]
async fn release_waits_for_archive_packaging() {
    let origin = PlaylistServer::start().await;
    let mut urls = Vec::new();
    for i in 0..6 {
        urls.push(origin.playlist(&format!("race{i}"), 3, &[]).await);
    }
    let h = harness();

    for _ in 0..10 {
        let id = h.coordinator.submit(urls.clone()).await.unwrap();
        h.coordinator.join(&id).await.unwrap();

        let fetch = tokio::spawn({
            let coordinator = h.coordinator.clone();
            let id = id.clone();
            async move { coordinator.fetch_archive(&id).await }
        });
        let release = tokio::spawn({
            let coordinator = h.coordinator.clone();
            let id = id.clone();
            async move { coordinator.release(&id).await }
        });

        release.await.unwrap().unwrap();
        match fetch.await.unwrap() {
            Ok(archive) => {
                let zip =
                    zip::ZipArchive::new(std::fs::File::open(&archive.path).unwrap()).unwrap();
                assert_eq!(zip.len(), 6);
            }
            Err(Error::Batch(BatchError::NotFound { .. })) => {}
            Err(e) => panic!("archive raced with release: {e}"),
        }
    }

    let temp_dir = h.temp.path().join("temp");
    assert_eq!(std::fs::read_dir(&temp_dir).unwrap().count(), 0);
    // only complete archives are left behind
    for entry in std::fs::read_dir(h.temp.path().join("archives")).unwrap() {
        let path = entry.unwrap().path();
        assert!(zip::ZipArchive::new(std::fs::File::open(&path).unwrap()).is_ok());
    }
}

#[tokio::test]
async fn archive_rejected_while_processing() {
    let origin = PlaylistServer::start().await;
    let urls = vec![origin.stalled("slow", Duration::from_secs(3)).await];
    let h = harness();

    let id = h.coordinator.submit(urls).await.unwrap();
    let err = h.coordinator.fetch_archive(&id).await.unwrap_err();

    match err {
        Error::Batch(BatchError::NotReady { id: got, status }) => {
            assert_eq!(got, id);
            assert_eq!(status, BatchStatus::Processing);
        }
        other => panic!("expected NotReady, got {other:?}"),
    }
    h.coordinator.cancel(&id).await.unwrap();
}

#[tokio::test]
async fn unknown_batch_is_not_found() {
    let h = harness();
    let id = BatchId::from("does-not-exist");

    assert!(matches!(
        h.coordinator.snapshot(&id).await,
        Err(Error::Batch(BatchError::NotFound { .. }))
    ));
    assert!(matches!(
        h.coordinator.fetch_archive(&id).await,
        Err(Error::Batch(BatchError::NotFound { .. }))
    ));
    assert!(matches!(
        h.coordinator.release(&id).await,
        Err(Error::Batch(BatchError::NotFound { .. }))
    ));
}

#[tokio::test]
async fn submit_validates_urls() {
    let h = harness();

    let empty = h.coordinator.submit(vec![]).await.unwrap_err();
    assert!(matches!(empty, Error::Validation(_)));

    let blanks = h
        .coordinator
        .submit(vec!["  ".into(), String::new()])
        .await
        .unwrap_err();
    assert!(blanks.to_string().contains("No valid M3U8 URLs"));

    let scheme = h
        .coordinator
        .submit(vec!["ftp://h/a.m3u8".into()])
        .await
        .unwrap_err();
    assert!(scheme.to_string().contains("http://"));

    let not_playlist = h
        .coordinator
        .submit(vec!["https://h/video.mp4".into()])
        .await
        .unwrap_err();
    assert!(not_playlist.to_string().contains("M3U8"));

    let too_many: Vec<String> = (0..11).map(|i| format!("https://h/{i}.m3u8")).collect();
    let oversized = h.coordinator.submit(too_many).await.unwrap_err();
    assert!(oversized.to_string().contains("Maximum 10"));

    assert!(h.coordinator.is_empty().await);
}

#[tokio::test]
async fn concurrency_is_bounded() {
    let origin = PlaylistServer::start().await;
    let mut urls = Vec::new();
    for name in ["p1", "p2", "p3", "p4"] {
        urls.push(origin.playlist(name, 1, &[]).await);
    }
    let merger = Arc::new(GaugedMerger::new(Duration::from_millis(150)));
    let h = harness_with(merger.clone(), |c| c.download.batch_concurrency = 2);

    let id = h.coordinator.submit(urls).await.unwrap();
    let snapshot = h.coordinator.join(&id).await.unwrap();

    assert_eq!(snapshot.status, BatchStatus::Completed);
    let peak = merger.peak.load(Ordering::SeqCst);
    assert!(peak <= 2, "at most 2 pipelines at once, saw {peak}");
    assert!(peak >= 1);
}

#[tokio::test]
async fn worker_panic_becomes_item_failure() {
    let origin = PlaylistServer::start().await;
    let urls = vec![origin.playlist("boom", 1, &[]).await];
    let h = harness_with(Arc::new(PanickingMerger), |_| {});

    let id = h.coordinator.submit(urls).await.unwrap();
    let snapshot = tokio::time::timeout(Duration::from_secs(10), h.coordinator.join(&id))
        .await
        .expect("batch must not stay processing")
        .unwrap();

    assert_eq!(snapshot.status, BatchStatus::Failed);
    let error = snapshot.items[0].error.as_deref().unwrap();
    assert!(error.contains("worker panicked"));
    assert!(error.contains("merger exploded"));

    // the panicking pipeline still frees its scratch area
    let temp_dir = h.temp.path().join("temp");
    assert_eq!(std::fs::read_dir(&temp_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn cancel_fails_running_and_queued_items() {
    let origin = PlaylistServer::start().await;
    let mut urls = Vec::new();
    for name in ["s1", "s2", "s3"] {
        urls.push(origin.stalled(name, Duration::from_secs(5)).await);
    }
    let h = harness_with(concat_merger(), |c| c.download.batch_concurrency = 1);

    let id = h.coordinator.submit(urls).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.coordinator.cancel(&id).await.unwrap();

    let snapshot = tokio::time::timeout(Duration::from_secs(3), h.coordinator.join(&id))
        .await
        .expect("cancelled batch must resolve quickly")
        .unwrap();

    assert_eq!(snapshot.status, BatchStatus::Failed);
    assert_eq!(snapshot.failed_count, 3);
    for item in &snapshot.items {
        assert_eq!(item.error.as_deref(), Some("download cancelled"));
    }
}

#[tokio::test]
async fn release_requires_terminal_and_frees_scratch() {
    let origin = PlaylistServer::start().await;
    let h = harness();

    let slow = h
        .coordinator
        .submit(vec![origin.stalled("wait", Duration::from_secs(3)).await])
        .await
        .unwrap();
    assert!(matches!(
        h.coordinator.release(&slow).await,
        Err(Error::Batch(BatchError::NotReady { .. }))
    ));
    h.coordinator.cancel(&slow).await.unwrap();
    h.coordinator.join(&slow).await.unwrap();
    h.coordinator.release(&slow).await.unwrap();

    let id = h
        .coordinator
        .submit(vec![origin.playlist("keep", 1, &[]).await])
        .await
        .unwrap();
    h.coordinator.join(&id).await.unwrap();
    let temp_dir = h.temp.path().join("temp");
    assert_eq!(std::fs::read_dir(&temp_dir).unwrap().count(), 1);

    h.coordinator.release(&id).await.unwrap();
    assert_eq!(std::fs::read_dir(&temp_dir).unwrap().count(), 0);
    assert!(matches!(
        h.coordinator.snapshot(&id).await,
        Err(Error::Batch(BatchError::NotFound { .. }))
    ));
}

#[tokio::test]
async fn evict_expired_drops_finished_batches_only() {
    let origin = PlaylistServer::start().await;
    let h = harness();

    let done = h
        .coordinator
        .submit(vec![origin.playlist("done", 1, &[]).await])
        .await
        .unwrap();
    h.coordinator.join(&done).await.unwrap();
    let running = h
        .coordinator
        .submit(vec![origin.stalled("running", Duration::from_secs(3)).await])
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.coordinator.evict_expired(Duration::from_millis(1)).await, 1);
    assert!(h.coordinator.snapshot(&done).await.is_err());
    assert!(h.coordinator.snapshot(&running).await.is_ok());

    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn events_report_items_and_completion() {
    let origin = PlaylistServer::start().await;
    let urls = vec![
        origin.playlist("e1", 4, &[1]).await,
        origin.missing("e2").await,
    ];
    let mut h = harness();

    let id = h.coordinator.submit(urls).await.unwrap();
    h.coordinator.join(&id).await.unwrap();

    let mut saw_complete_item = false;
    let mut saw_failed_item = false;
    let mut saw_batch_complete = false;
    while let Ok(event) = h.events.try_recv() {
        match event {
            Event::BatchItemComplete {
                index,
                segments_total,
                segments_failed,
                ..
            } => {
                assert_eq!(index, 0);
                assert_eq!(segments_total, 4);
                assert_eq!(segments_failed, 1);
                saw_complete_item = true;
            }
            Event::BatchItemFailed { index, .. } => {
                assert_eq!(index, 1);
                saw_failed_item = true;
            }
            Event::BatchComplete {
                batch_id, status, ..
            } => {
                assert_eq!(batch_id, id);
                assert_eq!(status, BatchStatus::CompletedWithErrors);
                saw_batch_complete = true;
            }
            _ => {}
        }
    }
    assert!(saw_complete_item && saw_failed_item && saw_batch_complete);
}
