//! Event collection helpers

use hls_dl::{Event, HlsDownloader, TaskId};
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast;

/// Terminal event of a single task
#[derive(Debug, PartialEq)]
pub enum Finished {
    Complete {
        segments_total: usize,
        segments_failed: usize,
    },
    Failed(String),
}

/// Collect the progress percents of `id` until it finishes
///
/// Subscribe before starting the task so no event is missed.
pub async fn collect_until_finished(
    events: &mut broadcast::Receiver<Event>,
    id: &TaskId,
    timeout: Duration,
) -> (Vec<u8>, Finished) {
    let mut percents = Vec::new();
    let finished = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::TaskProgress {
                    task_id, percent, ..
                }) if &task_id == id => percents.push(percent),
                Ok(Event::TaskComplete {
                    task_id,
                    segments_total,
                    segments_failed,
                }) if &task_id == id => {
                    return Finished::Complete {
                        segments_total,
                        segments_failed,
                    };
                }
                Ok(Event::TaskFailed { task_id, error }) if &task_id == id => {
                    return Finished::Failed(error);
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Finished::Failed("event channel closed".to_string());
                }
            }
        }
    })
    .await
    .expect("task did not finish in time");
    (percents, finished)
}

/// Wait for `id` through the library API, bounded by `timeout`
pub async fn wait_single(downloader: &HlsDownloader, id: &TaskId, timeout: Duration) {
    tokio::time::timeout(timeout, downloader.wait_single(id))
        .await
        .expect("task did not finish in time")
        .expect("task is registered");
}

/// Names of the entries left in `dir`
pub fn dir_entries(dir: &Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}
