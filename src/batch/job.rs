//! Batch job state and the per-item progress sink

use crate::pipeline::PipelineOutput;
use crate::progress::ProgressSink;
use crate::types::{BatchId, BatchSnapshot, BatchStatus, Event, ItemSnapshot, ItemStatus};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{RwLock, RwLockReadGuard, broadcast, watch};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Message recorded for an item whose pipeline succeeded
pub const ITEM_COMPLETE_MESSAGE: &str = "Download completed";

/// One URL of a batch
#[derive(Debug, Clone)]
pub struct DownloadItem {
    /// Source playlist URL
    pub url: Url,
    /// Item status
    pub status: ItemStatus,
    /// Completion percent (non-decreasing)
    pub percent: u8,
    /// Latest status message
    pub message: String,
    /// Merged file, once completed
    pub output_path: Option<PathBuf>,
    /// Error text, once failed
    pub error: Option<String>,
}

impl DownloadItem {
    fn pending(url: Url) -> Self {
        Self {
            url,
            status: ItemStatus::Pending,
            percent: 0,
            message: "Waiting to start...".to_string(),
            output_path: None,
            error: None,
        }
    }
}

/// Mutable part of a batch, guarded by one mutex
#[derive(Debug)]
struct JobState {
    items: Vec<DownloadItem>,
    completed_count: usize,
    failed_count: usize,
    status: BatchStatus,
    finished_at: Option<DateTime<Utc>>,
    finished_instant: Option<Instant>,
    /// Completed outputs, in completion order
    outputs: Vec<PipelineOutput>,
    /// Set once the outputs were taken for release
    released: bool,
}

/// A submitted batch
///
/// Every mutation goes through the internal mutex, so counters and item
/// states stay consistent while workers finish concurrently. Outcome events
/// are sent under the same lock: item events always precede the
/// `batch_complete` event, which precedes waking the join waiters.
#[derive(Debug)]
pub struct BatchJob {
    id: BatchId,
    created_at: DateTime<Utc>,
    cancel: CancellationToken,
    status_tx: watch::Sender<BatchStatus>,
    events: broadcast::Sender<Event>,
    state: Mutex<JobState>,
    /// Read-held while an archive is packaged, write-held while outputs are released
    packaging: RwLock<()>,
}

impl BatchJob {
    /// New job with one pending item per URL
    pub fn new(id: BatchId, urls: Vec<Url>, events: broadcast::Sender<Event>) -> Self {
        let (status_tx, _) = watch::channel(BatchStatus::Processing);
        Self {
            id,
            created_at: Utc::now(),
            cancel: CancellationToken::new(),
            status_tx,
            events,
            state: Mutex::new(JobState {
                items: urls.into_iter().map(DownloadItem::pending).collect(),
                completed_count: 0,
                failed_count: 0,
                status: BatchStatus::Processing,
                finished_at: None,
                finished_instant: None,
                outputs: Vec::new(),
                released: false,
            }),
            packaging: RwLock::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Batch id
    pub fn id(&self) -> &BatchId {
        &self.id
    }

    /// Token cancelling every pipeline of this batch
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Current overall status
    pub fn status(&self) -> BatchStatus {
        self.lock().status
    }

    /// Number of items
    pub fn total_count(&self) -> usize {
        self.lock().items.len()
    }

    /// Item URL at `index`
    pub fn item_url(&self, index: usize) -> Option<Url> {
        self.lock().items.get(index).map(|item| item.url.clone())
    }

    /// Receiver observing status changes
    pub fn watch_status(&self) -> watch::Receiver<BatchStatus> {
        self.status_tx.subscribe()
    }

    /// Mark an item as running
    pub fn start_item(&self, index: usize) {
        let mut state = self.lock();
        if let Some(item) = state.items.get_mut(index)
            && item.status == ItemStatus::Pending
        {
            item.status = ItemStatus::Downloading;
            item.message = "Starting download...".to_string();
        }
    }

    /// Record a progress report for a running item
    pub fn update_item(&self, index: usize, percent: u8, message: &str) {
        let mut state = self.lock();
        if let Some(item) = state.items.get_mut(index)
            && !item.status.is_terminal()
        {
            item.status = ItemStatus::Downloading;
            item.percent = item.percent.max(percent.min(100));
            item.message = message.to_string();
        }
    }

    /// Record a successful pipeline
    ///
    /// Returns the output back if the item was already terminal.
    pub fn complete_item(
        &self,
        index: usize,
        output: PipelineOutput,
    ) -> std::result::Result<(), PipelineOutput> {
        let mut state = self.lock();
        let Some(item) = state.items.get_mut(index) else {
            return Err(output);
        };
        if item.status.is_terminal() {
            return Err(output);
        }
        item.status = ItemStatus::Completed;
        item.percent = 100;
        item.message = ITEM_COMPLETE_MESSAGE.to_string();
        item.output_path = Some(output.path.clone());
        state.completed_count += 1;

        tracing::info!(batch_id = %self.id, index, path = %output.path.display(), "batch item completed");
        self.emit(Event::BatchItemComplete {
            batch_id: self.id.clone(),
            index,
            segments_total: output.segments_total,
            segments_failed: output.segments_failed,
        });
        state.outputs.push(output);
        self.resolve(&mut state);
        Ok(())
    }

    /// Record a failed pipeline
    pub fn fail_item(&self, index: usize, error: &str) {
        let mut state = self.lock();
        if self.mark_failed(&mut state, index, error) {
            self.resolve(&mut state);
        }
    }

    /// Fail every item that is not terminal yet (workers that vanished)
    pub fn fail_unfinished(&self, error: &str) -> usize {
        let mut state = self.lock();
        let mut failed = 0;
        for index in 0..state.items.len() {
            if self.mark_failed(&mut state, index, error) {
                failed += 1;
            }
        }
        self.resolve(&mut state);
        failed
    }

    fn mark_failed(&self, state: &mut JobState, index: usize, error: &str) -> bool {
        let Some(item) = state.items.get_mut(index) else {
            return false;
        };
        if item.status.is_terminal() {
            return false;
        }
        item.status = ItemStatus::Failed;
        item.message = format!("Error: {error}");
        item.error = Some(error.to_string());
        state.failed_count += 1;

        tracing::warn!(batch_id = %self.id, index, error, "batch item failed");
        self.emit(Event::BatchItemFailed {
            batch_id: self.id.clone(),
            index,
            error: error.to_string(),
        });
        true
    }

    /// Resolve the overall status once every item is terminal
    fn resolve(&self, state: &mut JobState) {
        if state.status.is_terminal() || !state.items.iter().all(|i| i.status.is_terminal()) {
            return;
        }
        let status = BatchStatus::from_counts(state.completed_count, state.failed_count);
        state.status = status;
        state.finished_at = Some(Utc::now());
        state.finished_instant = Some(Instant::now());

        tracing::info!(
            batch_id = %self.id,
            status = %status,
            completed = state.completed_count,
            failed = state.failed_count,
            "batch finished"
        );
        self.emit(Event::BatchComplete {
            batch_id: self.id.clone(),
            status,
            completed_count: state.completed_count,
            failed_count: state.failed_count,
        });
        self.status_tx.send_replace(status);
    }

    fn emit(&self, event: Event) {
        // no subscribers is fine
        self.events.send(event).ok();
    }

    /// Poll view
    pub fn snapshot(&self) -> BatchSnapshot {
        let state = self.lock();
        BatchSnapshot {
            id: self.id.clone(),
            status: state.status,
            total_count: state.items.len(),
            completed_count: state.completed_count,
            failed_count: state.failed_count,
            created_at: self.created_at,
            finished_at: state.finished_at,
            items: state
                .items
                .iter()
                .map(|item| ItemSnapshot {
                    url: item.url.to_string(),
                    status: item.status,
                    percent: item.percent,
                    message: item.message.clone(),
                    error: item.error.clone(),
                })
                .collect(),
        }
    }

    /// Paths of completed outputs, in completion order
    ///
    /// `None` once the outputs were released.
    pub fn output_paths(&self) -> Option<Vec<PathBuf>> {
        let state = self.lock();
        if state.released {
            return None;
        }
        Some(state.outputs.iter().map(|o| o.path.clone()).collect())
    }

    /// Keep the outputs on disk until the guard is dropped
    ///
    /// [`BatchJob::release_outputs`] waits for every outstanding hold.
    pub async fn hold_outputs(&self) -> RwLockReadGuard<'_, ()> {
        self.packaging.read().await
    }

    /// Whether the job finished longer than `ttl` ago
    pub fn expired(&self, ttl: std::time::Duration) -> bool {
        self.lock()
            .finished_instant
            .is_some_and(|at| at.elapsed() > ttl)
    }

    /// Release the scratch areas of every output
    ///
    /// Waits until no archive is being packaged from them. Later
    /// [`BatchJob::output_paths`] calls return `None`.
    pub async fn release_outputs(&self) {
        let _packaging = self.packaging.write().await;
        let outputs = {
            let mut state = self.lock();
            state.released = true;
            std::mem::take(&mut state.outputs)
        };
        for output in outputs {
            output.release().await;
        }
    }
}

/// [`ProgressSink`] writing into exactly one item of a batch
pub struct ItemProgress {
    job: Arc<BatchJob>,
    index: usize,
}

impl ItemProgress {
    /// Sink for item `index` of `job`
    pub fn new(job: Arc<BatchJob>, index: usize) -> Self {
        Self { job, index }
    }
}

impl ProgressSink for ItemProgress {
    fn report(&self, percent: u8, message: &str) {
        self.job.update_item(self.index, percent, message);
    }

    // the worker records the terminal state from the pipeline's result
    fn finish(&self, _message: &str) {}

    fn fail(&self, _message: &str) {}
}
