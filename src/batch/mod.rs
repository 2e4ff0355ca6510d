//! Batch downloads: many pipelines under bounded concurrency
//!
//! [`BatchCoordinator::submit`] registers a [`BatchJob`] and spawns a driver
//! task. The driver starts one worker per item inside a `JoinSet`; a shared
//! semaphore keeps at most `batch_concurrency` pipelines running. Each worker
//! reports through an [`ItemProgress`] sink bound to its own item and records
//! its outcome (including a panic) on the job. Once every item is terminal
//! the job resolves its overall status and wakes [`BatchCoordinator::join`]
//! waiters.

mod archive;
mod job;

pub use archive::{ArchiveBuilder, ArchiveFile};
pub use job::{BatchJob, DownloadItem, ITEM_COMPLETE_MESSAGE, ItemProgress};

use crate::config::Config;
use crate::error::{BatchError, Error, Result};
use crate::pipeline::PipelineFactory;
use crate::types::{BatchId, BatchSnapshot, Event};
use crate::utils::{is_playlist_url, panic_message, validate_http_url};
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore, broadcast};
use tokio::task::JoinSet;
use url::Url;

/// Error recorded for items whose worker disappeared without an outcome
const WORKER_LOST: &str = "worker exited unexpectedly";

/// Runs and tracks batch jobs
///
/// Cloning is cheap; clones share the job registry.
#[derive(Clone)]
pub struct BatchCoordinator {
    jobs: Arc<RwLock<HashMap<BatchId, Arc<BatchJob>>>>,
    factory: PipelineFactory,
    events: broadcast::Sender<Event>,
    concurrency: usize,
    max_batch_size: usize,
    archive_dir: PathBuf,
}

impl BatchCoordinator {
    /// Create a coordinator building pipelines from `factory`
    pub fn new(config: &Config, factory: PipelineFactory, events: broadcast::Sender<Event>) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            factory,
            events,
            concurrency: config.batch_concurrency(),
            max_batch_size: config.download.max_batch_size,
            archive_dir: config.archive_dir(),
        }
    }

    /// Validate `urls`, register a batch and start it in the background
    ///
    /// Blank entries are dropped. Every remaining URL must be http(s) and
    /// point at a `.m3u8` playlist; the list must hold between one and
    /// `max_batch_size` URLs. Returns as soon as the driver is spawned.
    pub async fn submit(&self, urls: Vec<String>) -> Result<BatchId> {
        let urls = self.validate(urls)?;
        let id = BatchId::new();
        let job = Arc::new(BatchJob::new(id.clone(), urls, self.events.clone()));

        self.jobs.write().await.insert(id.clone(), job.clone());
        tracing::info!(batch_id = %id, total = job.total_count(), "batch submitted");

        tokio::spawn(drive(job, self.factory.clone(), self.concurrency));

        Ok(id)
    }

    fn validate(&self, urls: Vec<String>) -> Result<Vec<Url>> {
        let mut valid = Vec::new();
        for raw in urls {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let url = validate_http_url(raw)
                .map_err(|_| Error::Validation(format!("URL must start with http:// or https://: {raw}")))?;
            if !is_playlist_url(&url) {
                return Err(Error::Validation(format!(
                    "URL must be a valid M3U8 playlist file: {raw}"
                )));
            }
            valid.push(url);
        }

        if valid.is_empty() {
            return Err(Error::Validation("No valid M3U8 URLs provided".to_string()));
        }
        if valid.len() > self.max_batch_size {
            return Err(Error::Validation(format!(
                "Maximum {} URLs allowed per batch",
                self.max_batch_size
            )));
        }
        Ok(valid)
    }

    async fn job(&self, id: &BatchId) -> Result<Arc<BatchJob>> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| BatchError::NotFound { id: id.clone() }.into())
    }

    /// Current state of batch `id`
    pub async fn snapshot(&self, id: &BatchId) -> Result<BatchSnapshot> {
        Ok(self.job(id).await?.snapshot())
    }

    /// Wait until batch `id` reaches a terminal status
    pub async fn join(&self, id: &BatchId) -> Result<BatchSnapshot> {
        let job = self.job(id).await?;
        let mut status = job.watch_status();
        // the sender lives inside the job we hold, so this cannot fail
        let _ = status.wait_for(|s| s.is_terminal()).await;
        Ok(job.snapshot())
    }

    /// Cancel every pipeline of batch `id`
    ///
    /// Queued items fail immediately; running pipelines abort. The batch
    /// still resolves to a terminal status.
    pub async fn cancel(&self, id: &BatchId) -> Result<()> {
        let job = self.job(id).await?;
        job.cancel_token().cancel();
        tracing::info!(batch_id = %id, "batch cancelled");
        Ok(())
    }

    /// Package the completed outputs of batch `id` into a ZIP archive
    ///
    /// # Errors
    ///
    /// - [`BatchError::NotFound`] for unknown or already released ids
    /// - [`BatchError::NotReady`] unless the batch is `completed` or
    ///   `completed_with_errors`
    /// - [`BatchError::NoSuccessfulItems`] when nothing completed
    ///
    /// The outputs stay on disk until packaging ends; a concurrent
    /// [`BatchCoordinator::release`] waits for it.
    pub async fn fetch_archive(&self, id: &BatchId) -> Result<ArchiveFile> {
        let job = self.job(id).await?;
        let _hold = job.hold_outputs().await;
        let snapshot = job.snapshot();
        if !snapshot.status.allows_archive() {
            return Err(BatchError::NotReady {
                id: id.clone(),
                status: snapshot.status,
            }
            .into());
        }
        if snapshot.completed_count == 0 {
            return Err(BatchError::NoSuccessfulItems { id: id.clone() }.into());
        }

        // released between lookup and hold
        let outputs = job
            .output_paths()
            .ok_or_else(|| Error::from(BatchError::NotFound { id: id.clone() }))?;

        let download_name = ArchiveBuilder::download_name(id, snapshot.completed_count);
        let dest = self
            .archive_dir
            .join(format!("{}_{}", uuid::Uuid::new_v4(), download_name));
        let path = ArchiveBuilder::build(id, outputs, dest).await?;

        Ok(ArchiveFile {
            path,
            download_name,
        })
    }

    /// Forget terminal batch `id` and release its scratch areas
    pub async fn release(&self, id: &BatchId) -> Result<()> {
        let job = {
            let mut jobs = self.jobs.write().await;
            let job = jobs
                .get(id)
                .cloned()
                .ok_or_else(|| Error::from(BatchError::NotFound { id: id.clone() }))?;
            let status = job.status();
            if !status.is_terminal() {
                return Err(BatchError::NotReady {
                    id: id.clone(),
                    status,
                }
                .into());
            }
            jobs.remove(id);
            job
        };

        job.release_outputs().await;
        tracing::info!(batch_id = %id, "batch released");
        Ok(())
    }

    /// Release terminal batches that finished more than `ttl` ago
    pub async fn evict_expired(&self, ttl: Duration) -> usize {
        let expired: Vec<Arc<BatchJob>> = {
            let mut jobs = self.jobs.write().await;
            let ids: Vec<BatchId> = jobs
                .iter()
                .filter(|(_, job)| job.expired(ttl))
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| jobs.remove(id)).collect()
        };

        for job in &expired {
            tracing::debug!(batch_id = %job.id(), "evicting expired batch");
            job.release_outputs().await;
        }
        expired.len()
    }

    /// Cancel every batch
    pub async fn shutdown(&self) {
        for job in self.jobs.read().await.values() {
            job.cancel_token().cancel();
        }
    }

    /// Number of registered batches
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Whether no batch is registered
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Background driver of one batch
async fn drive(job: Arc<BatchJob>, factory: PipelineFactory, concurrency: usize) {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut workers = JoinSet::new();

    for index in 0..job.total_count() {
        workers.spawn(run_item(
            job.clone(),
            index,
            factory.clone(),
            semaphore.clone(),
        ));
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            tracing::error!(batch_id = %job.id(), error = %e, "batch worker aborted");
        }
    }

    let lost = job.fail_unfinished(WORKER_LOST);
    if lost > 0 {
        tracing::warn!(batch_id = %job.id(), lost, "batch items finished without an outcome");
    }
}

/// Worker for item `index`: wait for a slot, run the pipeline, record the outcome
async fn run_item(
    job: Arc<BatchJob>,
    index: usize,
    factory: PipelineFactory,
    semaphore: Arc<Semaphore>,
) {
    let cancel = job.cancel_token().child_token();

    let permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        permit = semaphore.acquire_owned() => permit.ok(),
    };
    let Some(_permit) = permit else {
        job.fail_item(index, &Error::Cancelled.to_string());
        return;
    };

    let Some(url) = job.item_url(index) else {
        return;
    };
    job.start_item(index);
    tracing::info!(batch_id = %job.id(), index, url = %url, "batch item started");

    let sink = Arc::new(ItemProgress::new(job.clone(), index));
    let prefix = format!("batch_{}_{:03}", job.id().short(), index + 1);
    let pipeline = factory.create(url, sink, &prefix);

    match AssertUnwindSafe(pipeline.run(cancel)).catch_unwind().await {
        Ok(Ok(output)) => {
            if let Err(orphan) = job.complete_item(index, output) {
                orphan.release().await;
            }
        }
        Ok(Err(e)) => job.fail_item(index, &e.to_string()),
        Err(panic) => {
            let message = format!("worker panicked: {}", panic_message(panic.as_ref()));
            tracing::error!(batch_id = %job.id(), index, "{}", message);
            job.fail_item(index, &message);
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
