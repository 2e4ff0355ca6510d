//! Batch jobs, delegated to the batch coordinator.

use super::HlsDownloader;
use crate::batch::ArchiveFile;
use crate::error::Result;
use crate::types::{BatchId, BatchSnapshot};

impl HlsDownloader {
    /// Validate `urls` and start downloading them as one batch
    ///
    /// See [`BatchCoordinator::submit`](crate::batch::BatchCoordinator::submit)
    /// for the validation rules.
    pub async fn start_batch(&self, urls: Vec<String>) -> Result<BatchId> {
        self.ensure_accepting()?;
        self.batches.submit(urls).await
    }

    /// Current state of batch `id`
    pub async fn poll_batch(&self, id: &BatchId) -> Result<BatchSnapshot> {
        self.batches.snapshot(id).await
    }

    /// Wait until batch `id` is terminal and return its final state
    pub async fn wait_batch(&self, id: &BatchId) -> Result<BatchSnapshot> {
        self.batches.join(id).await
    }

    /// Cancel every pipeline of batch `id`
    pub async fn cancel_batch(&self, id: &BatchId) -> Result<()> {
        self.batches.cancel(id).await
    }

    /// Package the completed outputs of batch `id` into a ZIP archive
    ///
    /// The caller owns the returned file and deletes it after use.
    pub async fn fetch_archive(&self, id: &BatchId) -> Result<ArchiveFile> {
        self.batches.fetch_archive(id).await
    }

    /// Forget terminal batch `id` and free its scratch areas
    pub async fn release_batch(&self, id: &BatchId) -> Result<()> {
        self.batches.release(id).await
    }
}
