//! Background service starters: retention reaper and REST API server.

use super::HlsDownloader;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// What one retention sweep removed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Progress entries dropped
    pub progress: usize,
    /// Finished single tasks dropped (unclaimed outputs released)
    pub singles: usize,
    /// Terminal batches dropped (outputs released)
    pub batches: usize,
}

impl HlsDownloader {
    /// Start the retention reaper
    ///
    /// Every `retention.sweep_interval` it evicts finished tasks and
    /// terminal batches idle for longer than `retention.ttl`. With no TTL
    /// configured nothing is ever evicted and no task is started. The reaper
    /// stops on [`shutdown`](Self::shutdown).
    pub fn start_reaper(&self) -> tokio::task::JoinHandle<()> {
        let Some(ttl) = self.config.retention.ttl else {
            tracing::info!("No retention TTL configured, skipping reaper");
            return tokio::spawn(async {});
        };

        let downloader = self.clone();
        let mut interval = tokio::time::interval(self.config.retention.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = downloader.shutdown_token.cancelled() => break,
                    _ = interval.tick() => {
                        let report = downloader.sweep(ttl).await;
                        if report != SweepReport::default() {
                            tracing::debug!(?report, "Retention sweep evicted entries");
                        }
                    }
                }
            }
            tracing::info!("Retention reaper stopped");
        });

        tracing::info!(ttl_secs = ttl.as_secs(), "Retention reaper started");
        handle
    }

    /// Evict everything that finished more than `ttl` ago
    pub async fn sweep(&self, ttl: Duration) -> SweepReport {
        let progress = self.progress.evict_expired(ttl);

        let expired: Vec<_> = {
            let mut singles = self.singles.lock().await;
            let ids: Vec<_> = singles
                .iter()
                .filter(|(_, task)| task.expired(ttl))
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| singles.remove(id)).collect()
        };
        let singles = expired.len();
        for task in expired {
            if let Some(output) = task.into_output() {
                output.release().await;
            }
        }

        let batches = self.batches.evict_expired(ttl).await;

        SweepReport {
            progress,
            singles,
            batches,
        }
    }

    /// Spawn the REST API server in a background task
    ///
    /// The server listens on `api.bind_address` and runs until the task is
    /// aborted or fails to bind.
    pub fn spawn_api_server(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<()>> {
        let downloader = self.clone();
        let config = self.config.clone();

        tokio::spawn(async move { crate::api::start_api_server(downloader, config).await })
    }
}
