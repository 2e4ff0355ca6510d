//! Shutdown coordination.

use super::HlsDownloader;
use crate::error::Result;

impl HlsDownloader {
    /// Shut the downloader down
    ///
    /// This method performs a shutdown sequence:
    /// 1. Stops accepting new singles and batches
    /// 2. Cancels every running single task and batch
    /// 3. Stops background services (retention reaper)
    ///
    /// Cancelled pipelines release their own scratch areas. Outputs that
    /// were already produced stay claimable until released.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating shutdown");

        self.accepting_new
            .store(false, std::sync::atomic::Ordering::SeqCst);
        tracing::info!("Stopped accepting new downloads");

        {
            let singles = self.singles.lock().await;
            for (id, task) in singles.iter() {
                tracing::debug!(task_id = %id, "Cancelling single download");
                task.cancel_token().cancel();
            }
        }
        self.batches.shutdown().await;
        tracing::info!("Signaled cancellation to all downloads");

        self.shutdown_token.cancel();

        tracing::info!("Shutdown complete");
        Ok(())
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }
}
