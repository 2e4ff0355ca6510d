//! The downloader facade split into focused submodules.
//!
//! The `HlsDownloader` struct and its methods are organized by domain:
//! - [`single`] - Single-playlist tasks (start, poll, take output, cancel)
//! - [`batches`] - Batch jobs, delegated to the [`BatchCoordinator`]
//! - [`lifecycle`] - Shutdown coordination
//! - [`services`] - Retention reaper and API server starters

mod batches;
mod lifecycle;
mod services;
mod single;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::batch::BatchCoordinator;
use crate::config::Config;
use crate::discovery::LinkExtractor;
use crate::error::{Error, Result};
use crate::merge::{ConcatMerger, FfmpegMerger, Merger};
use crate::pipeline::PipelineFactory;
use crate::progress::ProgressTracker;
use crate::types::{Capabilities, Event, TaskId};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;

pub use services::SweepReport;
pub(crate) use single::SingleTask;

/// Event channel capacity; slower subscribers see `RecvError::Lagged`
const EVENT_CAPACITY: usize = 1000;

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct HlsDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Builds every pipeline, single or batched
    pub(crate) factory: PipelineFactory,
    /// Poll store for single tasks
    pub(crate) progress: ProgressTracker,
    /// Batch jobs
    pub(crate) batches: BatchCoordinator,
    /// Playlist discovery on web pages
    pub(crate) extractor: LinkExtractor,
    /// Running and finished single tasks
    pub(crate) singles: Arc<Mutex<HashMap<TaskId, SingleTask>>>,
    /// Cleared during shutdown
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Cancelled during shutdown; stops background services
    pub(crate) shutdown_token: CancellationToken,
}

impl HlsDownloader {
    /// Create a new HlsDownloader instance
    ///
    /// Creates the temp and archive directories, builds the shared HTTP
    /// client and selects a merger: the configured ffmpeg binary, else
    /// ffmpeg from `PATH` (when `tools.search_path` is set), else the
    /// in-process [`ConcatMerger`].
    pub async fn new(config: Config) -> Result<Self> {
        let merger: Arc<dyn Merger> = if let Some(ref ffmpeg) = config.tools.ffmpeg_path {
            Arc::new(FfmpegMerger::new(ffmpeg.clone(), config.tools.merge_timeout))
        } else if config.tools.search_path {
            FfmpegMerger::from_path(config.tools.merge_timeout)
                .map(|m| Arc::new(m) as Arc<dyn Merger>)
                .unwrap_or_else(|| Arc::new(ConcatMerger::new(config.tools.merge_timeout)))
        } else {
            Arc::new(ConcatMerger::new(config.tools.merge_timeout))
        };

        Self::with_merger(config, merger).await
    }

    /// Create an instance using `merger` instead of discovering one
    pub async fn with_merger(config: Config, merger: Arc<dyn Merger>) -> Result<Self> {
        config.validate()?;

        create_dir(&config.download.temp_dir, "temp").await?;
        create_dir(&config.archive_dir(), "archive").await?;

        let client = reqwest::Client::builder()
            .user_agent(config.download.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("Failed to build HTTP client: {}", e)))?;

        tracing::info!(
            merger = merger.name(),
            remuxes = merger.remuxes(),
            "Merger initialized"
        );

        let (event_tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        let factory = PipelineFactory::new(&config, client.clone(), merger);
        let batches = BatchCoordinator::new(&config, factory.clone(), event_tx.clone());
        let extractor = LinkExtractor::new(client, config.discovery.clone());

        Ok(Self {
            config: Arc::new(config),
            event_tx,
            factory,
            progress: ProgressTracker::new(),
            batches,
            extractor,
            singles: Arc::new(Mutex::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
            shutdown_token: CancellationToken::new(),
        })
    }

    /// Subscribe to download events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// A subscriber that falls behind by more than 1000 events receives
    /// `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// The merge implementation in use
    pub fn capabilities(&self) -> Capabilities {
        let merger = self.factory.merger();
        Capabilities {
            merger: merger.name().to_string(),
            remuxes: merger.remuxes(),
        }
    }

    /// The link extractor used for page discovery
    pub fn extractor(&self) -> &LinkExtractor {
        &self.extractor
    }

    pub(crate) fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }

    pub(crate) fn ensure_accepting(&self) -> Result<()> {
        if self
            .accepting_new
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            Ok(())
        } else {
            Err(Error::ShuttingDown)
        }
    }
}

async fn create_dir(path: &Path, what: &str) -> Result<()> {
    tokio::fs::create_dir_all(path).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!(
                "Failed to create {} directory '{}': {}",
                what,
                path.display(),
                e
            ),
        ))
    })
}
