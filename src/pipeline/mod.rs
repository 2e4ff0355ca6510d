//! Single-playlist pipeline: fetch, plan, download, merge
//!
//! ```text
//! Fetching (0-10%) -> Planning (10-20%) -> Downloading (20-75%) -> Merging (75-100%) -> Done
//!        \________________\____________________\______________________\_______-> Failed
//! ```
//!
//! A [`Pipeline`] owns a fresh scratch directory for its whole run. On
//! success the directory is handed to the caller inside [`PipelineOutput`];
//! on failure it is released before the error is returned.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::merge::Merger;
use crate::playlist::{PlaylistFetcher, plan_segments};
use crate::progress::ProgressSink;
use crate::segments::{SegmentDownloader, SegmentReport};
use crate::utils::{ScratchDir, panic_message};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Message reported when a pipeline finishes successfully
pub const COMPLETE_MESSAGE: &str = "Download complete!";

/// Pipeline stage, each mapped to a fixed slice of overall percent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Retrieving the playlist text
    Fetching,
    /// Turning the text into segment URLs
    Planning,
    /// Fetching segments
    Downloading,
    /// Concatenating segments
    Merging,
    /// Output produced
    Done,
    /// Aborted with an error
    Failed,
}

impl Stage {
    /// Percent at which the stage starts
    pub fn start_percent(&self) -> u8 {
        match self {
            Stage::Fetching => 0,
            Stage::Planning => 10,
            Stage::Downloading => 20,
            Stage::Merging => 75,
            Stage::Done => 100,
            Stage::Failed => 0,
        }
    }

    /// Percent for `completed` of `total` segments, spread over 20..=75
    pub fn downloading_percent(completed: usize, total: usize) -> u8 {
        let start = Stage::Downloading.start_percent() as usize;
        let span = (Stage::Merging.start_percent() - Stage::Downloading.start_percent()) as usize;
        if total == 0 {
            return start as u8;
        }
        (start + completed.min(total) * span / total) as u8
    }
}

/// Result of a successful pipeline run
///
/// The merged file lives inside `scratch`; call [`PipelineOutput::release`]
/// once it has been consumed.
#[derive(Debug)]
pub struct PipelineOutput {
    /// Path of the merged media file
    pub path: PathBuf,
    /// Scratch area owning the file
    pub scratch: ScratchDir,
    /// Number of segments in the playlist
    pub segments_total: usize,
    /// Number of segments skipped after failing
    pub segments_failed: usize,
}

impl PipelineOutput {
    /// Remove the scratch area, including the merged file
    pub async fn release(self) {
        self.scratch.release().await;
    }
}

/// Shared ingredients for building pipelines
///
/// Cloning is cheap. The batch coordinator and the single-download path both
/// build their pipelines through the same factory.
#[derive(Clone)]
pub struct PipelineFactory {
    fetcher: PlaylistFetcher,
    segments: SegmentDownloader,
    merger: Arc<dyn Merger>,
    temp_dir: PathBuf,
    timeout: Duration,
}

impl PipelineFactory {
    /// Build a factory from configuration, a shared HTTP client and a merger
    pub fn new(config: &Config, client: reqwest::Client, merger: Arc<dyn Merger>) -> Self {
        Self {
            fetcher: PlaylistFetcher::new(client.clone(), config.download.playlist_timeout),
            segments: SegmentDownloader::new(
                client,
                config.download.segment_timeout,
                config.segment_concurrency(),
            ),
            merger,
            temp_dir: config.download.temp_dir.clone(),
            timeout: config.download.pipeline_timeout,
        }
    }

    /// The merger every pipeline uses
    pub fn merger(&self) -> &Arc<dyn Merger> {
        &self.merger
    }

    /// Pipeline for `url` reporting to `sink`, with scratch dirs named `<prefix>_<uuid>`
    pub fn create(&self, url: Url, sink: Arc<dyn ProgressSink>, prefix: &str) -> Pipeline {
        Pipeline {
            factory: self.clone(),
            url,
            sink,
            prefix: prefix.to_string(),
            last_percent: AtomicU8::new(0),
        }
    }
}

/// One playlist download, run to completion by [`Pipeline::run`]
pub struct Pipeline {
    factory: PipelineFactory,
    url: Url,
    sink: Arc<dyn ProgressSink>,
    prefix: String,
    last_percent: AtomicU8,
}

impl Pipeline {
    /// Source playlist URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Run every stage
    ///
    /// The sink ends at 100% with [`COMPLETE_MESSAGE`] on success, or receives
    /// the error text as its terminal message on failure. A panic inside a
    /// stage is reported as a failure and the scratch area is released.
    pub async fn run(self, cancel: CancellationToken) -> Result<PipelineOutput> {
        let scratch = match ScratchDir::create(&self.factory.temp_dir, &self.prefix).await {
            Ok(scratch) => scratch,
            Err(e) => {
                self.sink.fail(&e.to_string());
                return Err(e);
            }
        };

        // a panicking stage still reaches the release below
        let budget = self.factory.timeout;
        let stages = AssertUnwindSafe(self.stages(scratch.path(), &cancel)).catch_unwind();
        let result = match tokio::time::timeout(budget, stages).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(Error::Other(format!(
                "worker panicked: {}",
                panic_message(panic.as_ref())
            ))),
            Err(_) => Err(Error::PipelineTimeout {
                seconds: budget.as_secs(),
            }),
        };

        match result {
            Ok((path, report)) => {
                if report.failed_count() > 0 {
                    tracing::warn!(
                        url = %self.url,
                        segments_total = report.total(),
                        segments_failed = report.failed_count(),
                        "merged output is missing segments"
                    );
                }
                self.sink.finish(COMPLETE_MESSAGE);
                Ok(PipelineOutput {
                    path,
                    scratch,
                    segments_total: report.total(),
                    segments_failed: report.failed_count(),
                })
            }
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "pipeline failed");
                self.sink.fail(&e.to_string());
                scratch.release().await;
                Err(e)
            }
        }
    }

    async fn stages(
        &self,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<(PathBuf, SegmentReport)> {
        self.report(Stage::Fetching.start_percent(), "Fetching M3U8 playlist...");
        let text = self.factory.fetcher.fetch(&self.url, cancel).await?;
        if text.trim().is_empty() {
            return Err(Error::EmptyPlaylist {
                url: self.url.to_string(),
            });
        }

        self.report(Stage::Planning.start_percent(), "Parsing video segments...");
        let urls = plan_segments(&text, self.url.as_str())?;
        if urls.is_empty() {
            return Err(Error::EmptySegmentList {
                url: self.url.to_string(),
            });
        }
        tracing::info!(url = %self.url, segments = urls.len(), "playlist planned");

        self.report(
            Stage::Downloading.start_percent(),
            &format!("Downloading segment 0/{}...", urls.len()),
        );
        let on_progress = |completed: usize, total: usize| {
            self.report(
                Stage::downloading_percent(completed, total),
                &format!("Downloading segment {completed}/{total}..."),
            );
        };
        let report = self
            .factory
            .segments
            .download(&urls, dir, &on_progress, cancel)
            .await?;

        let merger = &self.factory.merger;
        self.report(
            Stage::Merging.start_percent(),
            &format!("Merging segments with {}...", merger.name()),
        );
        let path = merger.merge(&report.fetched_paths(), dir, cancel).await?;

        Ok((path, report))
    }

    /// Forward to the sink, never letting percent go backwards
    fn report(&self, percent: u8, message: &str) {
        let previous = self.last_percent.fetch_max(percent, Ordering::SeqCst);
        self.sink.report(previous.max(percent), message);
    }
}
