//! Parallel segment download with per-segment failure tolerance
//!
//! Each segment is written to `segment_{index:06}.ts` inside the pipeline's
//! scratch directory, so lexical order of the files equals playlist order no
//! matter in which order the requests complete.

use crate::error::{Error, Result};
use crate::playlist::request_error;
use crate::types::{Segment, SegmentStatus};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use url::Url;

/// File name used for the segment at `index`
pub fn segment_file_name(index: usize) -> String {
    format!("segment_{index:06}.ts")
}

/// Outcome of a segment download run
#[derive(Debug, Clone)]
pub struct SegmentReport {
    /// Every planned segment, in playlist order
    pub segments: Vec<Segment>,
}

impl SegmentReport {
    /// Local paths of fetched segments, in playlist order
    pub fn fetched_paths(&self) -> Vec<PathBuf> {
        self.segments
            .iter()
            .filter(|s| s.status == SegmentStatus::Fetched)
            .filter_map(|s| s.path.clone())
            .collect()
    }

    /// Number of planned segments
    pub fn total(&self) -> usize {
        self.segments.len()
    }

    /// Number of segments that were skipped after failing
    pub fn failed_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| s.status == SegmentStatus::Failed)
            .count()
    }
}

/// Downloads segments with bounded parallelism
#[derive(Clone, Debug)]
pub struct SegmentDownloader {
    client: reqwest::Client,
    timeout: Duration,
    concurrency: usize,
}

impl SegmentDownloader {
    /// Create a downloader issuing at most `concurrency` requests at once
    pub fn new(client: reqwest::Client, timeout: Duration, concurrency: usize) -> Self {
        Self {
            client,
            timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch every URL into `dir`
    ///
    /// A failing segment is logged and marked failed; it never aborts the
    /// run by itself. `on_progress(completed, total)` is called after each
    /// segment finishes, successfully or not.
    ///
    /// # Errors
    ///
    /// - [`Error::AllSegmentsFailed`] if not a single segment could be fetched
    /// - [`Error::Cancelled`] if `cancel` fires before every segment finished
    pub async fn download(
        &self,
        urls: &[Url],
        dir: &Path,
        on_progress: &(dyn Fn(usize, usize) + Send + Sync),
        cancel: &CancellationToken,
    ) -> Result<SegmentReport> {
        let total = urls.len();
        let completed = AtomicUsize::new(0);

        let mut segments: Vec<Segment> = futures::stream::iter(urls.iter().cloned().enumerate())
            .map(|(index, url)| {
                let path = dir.join(segment_file_name(index));
                async move {
                    let mut segment = Segment::pending(index, url);
                    match self.fetch_one(&segment.url, &path).await {
                        Ok(()) => {
                            segment.path = Some(path);
                            segment.status = SegmentStatus::Fetched;
                        }
                        Err(e) => {
                            tracing::warn!(
                                index,
                                url = %segment.url,
                                error = %e,
                                "segment download failed, skipping"
                            );
                            segment.status = SegmentStatus::Failed;
                        }
                    }
                    segment
                }
            })
            .buffer_unordered(self.concurrency)
            .inspect(|_| {
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                on_progress(done, total);
            })
            .take_until(cancel.cancelled())
            .collect()
            .await;

        if segments.len() < total {
            return Err(Error::Cancelled);
        }

        segments.sort_by_key(|s| s.index);
        let report = SegmentReport { segments };

        if total > 0 && report.failed_count() == total {
            return Err(Error::AllSegmentsFailed { total });
        }

        tracing::info!(
            total,
            failed = report.failed_count(),
            "segment download finished"
        );
        Ok(report)
    }

    async fn fetch_one(&self, url: &Url, path: &Path) -> Result<()> {
        let result = self.write_segment(url, path).await;
        if result.is_err() {
            // drop partially written data
            let _ = tokio::fs::remove_file(path).await;
        }
        result
    }

    async fn write_segment(&self, url: &Url, path: &Path) -> Result<()> {
        let mut response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| request_error("segment", url, self.timeout, &e))?;

        if !response.status().is_success() {
            return Err(Error::network(format!(
                "HTTP error fetching segment: {} {}",
                response.status(),
                url
            )));
        }

        let mut file = tokio::fs::File::create(path).await?;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| request_error("segment", url, self.timeout, &e))?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }
}
