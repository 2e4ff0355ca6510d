//! Single-playlist tasks: start, poll, take the output, cancel.

use super::HlsDownloader;
use crate::error::{Error, Result};
use crate::pipeline::PipelineOutput;
use crate::progress::TaskProgress;
use crate::types::{DownloadMode, Event, Progress, TaskId};
use crate::utils::{is_playlist_url, panic_message, validate_http_url};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Scratch directory prefix for single downloads
const SINGLE_PREFIX: &str = "m3u8_download";

/// Where a single task's result stands
#[derive(Debug)]
pub(crate) enum Outcome {
    Running,
    Ready(PipelineOutput),
    Failed(String),
}

/// Registry entry for one single download
#[derive(Debug)]
pub(crate) struct SingleTask {
    cancel: CancellationToken,
    outcome: Outcome,
    finished_at: Option<Instant>,
    done: watch::Sender<bool>,
}

impl SingleTask {
    fn running(cancel: CancellationToken) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            cancel,
            outcome: Outcome::Running,
            finished_at: None,
            done,
        }
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn expired(&self, ttl: Duration) -> bool {
        self.finished_at.is_some_and(|at| at.elapsed() > ttl)
    }

    /// The output still held by this entry, for release
    pub(crate) fn into_output(self) -> Option<PipelineOutput> {
        match self.outcome {
            Outcome::Ready(output) => Some(output),
            _ => None,
        }
    }
}

impl HlsDownloader {
    /// Start downloading the playlist at `url` in the background
    ///
    /// Returns immediately; poll with [`poll_single`](Self::poll_single).
    pub async fn start_single(&self, url: &str) -> Result<TaskId> {
        self.ensure_accepting()?;
        let url = validate_http_url(url)?;

        let id = TaskId::new();
        let cancel = CancellationToken::new();
        self.progress.register(&id);
        self.singles
            .lock()
            .await
            .insert(id.clone(), SingleTask::running(cancel.clone()));

        let sink = Arc::new(
            TaskProgress::new(self.progress.clone(), id.clone()).with_events(self.event_tx.clone()),
        );
        let pipeline = self.factory.create(url.clone(), sink, SINGLE_PREFIX);

        tracing::info!(task_id = %id, url = %url, "single download started");

        let downloader = self.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            let result = match AssertUnwindSafe(pipeline.run(cancel)).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => {
                    let message = format!("worker panicked: {}", panic_message(panic.as_ref()));
                    tracing::error!(task_id = %task_id, "{}", message);
                    downloader.progress.fail(&task_id, &message);
                    Err(Error::Other(message))
                }
            };
            downloader.record_single(&task_id, result).await;
        });

        Ok(id)
    }

    async fn record_single(&self, id: &TaskId, result: Result<PipelineOutput>) {
        let event = match &result {
            Ok(output) => Event::TaskComplete {
                task_id: id.clone(),
                segments_total: output.segments_total,
                segments_failed: output.segments_failed,
            },
            Err(e) => Event::TaskFailed {
                task_id: id.clone(),
                error: e.to_string(),
            },
        };

        let orphan = {
            let mut singles = self.singles.lock().await;
            match singles.get_mut(id) {
                Some(task) => {
                    task.outcome = match result {
                        Ok(output) => Outcome::Ready(output),
                        Err(e) => Outcome::Failed(e.to_string()),
                    };
                    task.finished_at = Some(Instant::now());
                    task.done.send_replace(true);
                    None
                }
                None => result.ok(),
            }
        };

        // entry vanished while running (evicted); nobody can claim the file
        if let Some(output) = orphan {
            output.release().await;
        }

        self.emit_event(event);
    }

    /// Latest progress of task `id`
    ///
    /// Unknown ids yield `{0, "Unknown task"}`.
    pub fn poll_single(&self, id: &TaskId) -> Progress {
        self.progress.get(id)
    }

    /// Wait until task `id` has finished, successfully or not
    pub async fn wait_single(&self, id: &TaskId) -> Result<()> {
        let mut done = {
            let singles = self.singles.lock().await;
            singles
                .get(id)
                .ok_or_else(|| Error::TaskNotFound(id.clone()))?
                .done
                .subscribe()
        };
        // the sender lives in the registry entry; a dropped entry also ends the wait
        let _ = done.wait_for(|finished| *finished).await;
        Ok(())
    }

    /// Claim the merged output of task `id`
    ///
    /// The task leaves the registry; the caller streams the file and then
    /// calls [`PipelineOutput::release`]. The progress entry stays pollable
    /// until it expires.
    ///
    /// # Errors
    ///
    /// - [`Error::TaskNotFound`] for unknown or already claimed tasks
    /// - [`Error::TaskNotReady`] while the pipeline is running
    /// - [`Error::TaskFailed`] with the recorded error message
    pub async fn take_output(&self, id: &TaskId) -> Result<PipelineOutput> {
        let mut singles = self.singles.lock().await;
        match singles.get(id).map(|task| &task.outcome) {
            None => return Err(Error::TaskNotFound(id.clone())),
            Some(Outcome::Running) => return Err(Error::TaskNotReady(id.clone())),
            Some(Outcome::Failed(message)) => {
                return Err(Error::TaskFailed {
                    id: id.clone(),
                    message: message.clone(),
                });
            }
            Some(Outcome::Ready(_)) => {}
        }

        singles
            .remove(id)
            .and_then(SingleTask::into_output)
            .ok_or_else(|| Error::TaskNotFound(id.clone()))
    }

    /// Cancel task `id`
    ///
    /// A running pipeline stops at its next await point and the task ends
    /// failed with "download cancelled". Finished tasks are unaffected.
    pub async fn cancel_single(&self, id: &TaskId) -> Result<()> {
        let singles = self.singles.lock().await;
        let task = singles
            .get(id)
            .ok_or_else(|| Error::TaskNotFound(id.clone()))?;
        task.cancel.cancel();
        tracing::info!(task_id = %id, "single download cancelled");
        Ok(())
    }

    /// Turn a request URL into the playlist URL to download
    ///
    /// - `Direct`: the URL must point at a `.m3u8` file
    /// - `Extract`, `Auto`: the URL is scanned as a web page unless it
    ///   already points at a playlist
    ///
    /// The first discovered candidate is used.
    pub async fn resolve_playlist(&self, url: &str, mode: DownloadMode) -> Result<Url> {
        let url = validate_http_url(url)?;
        let scan = match mode {
            DownloadMode::Direct => {
                if !is_playlist_url(&url) {
                    return Err(Error::Validation(
                        "URL must be a valid M3U8 playlist file".to_string(),
                    ));
                }
                false
            }
            DownloadMode::Extract | DownloadMode::Auto => !is_playlist_url(&url),
        };
        if !scan {
            return Ok(url);
        }

        tracing::info!(url = %url, "extracting playlist from webpage");
        let links = self.extractor.extract(&url).await?;
        let first = links
            .into_iter()
            .find_map(|link| Url::parse(&link).ok())
            .ok_or_else(|| Error::NoPlaylistFound {
                url: url.to_string(),
            })?;
        tracing::info!(url = %url, playlist = %first, "using extracted playlist");
        Ok(first)
    }
}
