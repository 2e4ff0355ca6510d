//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`downloads`] - Single downloads and page extraction
//! - [`batches`] - Batch jobs and archives
//! - [`system`] - Health, capabilities, events, OpenAPI

use crate::discovery::WebpageInfo;
use crate::types::{BatchId, DownloadMode, TaskId};
use axum::body::{Body, Bytes};
use axum::http::{HeaderValue, header};
use axum::response::Response;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use tokio_util::io::ReaderStream;

mod batches;
mod downloads;
mod system;

// Re-export all handlers so `routes::function_name` continues to work
pub use batches::*;
pub use downloads::*;
pub use system::*;

// ============================================================================
// Request/Response Types (shared across handlers)
// ============================================================================

/// Body of POST /downloads
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct StartDownloadRequest {
    /// Playlist URL, or a web page URL in `extract`/`auto` mode
    pub url: String,
    /// How `url` is interpreted (default: `direct`)
    #[serde(default)]
    pub mode: DownloadMode,
}

/// Response of POST /downloads
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct StartDownloadResponse {
    /// Id to poll progress with
    pub task_id: TaskId,
}

/// Body of POST /extract
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct ExtractRequest {
    /// Web page to scan
    pub url: String,
}

/// Response of POST /extract
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct ExtractResponse {
    /// Title and reachability of the page
    pub webpage_info: WebpageInfo,
    /// Discovered playlist URLs, best first
    pub video_links: Vec<String>,
    /// Number of links found
    pub found_count: usize,
}

/// Body of POST /batches
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct StartBatchRequest {
    /// Playlist URLs (blank entries are ignored)
    pub urls: Vec<String>,
}

/// Response of POST /batches
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct StartBatchResponse {
    /// Id to poll the batch with
    pub batch_id: BatchId,
    /// Always `started`
    pub status: String,
    /// Number of accepted URLs
    pub total_count: usize,
}

// ============================================================================
// File streaming
// ============================================================================

type Cleanup = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Runs its cleanup once: after the last chunk, or on drop if the client
/// went away mid-stream
struct CleanupGuard(Option<Cleanup>);

impl CleanupGuard {
    async fn run(mut self) {
        if let Some(cleanup) = self.0.take() {
            cleanup.await;
        }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if let Some(cleanup) = self.0.take()
            && let Ok(handle) = tokio::runtime::Handle::try_current()
        {
            handle.spawn(cleanup);
        }
    }
}

/// Attachment response streaming `file`, then running `cleanup`
pub(crate) fn stream_attachment(
    file: tokio::fs::File,
    len: u64,
    content_type: &'static str,
    download_name: &str,
    cleanup: impl Future<Output = ()> + Send + 'static,
) -> Response {
    let guard = CleanupGuard(Some(Box::pin(cleanup)));
    let tail = futures::stream::once(guard.run())
        .filter_map(|()| async { None::<std::io::Result<Bytes>> });
    let body = Body::from_stream(ReaderStream::new(file).chain(tail));

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    if let Ok(disposition) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", download_name))
    {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }
    response
}
