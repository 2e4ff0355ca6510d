//! Single download handlers and page extraction.

use super::{
    ExtractRequest, ExtractResponse, StartDownloadRequest, StartDownloadResponse,
    stream_attachment,
};
use crate::api::AppState;
use crate::types::TaskId;
use crate::utils::{media_content_type, validate_http_url};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// POST /downloads - Start a single download
#[utoipa::path(
    post,
    path = "/downloads",
    tag = "downloads",
    request_body = StartDownloadRequest,
    responses(
        (status = 202, description = "Download started", body = StartDownloadResponse),
        (status = 400, description = "Invalid URL for the chosen mode"),
        (status = 404, description = "No playlist found on the page"),
        (status = 502, description = "Page could not be fetched"),
        (status = 503, description = "Shutting down")
    )
)]
pub async fn start_download(
    State(state): State<AppState>,
    Json(request): Json<StartDownloadRequest>,
) -> Response {
    let playlist = match state
        .downloader
        .resolve_playlist(request.url.trim(), request.mode)
        .await
    {
        Ok(url) => url,
        Err(e) => return e.into_response(),
    };

    match state.downloader.start_single(playlist.as_str()).await {
        Ok(task_id) => (
            StatusCode::ACCEPTED,
            Json(StartDownloadResponse { task_id }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /downloads/:task_id/progress - Poll a single download
#[utoipa::path(
    get,
    path = "/downloads/{task_id}/progress",
    tag = "downloads",
    params(
        ("task_id" = String, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Latest progress; unknown ids report `Unknown task`", body = crate::types::Progress)
    )
)]
pub async fn get_progress(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> impl IntoResponse {
    let progress = state.downloader.poll_single(&TaskId::from(task_id));
    (StatusCode::OK, Json(progress))
}

/// GET /downloads/:task_id/file - Stream the merged file
///
/// The scratch area is released once the body has been sent.
#[utoipa::path(
    get,
    path = "/downloads/{task_id}/file",
    tag = "downloads",
    params(
        ("task_id" = String, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Merged media file", content_type = "video/mp4"),
        (status = 404, description = "Unknown or already claimed task"),
        (status = 409, description = "Task still running"),
        (status = 422, description = "Task failed")
    )
)]
pub async fn download_file(State(state): State<AppState>, Path(task_id): Path<String>) -> Response {
    let id = TaskId::from(task_id);
    let output = match state.downloader.take_output(&id).await {
        Ok(output) => output,
        Err(e) => return e.into_response(),
    };

    let opened = async {
        let file = tokio::fs::File::open(&output.path).await?;
        let len = file.metadata().await?.len();
        Ok::<_, std::io::Error>((file, len))
    }
    .await;
    let (file, len) = match opened {
        Ok(opened) => opened,
        Err(e) => {
            output.release().await;
            return crate::Error::Io(e).into_response();
        }
    };

    let content_type = media_content_type(&output.path);
    let extension = output
        .path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4")
        .to_string();
    let download_name = format!("video_{}.{}", id.short(), extension);

    tracing::info!(task_id = %id, bytes = len, "streaming merged file");
    stream_attachment(file, len, content_type, &download_name, async move {
        output.release().await;
        tracing::debug!(task_id = %id, "released scratch after streaming");
    })
}

/// DELETE /downloads/:task_id - Cancel a single download
#[utoipa::path(
    delete,
    path = "/downloads/{task_id}",
    tag = "downloads",
    params(
        ("task_id" = String, Path, description = "Task ID")
    ),
    responses(
        (status = 204, description = "Cancellation requested"),
        (status = 404, description = "Unknown task")
    )
)]
pub async fn cancel_download(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Response {
    match state.downloader.cancel_single(&TaskId::from(task_id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /extract - Find playlist links on a web page
#[utoipa::path(
    post,
    path = "/extract",
    tag = "downloads",
    request_body = ExtractRequest,
    responses(
        (status = 200, description = "Discovered links (possibly none)", body = ExtractResponse),
        (status = 400, description = "Invalid URL"),
        (status = 502, description = "Page could not be fetched")
    )
)]
pub async fn extract_links(
    State(state): State<AppState>,
    Json(request): Json<ExtractRequest>,
) -> Response {
    let url = match validate_http_url(request.url.trim()) {
        Ok(url) => url,
        Err(e) => return e.into_response(),
    };

    tracing::info!(url = %url, "extracting video links");
    let extractor = state.downloader.extractor();
    let video_links = match extractor.extract(&url).await {
        Ok(links) => links,
        Err(e) => return e.into_response(),
    };
    let webpage_info = extractor.webpage_info(&url).await;

    (
        StatusCode::OK,
        Json(ExtractResponse {
            webpage_info,
            found_count: video_links.len(),
            video_links,
        }),
    )
        .into_response()
}
