//! Batch handlers: submit, poll, cancel, release and archive download.

use super::{StartBatchRequest, StartBatchResponse, stream_attachment};
use crate::api::AppState;
use crate::types::BatchId;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// POST /batches - Start a batch of playlist downloads
#[utoipa::path(
    post,
    path = "/batches",
    tag = "batches",
    request_body = StartBatchRequest,
    responses(
        (status = 202, description = "Batch started", body = StartBatchResponse),
        (status = 400, description = "Invalid, missing or too many URLs"),
        (status = 503, description = "Shutting down")
    )
)]
pub async fn start_batch(
    State(state): State<AppState>,
    Json(request): Json<StartBatchRequest>,
) -> Response {
    let batch_id = match state.downloader.start_batch(request.urls).await {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    let total_count = match state.downloader.poll_batch(&batch_id).await {
        Ok(snapshot) => snapshot.total_count,
        Err(e) => return e.into_response(),
    };

    (
        StatusCode::ACCEPTED,
        Json(StartBatchResponse {
            batch_id,
            status: "started".to_string(),
            total_count,
        }),
    )
        .into_response()
}

/// GET /batches/:batch_id - Poll a batch
#[utoipa::path(
    get,
    path = "/batches/{batch_id}",
    tag = "batches",
    params(
        ("batch_id" = String, Path, description = "Batch ID")
    ),
    responses(
        (status = 200, description = "Batch state", body = crate::types::BatchSnapshot),
        (status = 404, description = "Batch not found")
    )
)]
pub async fn get_batch(State(state): State<AppState>, Path(batch_id): Path<String>) -> Response {
    match state.downloader.poll_batch(&BatchId::from(batch_id)).await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /batches/:batch_id/archive - Stream the batch ZIP
///
/// The archive is built on request and deleted after it has been sent.
#[utoipa::path(
    get,
    path = "/batches/{batch_id}/archive",
    tag = "batches",
    params(
        ("batch_id" = String, Path, description = "Batch ID")
    ),
    responses(
        (status = 200, description = "ZIP archive of completed videos", content_type = "application/zip"),
        (status = 404, description = "Batch not found"),
        (status = 409, description = "Batch still processing, failed, or without completed items")
    )
)]
pub async fn download_archive(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> Response {
    let id = BatchId::from(batch_id);
    let archive = match state.downloader.fetch_archive(&id).await {
        Ok(archive) => archive,
        Err(e) => return e.into_response(),
    };

    let opened = async {
        let file = tokio::fs::File::open(&archive.path).await?;
        let len = file.metadata().await?.len();
        Ok::<_, std::io::Error>((file, len))
    }
    .await;
    let path = archive.path.clone();
    let (file, len) = match opened {
        Ok(opened) => opened,
        Err(e) => {
            remove_archive(&path).await;
            return crate::Error::Io(e).into_response();
        }
    };

    tracing::info!(batch_id = %id, bytes = len, "streaming batch archive");
    stream_attachment(
        file,
        len,
        "application/zip",
        &archive.download_name,
        async move { remove_archive(&path).await },
    )
}

async fn remove_archive(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(archive = %path.display(), error = %e, "failed to remove archive");
    }
}

/// POST /batches/:batch_id/cancel - Cancel a batch
#[utoipa::path(
    post,
    path = "/batches/{batch_id}/cancel",
    tag = "batches",
    params(
        ("batch_id" = String, Path, description = "Batch ID")
    ),
    responses(
        (status = 202, description = "Cancellation requested"),
        (status = 404, description = "Batch not found")
    )
)]
pub async fn cancel_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> Response {
    match state.downloader.cancel_batch(&BatchId::from(batch_id)).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({"status": "cancelling"})),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// DELETE /batches/:batch_id - Release a finished batch
#[utoipa::path(
    delete,
    path = "/batches/{batch_id}",
    tag = "batches",
    params(
        ("batch_id" = String, Path, description = "Batch ID")
    ),
    responses(
        (status = 204, description = "Batch released"),
        (status = 404, description = "Batch not found"),
        (status = 409, description = "Batch still processing")
    )
)]
pub async fn release_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> Response {
    match state.downloader.release_batch(&BatchId::from(batch_id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}
