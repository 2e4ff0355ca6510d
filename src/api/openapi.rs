//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the hls-dl REST API
//! using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the hls-dl REST API
///
/// The spec can be accessed via:
/// - `/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "hls-dl REST API",
        version = "0.1.0",
        description = "REST API for downloading HLS playlists, batching downloads and packaging the results",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:5000", description = "Local development server")
    ),
    paths(
        // Single downloads
        crate::api::routes::start_download,
        crate::api::routes::get_progress,
        crate::api::routes::download_file,
        crate::api::routes::cancel_download,
        crate::api::routes::extract_links,

        // Batches
        crate::api::routes::start_batch,
        crate::api::routes::get_batch,
        crate::api::routes::download_archive,
        crate::api::routes::cancel_batch,
        crate::api::routes::release_batch,

        // System
        crate::api::routes::get_capabilities,
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::TaskId,
        crate::types::BatchId,
        crate::types::Progress,
        crate::types::DownloadMode,
        crate::types::ItemStatus,
        crate::types::BatchStatus,
        crate::types::ItemSnapshot,
        crate::types::BatchSnapshot,
        crate::types::Event,
        crate::types::Capabilities,
        crate::discovery::WebpageInfo,

        // Config types from config.rs
        crate::config::Config,
        crate::config::DownloadConfig,
        crate::config::ToolsConfig,
        crate::config::RetentionConfig,
        crate::config::DiscoveryConfig,
        crate::config::ApiConfig,

        // API request/response types from routes
        crate::api::routes::StartDownloadRequest,
        crate::api::routes::StartDownloadResponse,
        crate::api::routes::ExtractRequest,
        crate::api::routes::ExtractResponse,
        crate::api::routes::StartBatchRequest,
        crate::api::routes::StartBatchResponse,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "downloads", description = "Single downloads - Start, poll, fetch and cancel playlist downloads"),
        (name = "batches", description = "Batches - Download several playlists and fetch them as one ZIP"),
        (name = "system", description = "System endpoints - Health checks, capabilities, OpenAPI spec, events"),
    )
)]
pub struct ApiDoc;
