use super::*;
use crate::test_helpers::PlaylistServer;
use crate::types::{BatchId, TaskId};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use tower::ServiceExt; // for oneshot()


/// Helper to create a test HlsDownloader instance wrapped in Arc
async fn create_test_downloader() -> (Arc<HlsDownloader>, tempfile::TempDir) {
    let (downloader, temp_dir) = crate::test_helpers::create_test_downloader().await;
    (Arc::new(downloader), temp_dir)
}

fn app(downloader: &Arc<HlsDownloader>) -> Router {
    create_router(downloader.clone(), downloader.get_config())
}

async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn header<'a>(response: &'a Response, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// Scratch entries still present under the temp directory
fn scratch_entries(temp: &Path) -> Vec<String> {
    std::fs::read_dir(temp)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn test_api_server_spawns() {
    let (downloader, _temp_dir) = create_test_downloader().await;

    // Port 0 = OS assigns a free port
    let mut config = (*downloader.get_config()).clone();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let config = Arc::new(config);

    let api_handle = tokio::spawn({
        let downloader = downloader.clone();
        let config = config.clone();
        async move { start_api_server(downloader, config).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!api_handle.is_finished(), "server should still be serving");
    api_handle.abort();
}

#[tokio::test]
async fn test_cors_enabled() {
    let (downloader, _temp_dir) = create_test_downloader().await;

    let mut config = (*downloader.get_config()).clone();
    config.api.cors_enabled = true;
    config.api.cors_origins = vec!["*".to_string()];
    let app = create_router(downloader, Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = send(app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS header should be present when CORS is enabled"
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let (downloader, _temp_dir) = create_test_downloader().await;

    let mut config = (*downloader.get_config()).clone();
    config.api.cors_enabled = false;
    let app = create_router(downloader, Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = send(app, request).await;

    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_cors_specific_origin() {
    let (downloader, _temp_dir) = create_test_downloader().await;

    let mut config = (*downloader.get_config()).clone();
    config.api.cors_enabled = true;
    config.api.cors_origins = vec!["http://allowed.example".to_string()];
    let config = Arc::new(config);

    let allowed = Request::builder()
        .uri("/health")
        .header("Origin", "http://allowed.example")
        .body(Body::empty())
        .unwrap();
    let response = send(create_router(downloader.clone(), config.clone()), allowed).await;
    assert_eq!(
        header(&response, "access-control-allow-origin"),
        "http://allowed.example"
    );

    let other = Request::builder()
        .uri("/health")
        .header("Origin", "http://other.example")
        .body(Body::empty())
        .unwrap();
    let response = send(create_router(downloader, config), other).await;
    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_swagger_ui_toggle() {
    let (downloader, _temp_dir) = create_test_downloader().await;

    let mut config = (*downloader.get_config()).clone();
    config.api.swagger_ui = false;
    let response = send(
        create_router(downloader.clone(), Arc::new(config.clone())),
        get("/swagger-ui/"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    config.api.swagger_ui = true;
    let response = send(create_router(downloader, Arc::new(config)), get("/swagger-ui/")).await;
    assert_ne!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_spawn_api_server_method() {
    let (downloader, _temp_dir) = create_test_downloader().await;

    let api_handle = downloader.spawn_api_server();
    tokio::time::sleep(Duration::from_millis(100)).await;
    api_handle.abort();
}
