//! REST API server example
//!
//! Runs hls-dl with the REST API enabled. Pass a JSON config file as the
//! first argument to override the defaults.
//!
//! After starting, you can:
//! - View Swagger UI at http://localhost:5000/swagger-ui
//! - Start a download via POST http://localhost:5000/downloads
//! - Poll it via GET http://localhost:5000/downloads/{task_id}/progress
//! - Stream events via GET http://localhost:5000/events
//!
//! Set `RUST_LOG=hls_dl=debug` for verbose logs.

use hls_dl::{Config, HlsDownloader, run_with_shutdown};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hls_dl=info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    let address = config.api.bind_address;

    let downloader = Arc::new(HlsDownloader::new(config).await?);
    let capabilities = downloader.capabilities();

    // Background services: retention sweeps and the HTTP server
    let _reaper = downloader.start_reaper();
    let api = downloader.spawn_api_server();

    println!("Starting hls-dl REST API server (merger: {})", capabilities.merger);
    println!("Swagger UI: http://{address}/swagger-ui");
    println!("Events stream: http://{address}/events");
    println!();
    println!("Example commands:");
    println!("  # Start a download");
    println!("  curl -X POST http://{address}/downloads \\");
    println!("    -H 'Content-Type: application/json' \\");
    println!("    -d '{{\"url\": \"https://cdn.example.com/show/index.m3u8\"}}'");
    println!();
    println!("  # Find playlists on a page");
    println!("  curl -X POST http://{address}/extract \\");
    println!("    -H 'Content-Type: application/json' \\");
    println!("    -d '{{\"url\": \"https://example.com/watch\"}}'");
    println!();
    println!("  # Start a batch");
    println!("  curl -X POST http://{address}/batches \\");
    println!("    -H 'Content-Type: application/json' \\");
    println!("    -d '{{\"urls\": [\"https://cdn.example.com/a.m3u8\", \"https://cdn.example.com/b.m3u8\"]}}'");
    println!();
    println!("Press Ctrl+C to stop");

    run_with_shutdown((*downloader).clone()).await?;
    api.abort();

    Ok(())
}
