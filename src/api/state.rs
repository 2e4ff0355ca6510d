//! Application state for the API server

use crate::{Config, HlsDownloader};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// This struct is cloned for each request (cheap Arc clone) and provides
/// access to the downloader instance and configuration.
#[derive(Clone)]
pub struct AppState {
    /// The downloader facade
    pub downloader: Arc<HlsDownloader>,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(downloader: Arc<HlsDownloader>, config: Arc<Config>) -> Self {
        Self { downloader, config }
    }
}
