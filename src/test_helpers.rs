//! Shared test helpers: playlist fixtures served by wiremock, test
//! configuration and stand-in mergers.

use crate::config::Config;
use crate::downloader::HlsDownloader;
use crate::error::Result;
use crate::merge::{ConcatMerger, Merger};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock HTTP origin serving playlists and their segments
pub(crate) struct PlaylistServer {
    pub server: MockServer,
}

impl PlaylistServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn url(&self, route: &str) -> String {
        format!("{}{}", self.server.uri(), route)
    }

    /// Serve `/<name>/index.m3u8` with `count` segments; indices in
    /// `failing` answer 500. Segment `i` has the body `<name>:<i>;`.
    pub async fn playlist(&self, name: &str, count: usize, failing: &[usize]) -> String {
        self.playlist_with_delay(name, count, failing, Duration::ZERO)
            .await
    }

    /// Like [`playlist`](Self::playlist), with every segment delayed
    pub async fn playlist_with_delay(
        &self,
        name: &str,
        count: usize,
        failing: &[usize],
        delay: Duration,
    ) -> String {
        let mut body = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n");
        for i in 0..count {
            body.push_str(&format!("#EXTINF:6.0,\nseg_{i:04}.ts\n"));
            let response = if failing.contains(&i) {
                ResponseTemplate::new(500)
            } else {
                ResponseTemplate::new(200)
                    .set_body_bytes(format!("{name}:{i};").into_bytes())
                    .set_delay(delay)
            };
            Mock::given(method("GET"))
                .and(path(format!("/{name}/seg_{i:04}.ts")))
                .respond_with(response)
                .mount(&self.server)
                .await;
        }
        body.push_str("#EXT-X-ENDLIST\n");

        let route = format!("/{name}/index.m3u8");
        Mock::given(method("GET"))
            .and(path(route.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&self.server)
            .await;
        self.url(&route)
    }

    /// A playlist URL answering 404
    pub async fn missing(&self, name: &str) -> String {
        let route = format!("/{name}/index.m3u8");
        Mock::given(method("GET"))
            .and(path(route.clone()))
            .respond_with(ResponseTemplate::new(404))
            .mount(&self.server)
            .await;
        self.url(&route)
    }

    /// A playlist URL whose response takes `delay`
    pub async fn stalled(&self, name: &str, delay: Duration) -> String {
        let route = format!("/{name}/index.m3u8");
        Mock::given(method("GET"))
            .and(path(route.clone()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("#EXTM3U\nseg.ts\n")
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
        self.url(&route)
    }
}

/// Configuration rooted in `root`, with short timeouts
pub(crate) fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.download.temp_dir = root.join("temp");
    config.download.archive_dir = Some(root.join("archives"));
    config.download.segment_timeout = Duration::from_secs(5);
    config.download.playlist_timeout = Duration::from_secs(5);
    config.tools.merge_timeout = Duration::from_secs(10);
    config.tools.search_path = false;
    config.discovery.validate_links = false;
    config
}

pub(crate) fn concat_merger() -> Arc<dyn Merger> {
    Arc::new(ConcatMerger::new(Duration::from_secs(10)))
}

/// Helper to create a test HlsDownloader using the in-process merger.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader() -> (HlsDownloader, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let config = test_config(temp_dir.path());
    let downloader = HlsDownloader::with_merger(config, concat_merger())
        .await
        .unwrap();
    (downloader, temp_dir)
}

/// Merger that panics, to exercise worker panic handling
pub(crate) struct PanickingMerger;

#[async_trait]
impl Merger for PanickingMerger {
    async fn merge(
        &self,
        _segments: &[PathBuf],
        _scratch_dir: &Path,
        _cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        panic!("merger exploded");
    }

    fn name(&self) -> &'static str {
        "panicking"
    }

    fn remuxes(&self) -> bool {
        false
    }
}

/// Concat merger that holds each merge for a while and records the peak
/// number of merges running at once
pub(crate) struct GaugedMerger {
    inner: ConcatMerger,
    hold: Duration,
    running: AtomicUsize,
    pub peak: AtomicUsize,
}

impl GaugedMerger {
    pub fn new(hold: Duration) -> Self {
        Self {
            inner: ConcatMerger::new(Duration::from_secs(10)),
            hold,
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Merger for GaugedMerger {
    async fn merge(
        &self,
        segments: &[PathBuf],
        scratch_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        let result = self.inner.merge(segments, scratch_dir, cancel).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &'static str {
        "gauged"
    }

    fn remuxes(&self) -> bool {
        false
    }
}
