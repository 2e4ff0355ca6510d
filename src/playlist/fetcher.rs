//! HTTP retrieval of playlist text

use crate::error::{Error, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retrieves raw playlist text over HTTP
///
/// Shares the downloader's `reqwest::Client` (connection pool and
/// User-Agent); every request is bounded by the configured timeout.
#[derive(Clone, Debug)]
pub struct PlaylistFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl PlaylistFetcher {
    /// Create a fetcher using `client` with a per-request `timeout`
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Fetch the playlist body as text
    ///
    /// Fails with [`Error::Network`] on connect failure, non-success status,
    /// body read failure or timeout, and with [`Error::Cancelled`] if `cancel`
    /// fires first. An empty body is returned as-is; the pipeline decides
    /// what to do with it.
    pub async fn fetch(&self, url: &url::Url, cancel: &CancellationToken) -> Result<String> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = self.fetch_inner(url) => result,
        }
    }

    async fn fetch_inner(&self, url: &url::Url) -> Result<String> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| request_error("playlist", url, self.timeout, &e))?;

        if !response.status().is_success() {
            return Err(Error::network(format!(
                "HTTP error fetching playlist: {} {}",
                response.status(),
                url
            )));
        }

        response
            .text()
            .await
            .map_err(|e| request_error("playlist", url, self.timeout, &e))
    }
}

/// Describe a failed request, distinguishing timeouts and connect failures
pub(crate) fn request_error(
    what: &str,
    url: &url::Url,
    timeout: Duration,
    e: &reqwest::Error,
) -> Error {
    let message = if e.is_timeout() {
        format!(
            "Timeout fetching {} from '{}' (exceeded {} seconds)",
            what,
            url,
            timeout.as_secs()
        )
    } else if e.is_connect() {
        format!("Connection failed for {} '{}': {}", what, url, e)
    } else {
        format!("Failed to fetch {} from '{}': {}", what, url, e)
    };
    Error::network(message)
}
