//! Playlist discovery on ordinary web pages
//!
//! [`LinkExtractor`] scans a page (and a few of its iframes) for `.m3u8`
//! references using a set of regex strategies, resolves them against the page
//! URL and optionally probes each candidate before returning it.

use crate::config::DiscoveryConfig;
use crate::error::Result;
use crate::playlist::request_error;
use futures::stream::{self, StreamExt};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use url::Url;
use utoipa::ToSchema;

/// Link patterns; the last capture group (or the whole match) is the link
const LINK_PATTERNS: &[&str] = &[
    // bare absolute URLs
    r#"https?://[^"\s<>]+\.m3u8[^"\s<>]*"#,
    // quoted absolute URLs
    r#""(https?://[^"]+\.m3u8[^"]*)""#,
    r#"'(https?://[^']+\.m3u8[^']*)'"#,
    // element attributes
    r#"src\s*=\s*["']([^"']+\.m3u8[^"']*)["']"#,
    r#"data-src\s*=\s*["']([^"']+\.m3u8[^"']*)["']"#,
    // player setup objects
    r#"(manifest|playlist|source|hls)["']?\s*:\s*["']([^"']+\.m3u8[^"']*)["']"#,
    // JSON blobs
    r#"["'](url|source|file)["']?\s*:\s*["']([^"']+\.m3u8[^"']*)["']"#,
];

const IFRAME_PATTERN: &str = r#"<iframe[^>]+src=["']([^"']+)["'][^>]*>"#;
const TITLE_PATTERN: &str = r"<title[^>]*>([^<]+)</title>";

/// Concurrent link probes
const PROBE_CONCURRENCY: usize = 4;

/// Summary of a scanned page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WebpageInfo {
    /// Page `<title>`, or `Unknown`
    pub title: String,
    /// Page URL as requested
    pub url: String,
    /// `accessible`, or `error: <reason>`
    pub status: String,
}

/// Finds candidate playlist links on a web page
#[derive(Clone, Debug)]
pub struct LinkExtractor {
    client: reqwest::Client,
    config: DiscoveryConfig,
    patterns: Vec<Regex>,
    iframe: Option<Regex>,
    title: Option<Regex>,
}

impl LinkExtractor {
    /// Create an extractor sharing `client`
    pub fn new(client: reqwest::Client, config: DiscoveryConfig) -> Self {
        Self {
            client,
            config,
            patterns: LINK_PATTERNS.iter().filter_map(|p| compile(p)).collect(),
            iframe: compile(IFRAME_PATTERN),
            title: compile(TITLE_PATTERN),
        }
    }

    /// Candidate playlist links found on `page_url`, best first
    ///
    /// Only a failure to fetch the page itself is an error; an empty list
    /// means nothing usable was found.
    pub async fn extract(&self, page_url: &Url) -> Result<Vec<String>> {
        let html = self.fetch_page(page_url).await?;
        let mut links = self.links_in(&html, page_url);

        for frame_url in self.iframes_in(&html, page_url) {
            match self.fetch_page(&frame_url).await {
                Ok(frame) => {
                    let found = self.links_in(&frame, &frame_url);
                    debug!(iframe = %frame_url, found = found.len(), "scanned iframe");
                    links.extend(found);
                }
                Err(e) => debug!(iframe = %frame_url, error = %e, "skipping iframe"),
            }
        }

        let mut seen = HashSet::new();
        links.retain(|link| seen.insert(link.clone()));

        if self.config.validate_links {
            links = self.keep_reachable(links).await;
        }

        info!(url = %page_url, found = links.len(), "playlist discovery finished");
        Ok(links)
    }

    /// Text of the page's `<title>`, if it has one
    pub async fn page_title(&self, page_url: &Url) -> Option<String> {
        let html = self.fetch_page(page_url).await.ok()?;
        self.title_in(&html)
    }

    /// Title and reachability of `page_url`; never fails
    pub async fn webpage_info(&self, page_url: &Url) -> WebpageInfo {
        let (title, status) = match self.fetch_page(page_url).await {
            Ok(html) => (self.title_in(&html), "accessible".to_string()),
            Err(e) => (None, format!("error: {e}")),
        };
        WebpageInfo {
            title: title.unwrap_or_else(|| "Unknown".to_string()),
            url: page_url.to_string(),
            status,
        }
    }

    async fn fetch_page(&self, url: &Url) -> Result<String> {
        let timeout = self.config.page_timeout;
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| request_error("page", url, timeout, &e))?;

        let response = response
            .error_for_status()
            .map_err(|e| request_error("page", url, timeout, &e))?;

        response
            .text()
            .await
            .map_err(|e| request_error("page", url, timeout, &e))
    }

    fn links_in(&self, html: &str, base: &Url) -> Vec<String> {
        let mut links = Vec::new();
        for pattern in &self.patterns {
            for caps in pattern.captures_iter(html) {
                let Some(raw) = caps.get(caps.len() - 1) else {
                    continue;
                };
                if let Some(link) = normalize_link(raw.as_str(), base) {
                    links.push(link.to_string());
                }
            }
        }
        links
    }

    fn iframes_in(&self, html: &str, base: &Url) -> Vec<Url> {
        let Some(iframe) = &self.iframe else {
            return Vec::new();
        };
        iframe
            .captures_iter(html)
            .filter_map(|caps| caps.get(1))
            .filter_map(|src| normalize_link(src.as_str(), base))
            .take(self.config.max_iframes)
            .collect()
    }

    fn title_in(&self, html: &str) -> Option<String> {
        self.title
            .as_ref()?
            .captures(html)?
            .get(1)
            .map(|t| t.as_str().trim().to_string())
            .filter(|t| !t.is_empty())
    }

    async fn keep_reachable(&self, links: Vec<String>) -> Vec<String> {
        stream::iter(links)
            .map(|link| async move {
                let reachable = self.probe(&link).await;
                if !reachable {
                    debug!(link = %link, "dropping unreachable link");
                }
                reachable.then_some(link)
            })
            .buffered(PROBE_CONCURRENCY)
            .filter_map(|link| async move { link })
            .collect()
            .await
    }

    /// HEAD answering 200, or a ranged GET answering 200/206/416
    async fn probe(&self, link: &str) -> bool {
        let timeout = self.config.probe_timeout;
        if let Ok(response) = self.client.head(link).timeout(timeout).send().await
            && response.status() == reqwest::StatusCode::OK
        {
            return true;
        }

        match self
            .client
            .get(link)
            .header(reqwest::header::RANGE, "bytes=0-1023")
            .timeout(timeout)
            .send()
            .await
        {
            Ok(response) => matches!(response.status().as_u16(), 200 | 206 | 416),
            Err(_) => false,
        }
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| warn!("Invalid discovery pattern '{}': {}", pattern, e))
        .ok()
}

/// Resolve a link found on `base` to an absolute http(s) URL
///
/// Protocol-relative links take the page's scheme; root-relative and
/// relative links are joined to the page URL.
fn normalize_link(raw: &str, base: &Url) -> Option<Url> {
    let raw = raw.trim();
    let url = if raw.starts_with("//") {
        Url::parse(&format!("{}:{}", base.scheme(), raw)).ok()?
    } else if raw.starts_with("http://") || raw.starts_with("https://") {
        Url::parse(raw).ok()?
    } else {
        base.join(raw).ok()?
    };
    matches!(url.scheme(), "http" | "https").then_some(url)
}
