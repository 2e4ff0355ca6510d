//! Configuration types for hls-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};
use utoipa::ToSchema;

/// Upper bound for parallel segment fetches inside one pipeline
pub const MAX_SEGMENT_CONCURRENCY: usize = 16;

/// Upper bound for pipelines running at once inside one batch
pub const MAX_BATCH_CONCURRENCY: usize = 10;

/// Download behavior configuration (directories, timeouts, concurrency)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloadConfig {
    /// Root directory for per-pipeline scratch areas (default: system temp dir + "hls-dl")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Directory where batch archives are written (default: `<temp_dir>/archives`)
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,

    /// Timeout for fetching a playlist (default: 30 seconds)
    #[serde(default = "default_playlist_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub playlist_timeout: Duration,

    /// Timeout for fetching one segment (default: 30 seconds)
    #[serde(default = "default_segment_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub segment_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Parallel segment fetches per pipeline (default: 4, clamped to 1..=16)
    #[serde(default = "default_segment_concurrency")]
    pub segment_concurrency: usize,

    /// Pipelines running at once per batch (default: 3, clamped to 1..=10)
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,

    /// Maximum number of URLs accepted in one batch (default: 10)
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Overall time budget for one pipeline (default: 1 hour)
    #[serde(default = "default_pipeline_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub pipeline_timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            archive_dir: None,
            playlist_timeout: default_playlist_timeout(),
            segment_timeout: default_segment_timeout(),
            user_agent: default_user_agent(),
            segment_concurrency: default_segment_concurrency(),
            batch_concurrency: default_batch_concurrency(),
            max_batch_size: default_max_batch_size(),
            pipeline_timeout: default_pipeline_timeout(),
        }
    }
}

/// External tool configuration (ffmpeg)
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ToolsConfig {
    /// Path to the ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for ffmpeg if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Time budget for the merge step (default: 300 seconds)
    #[serde(default = "default_merge_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub merge_timeout: Duration,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            search_path: true,
            merge_timeout: default_merge_timeout(),
        }
    }
}

/// Retention of finished tasks and batches
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetentionConfig {
    /// Idle time after which terminal tasks and batches are evicted
    /// (default: 3600 seconds, None = keep until released)
    #[serde(default = "default_retention_ttl", with = "optional_duration_serde")]
    #[schema(value_type = Option<u64>)]
    pub ttl: Option<Duration>,

    /// How often the reaper sweeps (default: 60 seconds)
    #[serde(default = "default_sweep_interval", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub sweep_interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            ttl: default_retention_ttl(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

/// Playlist link discovery on web pages
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DiscoveryConfig {
    /// Timeout for fetching a web page (default: 30 seconds)
    #[serde(default = "default_page_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub page_timeout: Duration,

    /// Maximum number of embedded iframes followed (default: 3)
    #[serde(default = "default_max_iframes")]
    pub max_iframes: usize,

    /// Only keep links that answer a HEAD/GET probe (default: true)
    #[serde(default = "default_true")]
    pub validate_links: bool,

    /// Timeout for one link probe (default: 10 seconds)
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub probe_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            page_timeout: default_page_timeout(),
            max_iframes: default_max_iframes(),
            validate_links: true,
            probe_timeout: default_probe_timeout(),
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:5000)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Main configuration for HlsDownloader
///
/// Fields are organized into sub-configs:
/// - [`download`](DownloadConfig) - directories, timeouts, concurrency
/// - [`tools`](ToolsConfig) - ffmpeg location and merge budget
/// - [`retention`](RetentionConfig) - eviction of finished work
/// - [`discovery`](DiscoveryConfig) - playlist discovery on web pages
/// - [`api`](ApiConfig) - REST API server
///
/// Every field has a default, so `{}` is a valid configuration file.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// External tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Retention settings
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Link discovery settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// REST API settings
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Temporary directory holding scratch areas
    pub fn temp_dir(&self) -> &PathBuf {
        &self.download.temp_dir
    }

    /// Directory where batch archives are written
    pub fn archive_dir(&self) -> PathBuf {
        self.download
            .archive_dir
            .clone()
            .unwrap_or_else(|| self.download.temp_dir.join("archives"))
    }

    /// Segment concurrency clamped to the supported range
    pub fn segment_concurrency(&self) -> usize {
        self.download
            .segment_concurrency
            .clamp(1, MAX_SEGMENT_CONCURRENCY)
    }

    /// Batch concurrency clamped to the supported range
    pub fn batch_concurrency(&self) -> usize {
        self.download
            .batch_concurrency
            .clamp(1, MAX_BATCH_CONCURRENCY)
    }

    /// Load a configuration from a JSON file
    ///
    /// Missing fields take their defaults. The result is validated.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot work
    ///
    /// Out-of-range concurrency values are clamped at use, not rejected.
    pub fn validate(&self) -> Result<()> {
        if self.download.max_batch_size == 0 {
            return Err(config_error(
                "max_batch_size must be at least 1",
                "download.max_batch_size",
            ));
        }
        let timeouts = [
            (self.download.playlist_timeout, "download.playlist_timeout"),
            (self.download.segment_timeout, "download.segment_timeout"),
            (self.download.pipeline_timeout, "download.pipeline_timeout"),
            (self.tools.merge_timeout, "tools.merge_timeout"),
            (self.discovery.page_timeout, "discovery.page_timeout"),
        ];
        for (value, key) in timeouts {
            if value.is_zero() {
                return Err(config_error("timeout must be greater than zero", key));
            }
        }
        if self.retention.sweep_interval.is_zero() {
            return Err(config_error(
                "sweep_interval must be greater than zero",
                "retention.sweep_interval",
            ));
        }
        if self.download.user_agent.trim().is_empty() {
            return Err(config_error(
                "user_agent must not be empty",
                "download.user_agent",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

// Default value functions
fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("hls-dl")
}

fn default_playlist_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_segment_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string()
}

fn default_segment_concurrency() -> usize {
    4
}

fn default_batch_concurrency() -> usize {
    3
}

fn default_max_batch_size() -> usize {
    10
}

fn default_pipeline_timeout() -> Duration {
    Duration::from_secs(3600)
}

fn default_merge_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_retention_ttl() -> Option<Duration> {
    Some(Duration::from_secs(3600))
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_page_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_iframes() -> usize {
    3
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
