//! Configuration loading for the GeoHarvest ingest daemon
//!
//! Settings sources, highest priority first:
//! 1. Environment variables (secrets and endpoints only, see [`ENV_OVERRIDES`])
//! 2. TOML configuration file (`--config`, or the platform config dir)
//! 3. Built-in defaults (code constants)
//!
//! A missing TOML file at the default location is not an error: the daemon
//! logs a warning and continues with defaults, expecting the environment to
//! supply whatever is required.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variables that override TOML values
pub const ENV_OVERRIDES: &[&str] = &[
    "FLICKR_API_KEY",
    "FLICKR_ENDPOINT",
    "BING_MAPS_KEY",
    "CLASSIFIER_ENDPOINT",
    "OVERPASS_ENDPOINT",
    "BLOB_ENDPOINT",
    "BLOB_ACCESS_KEY",
    "BLOB_SECRET_KEY",
];

/// Top-level daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Address for the health endpoint
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Per-request HTTP timeout for all external services
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub flickr: FlickrConfig,
    #[serde(default)]
    pub blob_store: BlobStoreConfig,
    #[serde(default)]
    pub elevation: ElevationConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub overpass: OverpassConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub enricher: EnricherConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins if set
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlickrConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Disable the 1 call/second limiter (local mock endpoints only)
    pub skip_rate_limit: bool,
    pub min_call_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobStoreConfig {
    pub endpoint: Option<String>,
    pub bucket: String,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Prefix for public object URLs; defaults to `{endpoint}/{bucket}`
    pub public_base_url: Option<String>,
    /// First path segment of every object key
    pub key_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevationConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverpassConfig {
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub page_size: u32,
    /// Deepest page requested before the window moves forward
    pub page_cap: u32,
    /// How far behind "now" a completed crawl restarts
    pub overlap_secs: u64,
    pub asset_concurrency: usize,
    /// Largest edge (px) of the stored "large" variant
    pub max_asset_edge: u32,
    /// Skip photos whose EXIF lacks GPS coordinates
    pub require_gps_exif: bool,
    /// A region is due again this long after its last completed round
    pub recheck_interval_hours: u64,
    pub idle_sleep_secs: u64,
    /// Restrict crawling to one region (debugging)
    pub only_region: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnricherConfig {
    pub concurrency: usize,
    pub batch_size: u32,
    pub idle_sleep_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub max_elapsed_secs: u64,
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("geoharvest").join("geoharvest.db"))
        .unwrap_or_else(|| PathBuf::from("./geoharvest_data/geoharvest.db"))
}

fn default_bind_address() -> String {
    "127.0.0.1:5780".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for FlickrConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.flickr.com".to_string(),
            api_key: None,
            skip_rate_limit: false,
            min_call_interval_ms: 1000,
        }
    }
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            bucket: "geoharvest-photos".to_string(),
            region: "us-east-1".to_string(),
            access_key: None,
            secret_key: None,
            public_base_url: None,
            key_prefix: "flickr".to_string(),
        }
    }
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://dev.virtualearth.net/REST/v1/Elevation/List".to_string(),
            api_key: None,
        }
    }
}

impl Default for OverpassConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://overpass-api.de/api/interpreter".to_string(),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            page_cap: 20,
            overlap_secs: 3600,
            asset_concurrency: 10,
            max_asset_edge: 2048,
            require_gps_exif: true,
            recheck_interval_hours: 24 * 7,
            idle_sleep_secs: 60,
            only_region: None,
        }
    }
}

impl Default for EnricherConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            batch_size: 100,
            idle_sleep_secs: 300,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 200,
            max_backoff_ms: 2000,
            max_elapsed_secs: 10,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bind_address: default_bind_address(),
            request_timeout_secs: default_request_timeout_secs(),
            logging: LoggingConfig::default(),
            flickr: FlickrConfig::default(),
            blob_store: BlobStoreConfig::default(),
            elevation: ElevationConfig::default(),
            classifier: ClassifierConfig::default(),
            overpass: OverpassConfig::default(),
            crawler: CrawlerConfig::default(),
            enricher: EnricherConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Parse TOML text; omitted fields take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load configuration from an explicit path, or the platform default
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file falls back to built-in defaults. Environment overrides are
    /// applied in both cases.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match explicit_path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Read {} failed: {}", path.display(), e))
                })?;
                info!("Configuration loaded from {}", path.display());
                Self::from_toml_str(&content)?
            }
            None => match default_config_path() {
                Some(path) if path.exists() => {
                    let content = std::fs::read_to_string(&path)?;
                    info!("Configuration loaded from {}", path.display());
                    Self::from_toml_str(&content)?
                }
                other => {
                    warn!(
                        path = ?other,
                        "No configuration file found, using built-in defaults"
                    );
                    Self::default()
                }
            },
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply secret/endpoint overrides from `lookup` (normally the process env)
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("FLICKR_API_KEY") {
            self.flickr.api_key = Some(v);
        }
        if let Some(v) = get("FLICKR_ENDPOINT") {
            self.flickr.endpoint = v;
        }
        if let Some(v) = get("BING_MAPS_KEY") {
            self.elevation.api_key = Some(v);
        }
        if let Some(v) = get("CLASSIFIER_ENDPOINT") {
            self.classifier.endpoint = Some(v);
        }
        if let Some(v) = get("OVERPASS_ENDPOINT") {
            self.overpass.endpoint = v;
        }
        if let Some(v) = get("BLOB_ENDPOINT") {
            self.blob_store.endpoint = Some(v);
        }
        if let Some(v) = get("BLOB_ACCESS_KEY") {
            self.blob_store.access_key = Some(v);
        }
        if let Some(v) = get("BLOB_SECRET_KEY") {
            self.blob_store.secret_key = Some(v);
        }
    }

    /// Check that everything needed to talk to the external services is present
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();

        if self.flickr.api_key.is_none() {
            missing.push("flickr.api_key (FLICKR_API_KEY)");
        }
        if self.elevation.api_key.is_none() {
            missing.push("elevation.api_key (BING_MAPS_KEY)");
        }
        if self.classifier.endpoint.is_none() {
            missing.push("classifier.endpoint (CLASSIFIER_ENDPOINT)");
        }
        if self.blob_store.endpoint.is_none() {
            missing.push("blob_store.endpoint (BLOB_ENDPOINT)");
        }
        if self.blob_store.access_key.is_none() {
            missing.push("blob_store.access_key (BLOB_ACCESS_KEY)");
        }
        if self.blob_store.secret_key.is_none() {
            missing.push("blob_store.secret_key (BLOB_SECRET_KEY)");
        }

        if self.crawler.page_cap == 0 || self.crawler.page_size == 0 {
            return Err(Error::Config(
                "crawler.page_cap and crawler.page_size must be positive".to_string(),
            ));
        }
        if self.crawler.asset_concurrency == 0 || self.enricher.concurrency == 0 {
            return Err(Error::Config("concurrency limits must be positive".to_string()));
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "Missing required settings: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl BlobStoreConfig {
    /// Base for public object URLs
    pub fn resolved_public_base_url(&self) -> Option<String> {
        self.public_base_url.clone().or_else(|| {
            self.endpoint
                .as_ref()
                .map(|e| format!("{}/{}", e.trim_end_matches('/'), self.bucket))
        })
    }
}

/// `<config dir>/geoharvest/ingest.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("geoharvest").join("ingest.toml"))
}
