//! External collaborators
//!
//! Each service the ingest pipeline talks to sits behind a narrow trait so
//! the crawler and enricher can be tested with in-memory fakes. The HTTP
//! implementations live in the submodules.

use crate::error::IngestResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geoharvest_common::{BoundingBox, Candidate, ExifTag, SizeVariant};
use serde_json::Value;
use std::path::Path;

pub mod blob_store;
pub mod elevation;
pub mod flickr;
pub mod images;
pub mod overpass;
pub mod validity;

pub use blob_store::S3BlobStore;
pub use elevation::BingElevationClient;
pub use flickr::FlickrClient;
pub use images::HttpImageSource;
pub use overpass::{OverpassHttpClient, OverpassResponse};
pub use validity::HttpValidityClassifier;

/// User agent sent to every external service
pub const USER_AGENT: &str = concat!(
    "geoharvest-ingest/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/geoharvest/geoharvest)"
);

// ============================================================================
// Photo search
// ============================================================================

/// One page of a date-ordered bounding box search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub bbox: BoundingBox,
    pub min_upload_date: DateTime<Utc>,
    pub page: u32,
    pub per_page: u32,
}

/// Search results plus paging state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub page: u32,
    pub pages: u32,
    pub candidates: Vec<Candidate>,
}

/// Metadata, size variants and EXIF for one photo
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoDetail {
    /// Info object with the `sizes` extra removed
    pub info: Value,
    pub sizes: Vec<SizeVariant>,
    pub exif: Vec<ExifTag>,
}

#[async_trait]
pub trait PhotoSearch: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> IngestResult<SearchPage>;

    async fn get_detail(&self, photo_id: &str) -> IngestResult<PhotoDetail>;

    /// Download `url` into `dest`, returning the number of bytes written
    async fn download_to(&self, url: &str, dest: &Path) -> IngestResult<u64>;
}

// ============================================================================
// Blob storage
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadInfo {
    pub key: String,
    pub size: u64,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_object(
        &self,
        key: &str,
        local_path: &Path,
        content_type: &str,
    ) -> IngestResult<UploadInfo>;

    /// Public URL under which `key` is served
    fn public_url(&self, key: &str) -> String;
}

// ============================================================================
// Enrichment collaborators
// ============================================================================

#[async_trait]
pub trait ElevationLookup: Send + Sync {
    /// Terrain elevation in metres
    async fn lookup_elevation(&self, lng: f64, lat: f64) -> IngestResult<f64>;
}

/// Classifier verdict for one image
#[derive(Debug, Clone, PartialEq)]
pub struct ValidityResult {
    /// In `[0, 1]`
    pub score: f64,
    pub model: String,
}

#[async_trait]
pub trait ValidityClassifier: Send + Sync {
    async fn classify(&self, image: &[u8]) -> IngestResult<ValidityResult>;
}

#[async_trait]
pub trait OverpassQuery: Send + Sync {
    async fn query(&self, query: &str) -> IngestResult<OverpassResponse>;
}

#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch_image(&self, url: &str) -> IngestResult<Vec<u8>>;
}

/// Build the shared reqwest client configuration
pub(crate) fn http_client(timeout: std::time::Duration) -> IngestResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| crate::error::IngestError::permanent("http client", e))
}
