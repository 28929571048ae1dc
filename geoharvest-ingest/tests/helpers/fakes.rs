//! In-memory stand-ins for the external services

use async_trait::async_trait;
use geoharvest_ingest::clients::{
    BlobStore, ElevationLookup, ImageSource, OverpassQuery, OverpassResponse, PhotoDetail,
    PhotoSearch, SearchPage, SearchQuery, UploadInfo, ValidityClassifier, ValidityResult,
};
use geoharvest_ingest::{IngestError, IngestResult};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

// ============================================================================
// Photo search
// ============================================================================

/// Serves queued search pages and canned details
///
/// Once the queue is empty every search returns an empty page.
#[derive(Default)]
pub struct FakeSearch {
    pages: Mutex<VecDeque<SearchPage>>,
    details: HashMap<String, PhotoDetail>,
    failing_details: HashSet<String>,
    failing_downloads: HashSet<String>,
    pub queries: Mutex<Vec<SearchQuery>>,
    pub detail_calls: AtomicUsize,
}

impl FakeSearch {
    pub fn with_page(self, page: SearchPage) -> Self {
        self.pages.lock().unwrap().push_back(page);
        self
    }

    pub fn with_detail(mut self, id: &str, detail: PhotoDetail) -> Self {
        self.details.insert(id.to_string(), detail);
        self
    }

    pub fn fail_detail(mut self, id: &str) -> Self {
        self.failing_details.insert(id.to_string());
        self
    }

    pub fn fail_download(mut self, url: &str) -> Self {
        self.failing_downloads.insert(url.to_string());
        self
    }

    pub fn recorded_queries(&self) -> Vec<SearchQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl PhotoSearch for FakeSearch {
    async fn search(&self, query: &SearchQuery) -> IngestResult<SearchPage> {
        self.queries.lock().unwrap().push(query.clone());
        Ok(self.pages.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn get_detail(&self, photo_id: &str) -> IngestResult<PhotoDetail> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_details.contains(photo_id) {
            return Err(IngestError::permanent(
                "flickr.photos.getInfo",
                "flickr error 1: Photo not found",
            ));
        }
        self.details
            .get(photo_id)
            .cloned()
            .ok_or_else(|| IngestError::permanent("fake search", format!("no detail for {}", photo_id)))
    }

    async fn download_to(&self, url: &str, dest: &Path) -> IngestResult<u64> {
        if self.failing_downloads.contains(url) {
            return Err(IngestError::transient("flickr download", "HTTP 503"));
        }
        let body = format!("jpeg:{}", url);
        tokio::fs::write(dest, body.as_bytes()).await?;
        Ok(body.len() as u64)
    }
}

// ============================================================================
// Blob store
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub key: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

#[derive(Default)]
pub struct FakeStore {
    failing_keys: HashSet<String>,
    pub objects: Mutex<Vec<StoredObject>>,
}

impl FakeStore {
    pub fn fail_key(mut self, key: &str) -> Self {
        self.failing_keys.insert(key.to_string());
        self
    }

    /// Stored objects sorted by key
    pub fn stored(&self) -> Vec<StoredObject> {
        let mut objects = self.objects.lock().unwrap().clone();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        objects
    }
}

#[async_trait]
impl BlobStore for FakeStore {
    async fn put_object(
        &self,
        key: &str,
        local_path: &Path,
        content_type: &str,
    ) -> IngestResult<UploadInfo> {
        if self.failing_keys.contains(key) {
            return Err(IngestError::transient("blob store", "SlowDown"));
        }
        let body = tokio::fs::read(local_path).await?;
        let size = body.len() as u64;
        self.objects.lock().unwrap().push(StoredObject {
            key: key.to_string(),
            content_type: content_type.to_string(),
            body,
        });
        Ok(UploadInfo {
            key: key.to_string(),
            size,
        })
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://cdn.test/{}", key)
    }
}

// ============================================================================
// Enrichment collaborators
// ============================================================================

pub struct FakeElevation {
    pub meters: f64,
    pub calls: AtomicUsize,
}

impl FakeElevation {
    pub fn new(meters: f64) -> Self {
        Self {
            meters,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ElevationLookup for FakeElevation {
    async fn lookup_elevation(&self, _lng: f64, _lat: f64) -> IngestResult<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.meters)
    }
}

/// Returns the URL bytes as the image body
#[derive(Default)]
pub struct FakeImages {
    failing: HashSet<String>,
    pub fetched: Mutex<Vec<String>>,
}

impl FakeImages {
    pub fn fail_url(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }
}

#[async_trait]
impl ImageSource for FakeImages {
    async fn fetch_image(&self, url: &str) -> IngestResult<Vec<u8>> {
        self.fetched.lock().unwrap().push(url.to_string());
        if self.failing.contains(url) {
            return Err(IngestError::permanent("image fetch", "HTTP 404 Not Found"));
        }
        Ok(url.as_bytes().to_vec())
    }
}

pub struct FakeClassifier {
    pub score: f64,
    pub model: String,
}

impl FakeClassifier {
    pub fn new(score: f64, model: &str) -> Self {
        Self {
            score,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl ValidityClassifier for FakeClassifier {
    async fn classify(&self, image: &[u8]) -> IngestResult<ValidityResult> {
        if image.is_empty() {
            return Err(IngestError::permanent("classifier", "empty image"));
        }
        Ok(ValidityResult {
            score: self.score,
            model: self.model.clone(),
        })
    }
}

/// Answers every query with the same response
pub struct FakeOverpass {
    response: OverpassResponse,
    pub queries: Mutex<Vec<String>>,
}

impl FakeOverpass {
    pub fn new(response: OverpassResponse) -> Self {
        Self {
            response,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn from_fixture(body: &[u8]) -> Self {
        Self::new(OverpassResponse::from_json(body).unwrap())
    }
}

#[async_trait]
impl OverpassQuery for FakeOverpass {
    async fn query(&self, query: &str) -> IngestResult<OverpassResponse> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.response.clone())
    }
}
