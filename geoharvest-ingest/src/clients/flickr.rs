//! Flickr REST client
//!
//! All API calls go through one [`RateLimiter`] owned by the client
//! instance (1 call/second by default) and are retried on transient
//! failures. Image downloads hit the static CDN and are not rate limited.

use super::{PhotoDetail, PhotoSearch, SearchPage, SearchQuery};
use crate::error::{IngestError, IngestResult};
use crate::utils::{retry_transient, RetryPolicy};
use async_trait::async_trait;
use geoharvest_common::config::FlickrConfig;
use geoharvest_common::{Candidate, ExifTag, SizeVariant};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Licenses accepted by the search (all Creative Commons and public domain)
const LICENSES: &str = "1,2,3,4,5,6,7,8,9,10";

/// Rate limiter enforcing a minimum interval between calls
pub struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    /// Wait if necessary to comply with rate limit
    ///
    /// The lock is held across the sleep so concurrent callers queue up.
    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Flickr API client
pub struct FlickrClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    /// `None` when waits are disabled for local mock endpoints
    rate_limiter: Option<RateLimiter>,
    retry: RetryPolicy,
}

impl FlickrClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        min_call_interval: Option<Duration>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> IngestResult<Self> {
        Ok(Self {
            http_client: super::http_client(timeout)?,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            rate_limiter: min_call_interval.map(RateLimiter::new),
            retry,
        })
    }

    pub fn from_config(
        config: &FlickrConfig,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> IngestResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| IngestError::permanent("flickr", "api key not configured"))?;
        let interval = (!config.skip_rate_limit)
            .then(|| Duration::from_millis(config.min_call_interval_ms));

        Self::new(config.endpoint.clone(), api_key, interval, timeout, retry)
    }

    /// Call one REST method and return the decoded body
    ///
    /// A `stat: "fail"` body is a permanent error carrying Flickr's code
    /// and message.
    pub async fn call(&self, method: &str, params: &[(&str, String)]) -> IngestResult<Value> {
        let url = format!("{}/services/rest", self.endpoint);
        let mut query: Vec<(&str, String)> = vec![
            ("method", method.to_string()),
            ("format", "json".to_string()),
            ("nojsoncallback", "1".to_string()),
            ("api_key", self.api_key.clone()),
        ];
        query.extend(params.iter().cloned());

        retry_transient(method, &self.retry, || async {
            if let Some(limiter) = &self.rate_limiter {
                limiter.wait().await;
            }

            tracing::debug!(method, "Flickr call");

            let response = self
                .http_client
                .get(&url)
                .header("X-Api-Key", &self.api_key)
                .query(&query)
                .send()
                .await
                .map_err(|e| IngestError::from_reqwest(method, e))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(IngestError::from_status(method, status, &body));
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| IngestError::from_reqwest(method, e))?;
            let value: Value = serde_json::from_slice(&body)
                .map_err(|e| IngestError::permanent(method, format!("malformed response: {}", e)))?;

            check_stat(method, &value)?;
            Ok(value)
        })
        .await
    }

    async fn get_exif(&self, photo_id: &str) -> IngestResult<Vec<ExifTag>> {
        let value = self
            .call("flickr.photos.getExif", &[("photo_id", photo_id.to_string())])
            .await?;
        parse_exif(&value)
    }

    async fn get_info(&self, photo_id: &str) -> IngestResult<(Value, Vec<SizeVariant>)> {
        let value = self
            .call(
                "flickr.photos.getInfo",
                &[
                    ("photo_id", photo_id.to_string()),
                    ("extras", "sizes".to_string()),
                ],
            )
            .await?;
        split_info_sizes(value)
    }
}

#[async_trait]
impl PhotoSearch for FlickrClient {
    async fn search(&self, query: &SearchQuery) -> IngestResult<SearchPage> {
        let params = [
            ("bbox", query.bbox.to_query_param()),
            ("min_upload_date", query.min_upload_date.timestamp().to_string()),
            ("sort", "date-posted-asc".to_string()),
            ("safe_search", "1".to_string()),
            ("content_type", "1".to_string()),
            ("license", LICENSES.to_string()),
            ("extras", "geo,date_upload".to_string()),
            ("per_page", query.per_page.to_string()),
            ("page", query.page.to_string()),
        ];

        let value = self.call("flickr.photos.search", &params).await?;
        parse_search_page(value)
    }

    async fn get_detail(&self, photo_id: &str) -> IngestResult<PhotoDetail> {
        let exif = self.get_exif(photo_id).await?;
        let (info, sizes) = self.get_info(photo_id).await?;
        Ok(PhotoDetail { info, sizes, exif })
    }

    async fn download_to(&self, url: &str, dest: &Path) -> IngestResult<u64> {
        retry_transient("flickr download", &self.retry, || async {
            let mut response = self
                .http_client
                .get(url)
                .send()
                .await
                .map_err(|e| IngestError::from_reqwest("flickr download", e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(IngestError::from_status("flickr download", status, ""));
            }

            let mut file = tokio::fs::File::create(dest).await?;
            let mut written = 0u64;
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| IngestError::from_reqwest("flickr download", e))?
            {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;

            Ok(written)
        })
        .await
    }
}

// ============================================================================
// Response parsing
// ============================================================================

fn check_stat(method: &str, value: &Value) -> IngestResult<()> {
    if value.get("stat").and_then(Value::as_str) == Some("fail") {
        let code = value.get("code").map(|c| c.to_string()).unwrap_or_default();
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(IngestError::permanent(
            method,
            format!("flickr error {}: {}", code, message),
        ));
    }
    Ok(())
}

#[derive(Deserialize)]
struct SearchEnvelope {
    photos: SearchPhotos,
}

#[derive(Deserialize)]
struct SearchPhotos {
    #[serde(default, deserialize_with = "lenient_u32")]
    page: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pages: u32,
    #[serde(default)]
    photo: Vec<Candidate>,
}

fn parse_search_page(value: Value) -> IngestResult<SearchPage> {
    let envelope: SearchEnvelope = serde_json::from_value(value).map_err(|e| {
        IngestError::permanent("flickr.photos.search", format!("malformed response: {}", e))
    })?;

    Ok(SearchPage {
        page: envelope.photos.page,
        pages: envelope.photos.pages,
        candidates: envelope.photos.photo,
    })
}

/// `photo.exif[*]` → tag name plus `raw._content`
pub(crate) fn parse_exif(value: &Value) -> IngestResult<Vec<ExifTag>> {
    let Some(entries) = value.pointer("/photo/exif") else {
        return Ok(Vec::new());
    };
    let entries = match entries {
        Value::Array(entries) => entries,
        Value::Null => return Ok(Vec::new()),
        _ => {
            return Err(IngestError::permanent(
                "flickr.photos.getExif",
                "exif is not an array",
            ))
        }
    };

    Ok(entries
        .iter()
        .filter_map(|entry| {
            let tag = entry.get("tag")?.as_str()?;
            let raw = match entry.get("raw") {
                Some(Value::Object(obj)) => obj.get("_content")?.as_str()?.to_string(),
                Some(Value::String(s)) => s.clone(),
                _ => return None,
            };
            Some(ExifTag::new(tag, raw))
        })
        .collect())
}

/// Remove the `sizes` extra from the info object and decode it
pub(crate) fn split_info_sizes(mut value: Value) -> IngestResult<(Value, Vec<SizeVariant>)> {
    let context = "flickr.photos.getInfo";
    let photo = value
        .get_mut("photo")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| IngestError::permanent(context, "response missing photo"))?;

    let sizes = photo
        .remove("sizes")
        .ok_or_else(|| IngestError::permanent(context, "response missing sizes extra"))?;
    let sizes = sizes
        .get("size")
        .cloned()
        .ok_or_else(|| IngestError::permanent(context, "sizes extra missing size list"))?;
    let sizes: Vec<SizeVariant> = serde_json::from_value(sizes)
        .map_err(|e| IngestError::permanent(context, format!("malformed sizes: {}", e)))?;

    let info = Value::Object(photo.clone());
    Ok((info, sizes))
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => Ok(n.as_u64().map(|v| v.min(u32::MAX as u64) as u32).unwrap_or(0)),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid page number: {:?}", s))),
        Value::Null => Ok(0),
        other => Err(serde::de::Error::custom(format!(
            "expected page number, got {}",
            other
        ))),
    }
}
