//! Asset fetcher
//!
//! Downloads the "medium" and "large" renditions of each accepted photo and
//! re-uploads them to the blob store under deterministic keys, so replaying
//! a step overwrites rather than duplicates.
//!
//! **Failure policy:** photos whose download or upload fails are dropped from
//! the result. If more than a quarter of the batch fails, the whole call
//! fails with `BatchAborted` and nothing from it may be persisted. Photos
//! without an eligible medium rendition are skipped and never count as
//! failures.

use crate::clients::{BlobStore, PhotoSearch};
use crate::error::{IngestError, IngestResult};
use crate::utils::run_bounded;
use geoharvest_common::config::{BlobStoreConfig, CrawlerConfig};
use geoharvest_common::{Photo, PhotoSize, SizeVariant};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const JPEG: &str = "image/jpeg";

/// Labels never stored as the large rendition
const EXCLUDED_LABELS: &[&str] = &["Square", "Large Square", "Original"];

#[derive(Debug, Clone)]
pub struct AssetFetcherSettings {
    pub concurrency: usize,
    /// Largest edge (px) of any stored rendition
    pub max_edge: u32,
    pub key_prefix: String,
}

impl Default for AssetFetcherSettings {
    fn default() -> Self {
        Self {
            concurrency: 10,
            max_edge: 2048,
            key_prefix: "flickr".to_string(),
        }
    }
}

impl AssetFetcherSettings {
    pub fn from_config(crawler: &CrawlerConfig, blob_store: &BlobStoreConfig) -> Self {
        Self {
            concurrency: crawler.asset_concurrency,
            max_edge: crawler.max_asset_edge,
            key_prefix: blob_store.key_prefix.clone(),
        }
    }
}

/// Renditions chosen for storage
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedSizes {
    pub medium: SizeVariant,
    pub large: SizeVariant,
}

/// Pick the medium and large renditions
///
/// Only `media == "photo"` variants no larger than `max_edge` on either side
/// are eligible, and cropped or original renditions are ignored. The medium
/// rendition is the one labelled `Medium`; the large is the widest eligible
/// variant (which may be the medium itself).
///
/// # Errors
/// `Skip` if no eligible `Medium` variant exists.
pub fn select_sizes(
    photo_id: &str,
    sizes: &[SizeVariant],
    max_edge: u32,
) -> IngestResult<SelectedSizes> {
    let eligible = sizes.iter().filter(|s| {
        s.media == "photo"
            && !EXCLUDED_LABELS.contains(&s.label.as_str())
            && s.width <= max_edge
            && s.height <= max_edge
    });

    let mut medium: Option<&SizeVariant> = None;
    let mut large: Option<&SizeVariant> = None;
    for size in eligible {
        if size.label == "Medium" {
            medium = Some(size);
        }
        if large.map_or(true, |l| size.width > l.width) {
            large = Some(size);
        }
    }

    match (medium, large) {
        (Some(medium), Some(large)) => Ok(SelectedSizes {
            medium: medium.clone(),
            large: large.clone(),
        }),
        _ => Err(IngestError::skip(photo_id, "missing medium size")),
    }
}

/// `<prefix>/<photo id>/<rendition>.jpg`
pub fn object_key(prefix: &str, photo_id: &str, rendition: &str) -> String {
    format!("{}/{}/{}.jpg", prefix, photo_id, rendition)
}

pub struct AssetFetcher {
    search: Arc<dyn PhotoSearch>,
    store: Arc<dyn BlobStore>,
    settings: AssetFetcherSettings,
}

impl AssetFetcher {
    pub fn new(
        search: Arc<dyn PhotoSearch>,
        store: Arc<dyn BlobStore>,
        settings: AssetFetcherSettings,
    ) -> Self {
        Self {
            search,
            store,
            settings,
        }
    }

    /// Renditions this fetcher would store for `sizes`
    pub fn select(&self, photo_id: &str, sizes: &[SizeVariant]) -> IngestResult<SelectedSizes> {
        select_sizes(photo_id, sizes, self.settings.max_edge)
    }

    /// Store renditions for every photo; returns the photos that succeeded
    pub async fn fetch(
        &self,
        photos: Vec<Photo>,
        cancel: &CancellationToken,
    ) -> IngestResult<Vec<Photo>> {
        let total = photos.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let search = Arc::clone(&self.search);
        let store = Arc::clone(&self.store);
        let settings = self.settings.clone();

        let results = run_bounded(photos, self.settings.concurrency, cancel, move |photo| {
            let search = Arc::clone(&search);
            let store = Arc::clone(&store);
            let settings = settings.clone();
            async move {
                let id = photo.id.clone();
                store_photo(search.as_ref(), store.as_ref(), &settings, photo)
                    .await
                    .map_err(|e| {
                        if e.is_skip() {
                            tracing::warn!(photo_id = %id, error = %e, "Skip: no storable sizes");
                        } else {
                            tracing::error!(photo_id = %id, error = %e, "Asset fetch failed");
                        }
                        e
                    })
            }
        })
        .await?;

        let mut stored = Vec::with_capacity(total);
        let mut failed = 0;
        let mut ineligible = 0;
        for result in results {
            match result {
                Ok(photo) => stored.push(photo),
                Err(e) if e.is_skip() => ineligible += 1,
                Err(_) => failed += 1,
            }
        }

        if failed > total / 4 {
            tracing::error!(failed, total, "Too many asset failures, aborting batch");
            return Err(IngestError::BatchAborted {
                operation: "asset fetch",
                failed,
                total,
            });
        }

        tracing::info!(stored = stored.len(), failed, ineligible, total, "Assets stored");
        Ok(stored)
    }
}

async fn store_photo(
    search: &dyn PhotoSearch,
    store: &dyn BlobStore,
    settings: &AssetFetcherSettings,
    mut photo: Photo,
) -> IngestResult<Photo> {
    let selected = select_sizes(&photo.id, &photo.sizes, settings.max_edge)?;

    // Removed on drop
    let medium_file = tempfile::NamedTempFile::new()?;
    let large_file = tempfile::NamedTempFile::new()?;

    tracing::debug!(photo_id = %photo.id, source = %selected.medium.source, "Download medium");
    search
        .download_to(&selected.medium.source, medium_file.path())
        .await?;

    tracing::debug!(photo_id = %photo.id, source = %selected.large.source, "Download large");
    search
        .download_to(&selected.large.source, large_file.path())
        .await?;

    let medium_key = object_key(&settings.key_prefix, &photo.id, "medium");
    store
        .put_object(&medium_key, medium_file.path(), JPEG)
        .await?;

    let large_key = object_key(&settings.key_prefix, &photo.id, "large");
    store.put_object(&large_key, large_file.path(), JPEG).await?;

    photo.medium = PhotoSize {
        width: selected.medium.width,
        height: selected.medium.height,
        source: store.public_url(&medium_key),
    };
    photo.large = PhotoSize {
        width: selected.large.width,
        height: selected.large.height,
        source: store.public_url(&large_key),
    };

    Ok(photo)
}
