//! Region crawler
//!
//! One `step` searches one page of photos uploaded inside the region's
//! bounding box, keeps the candidates that really fall inside the region,
//! hydrates and stores them, and computes the next cursor.
//!
//! **Cursor transitions:**
//! - `AdvancePage`: more pages remain inside the current window.
//! - `AdvanceWindow`: the page cap was reached; the window restarts at the
//!   upload time of the last row seen, page 1.
//! - `RewindToNow`: the final page was reached; the round is complete and
//!   the next one starts an overlap period before now.
//!
//! The step itself persists nothing. The caller saves the returned cursor
//! and photos together.

use crate::clients::{PhotoSearch, SearchQuery};
use crate::error::{IngestError, IngestResult};
use crate::services::asset_fetcher::AssetFetcher;
use chrono::{DateTime, Duration, Utc};
use geoharvest_common::config::CrawlerConfig;
use geoharvest_common::time::parse_upload_time;
use geoharvest_common::{Candidate, Cursor, Photo, Region};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorTransition {
    AdvancePage,
    AdvanceWindow,
    RewindToNow,
}

/// Paging limits for cursor advancement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPolicy {
    /// Deepest page requested inside one window
    pub page_cap: u32,
    /// How far before "now" the next round starts
    pub overlap: Duration,
}

impl Default for CursorPolicy {
    fn default() -> Self {
        Self {
            page_cap: 20,
            overlap: Duration::hours(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrawlerSettings {
    pub page_size: u32,
    pub policy: CursorPolicy,
    /// Skip photos whose EXIF lacks GPS coordinates
    pub require_gps_exif: bool,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            policy: CursorPolicy::default(),
            require_gps_exif: true,
        }
    }
}

impl From<&CrawlerConfig> for CrawlerSettings {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            page_size: config.page_size,
            policy: CursorPolicy {
                page_cap: config.page_cap,
                overlap: Duration::seconds(config.overlap_secs as i64),
            },
            require_gps_exif: config.require_gps_exif,
        }
    }
}

/// Result of one crawl step
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub cursor: Cursor,
    pub photos: Vec<Photo>,
    pub transition: CursorTransition,
    /// Candidates filtered out as ineligible
    pub skipped: usize,
    /// Candidates whose detail could not be fetched
    pub failed: usize,
}

/// Compute the cursor that follows a searched page
///
/// # Arguments
/// * `cursor` - Cursor the page was requested with
/// * `page` / `pages` - Paging state reported by the search
/// * `last_date_upload` - Upload time of the last row on the page, if any
/// * `now` - Current time
/// * `policy` - Page cap and overlap
///
/// # Errors
/// Permanent if the window must advance and the last upload time is unparsable.
pub fn advance_cursor(
    cursor: &Cursor,
    page: u32,
    pages: u32,
    last_date_upload: Option<&str>,
    now: DateTime<Utc>,
    policy: &CursorPolicy,
) -> IngestResult<(Cursor, CursorTransition)> {
    let rewind = || {
        (
            Cursor {
                region_id: cursor.region_id,
                min_upload_date: now - policy.overlap,
                page: 1,
                last_check: Some(now),
            },
            CursorTransition::RewindToNow,
        )
    };

    if page >= pages {
        return Ok(rewind());
    }

    let next_page = cursor.page + 1;
    if next_page <= policy.page_cap {
        return Ok((
            Cursor {
                page: next_page,
                ..cursor.clone()
            },
            CursorTransition::AdvancePage,
        ));
    }

    let Some(last) = last_date_upload else {
        // Nothing to anchor a new window on
        return Ok(rewind());
    };
    let min_upload_date = parse_upload_time(last).map_err(|e| {
        IngestError::permanent("cursor advance", format!("last dateupload: {}", e))
    })?;

    Ok((
        Cursor {
            min_upload_date,
            page: 1,
            ..cursor.clone()
        },
        CursorTransition::AdvanceWindow,
    ))
}

pub struct RegionCrawler {
    search: Arc<dyn PhotoSearch>,
    assets: AssetFetcher,
    settings: CrawlerSettings,
}

impl RegionCrawler {
    pub fn new(search: Arc<dyn PhotoSearch>, assets: AssetFetcher, settings: CrawlerSettings) -> Self {
        Self {
            search,
            assets,
            settings,
        }
    }

    /// Crawl one page for `region`
    ///
    /// A missing cursor starts from the epoch at page 1.
    pub async fn step(
        &self,
        region: &Region,
        cursor: Option<Cursor>,
        cancel: &CancellationToken,
    ) -> IngestResult<StepOutcome> {
        let cursor = cursor
            .unwrap_or_else(|| Cursor::initial(region.id))
            .normalized();

        let bbox = region.bounding_box().ok_or_else(|| {
            IngestError::permanent(
                format!("region {}", region.id),
                "boundary has no bounding box",
            )
        })?;

        let query = SearchQuery {
            bbox,
            min_upload_date: cursor.min_upload_date,
            page: cursor.page,
            per_page: self.settings.page_size,
        };

        tracing::debug!(
            region_id = region.id,
            page = cursor.page,
            min_upload_date = %cursor.min_upload_date,
            "Searching"
        );

        let search_page = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(IngestError::Cancelled),
            result = self.search.search(&query) => result?,
        };

        let total = search_page.candidates.len();
        let mut accepted = Vec::new();
        let mut skipped = 0;
        let mut failed = 0;

        for candidate in &search_page.candidates {
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }

            match self.hydrate(region, candidate, cancel).await {
                Ok(photo) => accepted.push(photo),
                Err(IngestError::Cancelled) => return Err(IngestError::Cancelled),
                Err(e) if e.is_skip() => skipped += 1,
                Err(_) => failed += 1,
            }
        }

        let photos = self.assets.fetch(accepted, cancel).await?;

        tracing::info!(
            region_id = region.id,
            region_name = %region.name,
            skipped,
            failed,
            accepted = photos.len(),
            total,
            "Page processed"
        );

        let reported_page = if search_page.page == 0 {
            cursor.page
        } else {
            search_page.page
        };
        let last_date_upload = search_page
            .candidates
            .last()
            .map(|c| c.date_upload.as_str());

        let (next, transition) = advance_cursor(
            &cursor,
            reported_page,
            search_page.pages,
            last_date_upload,
            geoharvest_common::time::now(),
            &self.settings.policy,
        )?;

        match transition {
            CursorTransition::RewindToNow => tracing::info!(
                region_id = region.id,
                region_name = %region.name,
                "Completed round of checking"
            ),
            CursorTransition::AdvancePage => tracing::info!(
                region_id = region.id,
                page = next.page,
                "Advancing page"
            ),
            CursorTransition::AdvanceWindow => tracing::info!(
                region_id = region.id,
                min_upload_date = %next.min_upload_date,
                "Advancing min_upload_date"
            ),
        }

        Ok(StepOutcome {
            cursor: next,
            photos,
            transition,
            skipped,
            failed,
        })
    }

    /// Verify one candidate and fetch its detail
    ///
    /// Every error is a reason to drop the candidate; only `Cancelled` stops
    /// the step. Ineligible candidates come back as `Skip`.
    async fn hydrate(
        &self,
        region: &Region,
        candidate: &Candidate,
        cancel: &CancellationToken,
    ) -> IngestResult<Photo> {
        let (lng, lat) = candidate.lng_lat().map_err(|e| {
            tracing::warn!(photo_id = %candidate.id, error = %e, "Skip: malformed coordinates");
            IngestError::skip(&candidate.id, "malformed coordinates")
        })?;

        if !region.contains(lng, lat) {
            tracing::debug!(photo_id = %candidate.id, lng, lat, "Skip: not in region");
            return Err(IngestError::skip(&candidate.id, "not in region"));
        }

        let detail = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(IngestError::Cancelled),
            result = self.search.get_detail(&candidate.id) => result.map_err(|e| {
                tracing::error!(
                    photo_id = %candidate.id,
                    owner = %candidate.owner,
                    error = %e,
                    "Error processing photo"
                );
                e
            })?,
        };

        if self.settings.require_gps_exif {
            let has = |tag: &str| detail.exif.iter().any(|t| t.tag == tag);
            if !(has("GPSLongitude") && has("GPSLatitude")) {
                tracing::debug!(photo_id = %candidate.id, "Skip: no GPS lng/lat in EXIF");
                return Err(IngestError::skip(&candidate.id, "no GPS EXIF"));
            }
        }

        if let Err(e) = self.assets.select(&candidate.id, &detail.sizes) {
            tracing::debug!(photo_id = %candidate.id, error = %e, "Skip: no storable sizes");
            return Err(e);
        }

        Ok(Photo {
            id: candidate.id.clone(),
            region_id: region.id,
            info: detail.info,
            sizes: detail.sizes,
            exif: detail.exif,
            medium: Default::default(),
            large: Default::default(),
        })
    }
}
