//! Scheduler
//!
//! Drives the two independent cycles of the daemon:
//! - **Crawl cycle:** pick one due region at random, run one crawl step,
//!   persist the photos and cursor together.
//! - **Feature cycle:** load a batch of photos without features, enrich
//!   them, persist the features.
//!
//! A failed cycle is logged and recorded as the health `last_error`; the
//! loop then backs off and tries again. Nothing from a failed cycle is
//! persisted.
//!
//! The feature cycle reads a window of the pending queue. An aborted batch
//! halves the next window. Photos that failed inside a successful batch
//! are still pending ahead of the rest, so the window skips past them
//! until the queue is exhausted and then starts over from the oldest.

use crate::db::PersistenceGateway;
use crate::error::{IngestError, IngestResult};
use crate::services::feature_enricher::FeatureEnricher;
use crate::services::region_crawler::{CursorTransition, RegionCrawler};
use crate::AppState;
use chrono::{DateTime, Utc};
use geoharvest_common::config::IngestConfig;
use geoharvest_common::{Cursor, Region};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Pause after a failed cycle
const ERROR_BACKOFF: Duration = Duration::from_secs(30);

/// Upper bound of the random extra sleep when no region is due
const IDLE_JITTER_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub recheck_interval: chrono::Duration,
    pub crawl_idle: Duration,
    pub feature_idle: Duration,
    pub feature_batch_size: u32,
    pub only_region: Option<i64>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            recheck_interval: chrono::Duration::days(7),
            crawl_idle: Duration::from_secs(60),
            feature_idle: Duration::from_secs(300),
            feature_batch_size: 100,
            only_region: None,
        }
    }
}

impl From<&IngestConfig> for SchedulerSettings {
    fn from(config: &IngestConfig) -> Self {
        Self {
            recheck_interval: chrono::Duration::hours(config.crawler.recheck_interval_hours as i64),
            crawl_idle: Duration::from_secs(config.crawler.idle_sleep_secs),
            feature_idle: Duration::from_secs(config.enricher.idle_sleep_secs),
            feature_batch_size: config.enricher.batch_size,
            only_region: config.crawler.only_region,
        }
    }
}

/// What one cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Crawled one page of a region
    Crawled {
        region_id: i64,
        inserted: u64,
        transition: CursorTransition,
    },
    /// Saved features for a batch
    Enriched { saved: u64 },
    /// Nothing to do
    Idle,
}

/// Never checked, or last checked at least `recheck` ago
pub fn is_due(cursor: Option<&Cursor>, now: DateTime<Utc>, recheck: chrono::Duration) -> bool {
    match cursor.and_then(|c| c.last_check) {
        None => true,
        Some(last_check) => last_check + recheck <= now,
    }
}

/// Regions eligible for a crawl step, in input order
pub fn due_regions<'a>(
    regions: &'a [Region],
    cursors: &HashMap<i64, Cursor>,
    now: DateTime<Utc>,
    recheck: chrono::Duration,
    only_region: Option<i64>,
) -> Vec<&'a Region> {
    regions
        .iter()
        .filter(|r| only_region.map_or(true, |id| r.id == id))
        .filter(|r| is_due(cursors.get(&r.id), now, recheck))
        .collect()
}

/// Slice of the pending queue the next feature batch reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FeatureWindow {
    limit: u32,
    offset: u32,
}

pub struct Scheduler {
    gateway: Arc<dyn PersistenceGateway>,
    crawler: RegionCrawler,
    enricher: FeatureEnricher,
    settings: SchedulerSettings,
    state: AppState,
    feature_window: Mutex<FeatureWindow>,
}

impl Scheduler {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        crawler: RegionCrawler,
        enricher: FeatureEnricher,
        settings: SchedulerSettings,
        state: AppState,
    ) -> Self {
        let feature_window = Mutex::new(FeatureWindow {
            limit: settings.feature_batch_size.max(1),
            offset: 0,
        });
        Self {
            gateway,
            crawler,
            enricher,
            settings,
            state,
            feature_window,
        }
    }

    /// Run one crawl step for a randomly chosen due region
    pub async fn crawl_once(&self, cancel: &CancellationToken) -> IngestResult<CycleOutcome> {
        let regions = self.gateway.list_regions().await?;

        let mut cursors = HashMap::new();
        for region in &regions {
            if let Some(cursor) = self.gateway.get_cursor(region.id).await? {
                cursors.insert(region.id, cursor);
            }
        }

        let now = geoharvest_common::time::now();
        let region = {
            let due = due_regions(
                &regions,
                &cursors,
                now,
                self.settings.recheck_interval,
                self.settings.only_region,
            );
            tracing::debug!(due = due.len(), total = regions.len(), "Due regions");
            due.choose(&mut rand::thread_rng()).map(|r| (*r).clone())
        };

        let Some(region) = region else {
            return Ok(CycleOutcome::Idle);
        };

        tracing::info!(region_id = region.id, region_name = %region.name, "Crawling region");

        let cursor = cursors.remove(&region.id);
        let outcome = self.crawler.step(&region, cursor, cancel).await?;

        let inserted = self
            .gateway
            .save_step(region.id, &outcome.cursor, &outcome.photos)
            .await?;

        let counters = &self.state.counters;
        counters.steps_completed.fetch_add(1, Ordering::Relaxed);
        counters.photos_accepted.fetch_add(inserted, Ordering::Relaxed);

        tracing::info!(
            region_id = region.id,
            inserted,
            accepted = outcome.photos.len(),
            skipped = outcome.skipped,
            failed = outcome.failed,
            transition = ?outcome.transition,
            "Step saved"
        );

        Ok(CycleOutcome::Crawled {
            region_id: region.id,
            inserted,
            transition: outcome.transition,
        })
    }

    /// Enrich one batch of photos without features
    pub async fn enrich_once(&self, cancel: &CancellationToken) -> IngestResult<CycleOutcome> {
        let window = *self.feature_window.lock().await;
        let photos = self
            .gateway
            .get_photos_without_features(window.limit, window.offset)
            .await?;
        if photos.is_empty() {
            if window.offset > 0 {
                tracing::debug!(
                    skipped = window.offset,
                    "Pending queue exhausted, retrying failed photos next cycle"
                );
                self.feature_window.lock().await.offset = 0;
            }
            return Ok(CycleOutcome::Idle);
        }

        let fetched = photos.len() as u32;
        tracing::info!(
            photos = fetched,
            offset = window.offset,
            "Starting feature batch"
        );

        let features = match self.enricher.compute(photos, cancel).await {
            Ok(features) => features,
            Err(e @ IngestError::BatchAborted { .. }) => {
                let limit = (window.limit / 2).max(1);
                self.feature_window.lock().await.limit = limit;
                tracing::warn!(next_limit = limit, "Feature batch aborted, shrinking next batch");
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        let saved = self.gateway.save_features(&features).await?;

        // Failed photos stay pending ahead of everything not yet tried
        let still_pending = fetched.saturating_sub(features.len() as u32);
        *self.feature_window.lock().await = FeatureWindow {
            limit: self.settings.feature_batch_size.max(1),
            offset: window.offset + still_pending,
        };

        self.state
            .counters
            .features_saved
            .fetch_add(saved, Ordering::Relaxed);

        tracing::info!(saved, "Feature batch saved");
        Ok(CycleOutcome::Enriched { saved })
    }

    /// Crawl until cancelled
    pub async fn run_crawl_loop(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!("Crawl loop started");
        loop {
            let pause = match self.crawl_once(&cancel).await {
                Ok(CycleOutcome::Idle) => {
                    let jitter = rand::thread_rng().gen_range(0..=IDLE_JITTER_SECS);
                    let pause = self.settings.crawl_idle + Duration::from_secs(jitter);
                    tracing::info!(sleep_secs = pause.as_secs(), "No region due");
                    pause
                }
                Ok(_) => Duration::ZERO,
                Err(IngestError::Cancelled) => break,
                Err(e) => {
                    self.record_failure("crawl step", &e).await;
                    ERROR_BACKOFF
                }
            };

            if !sleep_or_cancel(pause, &cancel).await {
                break;
            }
        }
        tracing::info!("Crawl loop stopped");
    }

    /// Enrich until cancelled
    pub async fn run_feature_loop(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!("Feature loop started");
        loop {
            let pause = match self.enrich_once(&cancel).await {
                Ok(CycleOutcome::Idle) => {
                    tracing::debug!("No photos awaiting features");
                    self.settings.feature_idle
                }
                Ok(_) => Duration::ZERO,
                Err(IngestError::Cancelled) => break,
                Err(e) => {
                    self.record_failure("feature batch", &e).await;
                    ERROR_BACKOFF
                }
            };

            if !sleep_or_cancel(pause, &cancel).await {
                break;
            }
        }
        tracing::info!("Feature loop stopped");
    }

    async fn record_failure(&self, cycle: &str, err: &IngestError) {
        tracing::error!(cycle, error = %err, "Cycle failed, will retry");
        self.state.record_error(format!("{}: {}", cycle, err)).await;
    }
}

/// Returns false if cancelled before the pause elapsed
async fn sleep_or_cancel(pause: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    if pause.is_zero() {
        return true;
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(pause) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use geo::{polygon, MultiPolygon};

    fn region(id: i64) -> Region {
        Region::new(
            id,
            format!("r{}", id),
            MultiPolygon(vec![polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)]]),
        )
    }

    fn checked_at(region_id: i64, at: DateTime<Utc>) -> Cursor {
        Cursor {
            last_check: Some(at),
            ..Cursor::initial(region_id)
        }
    }

    #[test]
    fn test_is_due() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let week = chrono::Duration::days(7);

        assert!(is_due(None, now, week));
        assert!(is_due(Some(&Cursor::initial(1)), now, week));
        assert!(!is_due(Some(&checked_at(1, now - chrono::Duration::days(6))), now, week));
        assert!(is_due(Some(&checked_at(1, now - chrono::Duration::days(7))), now, week));
    }

    #[test]
    fn test_due_regions_honours_last_check_and_only_region() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let week = chrono::Duration::days(7);
        let regions = vec![region(1), region(2), region(3)];
        let cursors: HashMap<i64, Cursor> =
            [(2, checked_at(2, now - chrono::Duration::hours(1)))].into_iter().collect();

        let ids: Vec<i64> = due_regions(&regions, &cursors, now, week, None)
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![1, 3]);

        let ids: Vec<i64> = due_regions(&regions, &cursors, now, week, Some(3))
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![3]);

        assert!(due_regions(&regions, &cursors, now, week, Some(2)).is_empty());
    }

    #[tokio::test]
    async fn test_sleep_or_cancel() {
        let cancel = CancellationToken::new();
        assert!(sleep_or_cancel(Duration::ZERO, &cancel).await);
        cancel.cancel();
        assert!(!sleep_or_cancel(Duration::from_secs(60), &cancel).await);
    }
}
