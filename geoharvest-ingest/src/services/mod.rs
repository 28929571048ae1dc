//! Core ingest services

pub mod asset_fetcher;
pub mod feature_enricher;
pub mod gps_altitude;
pub mod region_crawler;
pub mod road_proximity;
pub mod scheduler;

pub use asset_fetcher::{AssetFetcher, AssetFetcherSettings};
pub use feature_enricher::FeatureEnricher;
pub use region_crawler::{
    advance_cursor, CrawlerSettings, CursorPolicy, CursorTransition, RegionCrawler, StepOutcome,
};
pub use road_proximity::{nearest_road_meters, RoadProximity};
pub use scheduler::{CycleOutcome, Scheduler, SchedulerSettings};
