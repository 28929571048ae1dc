//! Persistence boundary used by the scheduler

use async_trait::async_trait;
use geoharvest_common::{Cursor, Feature, Photo, Region, Result};

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn list_regions(&self) -> Result<Vec<Region>>;

    async fn get_cursor(&self, region_id: i64) -> Result<Option<Cursor>>;

    /// Store a step's photos and its new cursor in one transaction
    ///
    /// Photos already present are left untouched. Returns the number of
    /// newly inserted photos.
    async fn save_step(&self, region_id: i64, cursor: &Cursor, photos: &[Photo]) -> Result<u64>;

    /// Stored photos that have a medium rendition but no feature row yet
    ///
    /// Ordered oldest first; `offset` skips that many pending photos.
    async fn get_photos_without_features(&self, limit: u32, offset: u32) -> Result<Vec<Photo>>;

    /// Append features in one transaction; returns the number inserted
    async fn save_features(&self, features: &[Feature]) -> Result<u64>;
}
