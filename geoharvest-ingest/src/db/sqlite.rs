//! SQLite implementation of [`PersistenceGateway`]

use super::gateway::PersistenceGateway;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geoharvest_common::{Cursor, Error, Feature, Photo, PhotoSize, Region, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

#[derive(Clone)]
pub struct SqliteGateway {
    pool: SqlitePool,
}

impl SqliteGateway {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace a region definition
    pub async fn upsert_region(&self, region: &Region) -> Result<()> {
        let boundary = serde_json::to_string(&region.boundary)?;
        sqlx::query(
            r#"
            INSERT INTO regions (id, name, boundary)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                boundary = excluded.boundary
            "#,
        )
        .bind(region.id)
        .bind(&region.name)
        .bind(boundary)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count_photos(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM photos")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn region_from_row(row: &SqliteRow) -> Result<Region> {
    let boundary: String = row.try_get("boundary")?;
    Ok(Region {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        boundary: serde_json::from_str(&boundary)?,
    })
}

fn photo_from_row(row: &SqliteRow) -> Result<Photo> {
    let info: String = row.try_get("info")?;
    let sizes: String = row.try_get("sizes")?;
    let exif: String = row.try_get("exif")?;

    Ok(Photo {
        id: row.try_get("id")?,
        region_id: row.try_get("region_id")?,
        info: serde_json::from_str(&info)?,
        sizes: serde_json::from_str(&sizes)?,
        exif: serde_json::from_str(&exif)?,
        medium: PhotoSize {
            width: row.try_get::<i64, _>("medium_width")? as u32,
            height: row.try_get::<i64, _>("medium_height")? as u32,
            source: row.try_get("medium_source")?,
        },
        large: PhotoSize {
            width: row.try_get::<i64, _>("large_width")? as u32,
            height: row.try_get::<i64, _>("large_height")? as u32,
            source: row.try_get("large_source")?,
        },
    })
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn list_regions(&self) -> Result<Vec<Region>> {
        let rows = sqlx::query("SELECT id, name, boundary FROM regions ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(region_from_row).collect()
    }

    async fn get_cursor(&self, region_id: i64) -> Result<Option<Cursor>> {
        let row = sqlx::query(
            "SELECT region_id, min_upload_date, page, last_check FROM cursors WHERE region_id = ?",
        )
        .bind(region_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<Cursor> {
            Ok(Cursor {
                region_id: row.try_get("region_id")?,
                min_upload_date: row.try_get::<DateTime<Utc>, _>("min_upload_date")?,
                page: row.try_get::<i64, _>("page")? as u32,
                last_check: row.try_get::<Option<DateTime<Utc>>, _>("last_check")?,
            }
            .normalized())
        })
        .transpose()
    }

    async fn save_step(&self, region_id: i64, cursor: &Cursor, photos: &[Photo]) -> Result<u64> {
        if cursor.region_id != region_id {
            return Err(Error::InvalidInput(format!(
                "cursor for region {} saved under region {}",
                cursor.region_id, region_id
            )));
        }
        if let Some(stray) = photos.iter().find(|p| p.region_id != region_id) {
            return Err(Error::InvalidInput(format!(
                "photo {} belongs to region {}, not {}",
                stray.id, stray.region_id, region_id
            )));
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for photo in photos {
            let result = sqlx::query(
                r#"
                INSERT INTO photos (
                    id, region_id, info, sizes, exif,
                    medium_width, medium_height, medium_source,
                    large_width, large_height, large_source
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(&photo.id)
            .bind(photo.region_id)
            .bind(serde_json::to_string(&photo.info)?)
            .bind(serde_json::to_string(&photo.sizes)?)
            .bind(serde_json::to_string(&photo.exif)?)
            .bind(photo.medium.width as i64)
            .bind(photo.medium.height as i64)
            .bind(&photo.medium.source)
            .bind(photo.large.width as i64)
            .bind(photo.large.height as i64)
            .bind(&photo.large.source)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        sqlx::query(
            r#"
            INSERT INTO cursors (region_id, min_upload_date, page, last_check, updated_at)
            VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(region_id) DO UPDATE SET
                min_upload_date = excluded.min_upload_date,
                page = excluded.page,
                last_check = excluded.last_check,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(region_id)
        .bind(cursor.min_upload_date)
        .bind(cursor.page as i64)
        .bind(cursor.last_check)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(region_id, inserted, offered = photos.len(), "Step saved");
        Ok(inserted)
    }

    async fn get_photos_without_features(&self, limit: u32, offset: u32) -> Result<Vec<Photo>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.region_id, p.info, p.sizes, p.exif,
                   p.medium_width, p.medium_height, p.medium_source,
                   p.large_width, p.large_height, p.large_source
            FROM photos p
            LEFT JOIN features f ON f.photo_id = p.id
            WHERE f.photo_id IS NULL AND p.medium_source != ''
            ORDER BY p.inserted_at, p.id
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(photo_from_row).collect()
    }

    async fn save_features(&self, features: &[Feature]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for feature in features {
            let result = sqlx::query(
                r#"
                INSERT INTO features (
                    photo_id, terrain_elevation_meters, gps_altitude_meters, no_gps_altitude,
                    validity_score, validity_model, nearest_road_meters
                )
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(photo_id) DO NOTHING
                "#,
            )
            .bind(&feature.photo_id)
            .bind(feature.terrain_elevation_meters)
            .bind(feature.gps_altitude_meters)
            .bind(feature.no_gps_altitude())
            .bind(feature.validity_score)
            .bind(&feature.validity_model)
            .bind(feature.nearest_road_meters as i64)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }
}
