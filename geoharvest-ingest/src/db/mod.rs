//! Database layer
//!
//! SQLite through sqlx. Tables are created on first open and every
//! statement is idempotent, so opening an existing database is safe.

pub mod gateway;
pub mod sqlite;

pub use gateway::PersistenceGateway;
pub use sqlite::SqliteGateway;

use geoharvest_common::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (creating if needed) the database at `db_path`
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_tables(&pool).await?;

    Ok(pool)
}

async fn create_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS regions (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            boundary TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cursors (
            region_id INTEGER PRIMARY KEY REFERENCES regions(id) ON DELETE CASCADE,
            min_upload_date TEXT NOT NULL,
            page INTEGER NOT NULL CHECK (page >= 0),
            last_check TEXT,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS photos (
            id TEXT PRIMARY KEY,
            region_id INTEGER NOT NULL REFERENCES regions(id) ON DELETE CASCADE,
            info TEXT NOT NULL,
            sizes TEXT NOT NULL,
            exif TEXT NOT NULL,
            medium_width INTEGER NOT NULL DEFAULT 0,
            medium_height INTEGER NOT NULL DEFAULT 0,
            medium_source TEXT NOT NULL DEFAULT '',
            large_width INTEGER NOT NULL DEFAULT 0,
            large_height INTEGER NOT NULL DEFAULT 0,
            large_source TEXT NOT NULL DEFAULT '',
            inserted_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_photos_region ON photos(region_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS features (
            photo_id TEXT PRIMARY KEY REFERENCES photos(id) ON DELETE CASCADE,
            terrain_elevation_meters INTEGER NOT NULL,
            gps_altitude_meters INTEGER,
            no_gps_altitude INTEGER NOT NULL,
            validity_score REAL NOT NULL,
            validity_model TEXT NOT NULL,
            nearest_road_meters INTEGER NOT NULL,
            computed_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("geoharvest.db");

        let pool = init_database_pool(&path).await.unwrap();
        pool.close().await;
        assert!(path.exists());

        let pool = init_database_pool(&path).await.unwrap();
        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert_eq!(names, vec!["cursors", "features", "photos", "regions"]);
    }
}
