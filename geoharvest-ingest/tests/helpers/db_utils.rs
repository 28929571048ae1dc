//! Database test utilities

use geoharvest_ingest::db::{init_database_pool, SqliteGateway};
use tempfile::TempDir;

/// Fresh database in a temporary directory
///
/// Keep the returned `TempDir` alive for the duration of the test.
pub async fn create_test_db() -> (TempDir, SqliteGateway) {
    let dir = TempDir::new().unwrap();
    let pool = init_database_pool(&dir.path().join("geoharvest.db"))
        .await
        .unwrap();
    (dir, SqliteGateway::new(pool))
}
