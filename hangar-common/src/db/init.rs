//! Database initialization
//!
//! Opens the SQLite pool and creates the booking store schema. All steps
//! are idempotent so every service start runs the full sequence.

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::info;

/// Open (creating if missing) the database at the given path
pub async fn open_pool(db_path: &Path) -> Result<Pool<Sqlite>> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create all required tables and indexes
pub async fn initialize_database(pool: &Pool<Sqlite>) -> Result<()> {
    info!("Initializing database structures");

    // Pilot directory (seeded by the roster service; read-only here)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pilots (
            id TEXT PRIMARY KEY,
            nickname TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Resource catalog (seeded by the catalog service; read-only here)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS areas (
            id TEXT PRIMARY KEY,
            x_coord TEXT NOT NULL,
            y_coord TEXT NOT NULL,
            z_coord TEXT NOT NULL,
            available INTEGER NOT NULL DEFAULT 1,
            UNIQUE (x_coord, y_coord, z_coord)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Booking occurrences
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bookings (
            id TEXT PRIMARY KEY,
            pilot_id TEXT NOT NULL,
            area_id TEXT NOT NULL,
            x_coord TEXT NOT NULL,
            y_coord TEXT NOT NULL,
            z_coord TEXT NOT NULL,
            start_time TEXT NOT NULL,
            duration_minutes INTEGER NOT NULL,
            recurrence_kind TEXT NOT NULL DEFAULT 'none',
            recurrence_pattern TEXT,
            recurrence_end TEXT,
            parent_id TEXT,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes backing the conflict-check coarse window and series lookups
    for index_sql in [
        "CREATE INDEX IF NOT EXISTS idx_bookings_start ON bookings (start_time)",
        "CREATE INDEX IF NOT EXISTS idx_bookings_area_start ON bookings (area_id, start_time)",
        "CREATE INDEX IF NOT EXISTS idx_bookings_pilot_start ON bookings (pilot_id, start_time)",
        "CREATE INDEX IF NOT EXISTS idx_bookings_parent ON bookings (parent_id)",
    ] {
        sqlx::query(index_sql).execute(pool).await?;
    }

    // Append-only change log
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS booking_changes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            booking_id TEXT NOT NULL,
            actor TEXT NOT NULL,
            field_name TEXT NOT NULL,
            old_value TEXT NOT NULL,
            new_value TEXT NOT NULL,
            changed_at TEXT NOT NULL,
            origin TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_changes_booking ON booking_changes (booking_id, changed_at)",
    )
    .execute(pool)
    .await?;

    info!("Database initialization complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> Pool<Sqlite> {
        SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_initialize_creates_tables() {
        let pool = memory_pool().await;
        initialize_database(&pool).await.unwrap();

        for table in ["pilots", "areas", "bookings", "booking_changes"] {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?)",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert!(exists, "table {} missing", table);
        }
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let pool = memory_pool().await;
        initialize_database(&pool).await.unwrap();
        initialize_database(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='bookings'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_open_pool_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("hangar.db");
        let pool = open_pool(&path).await.unwrap();
        initialize_database(&pool).await.unwrap();
        assert!(path.exists());
    }
}
