//! Resource catalog and pilot directory lookups
//!
//! Both collections are owned by other services; the scheduler only reads
//! them to validate candidates and to snapshot coordinates.

use hangar_common::db::{Area, Pilot};
use sqlx::{Pool, Sqlite, SqliteConnection};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Look up a pilot by id; missing pilots are a terminal error
pub async fn get_pilot(conn: &mut SqliteConnection, id: Uuid) -> Result<Pilot> {
    let row = sqlx::query("SELECT id, nickname FROM pilots WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("pilot {}", id)))?;
    Ok(Pilot::from_row(&row)?)
}

/// Look up an area slot by id; missing areas are a terminal error
pub async fn get_area(conn: &mut SqliteConnection, id: Uuid) -> Result<Area> {
    let row = sqlx::query("SELECT id, x_coord, y_coord, z_coord, available FROM areas WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("area {}", id)))?;
    Ok(Area::from_row(&row)?)
}

/// All pilots, for collaborator pick-lists
pub async fn list_pilots(pool: &Pool<Sqlite>) -> Result<Vec<Pilot>> {
    let rows = sqlx::query("SELECT id, nickname FROM pilots ORDER BY nickname")
        .fetch_all(pool)
        .await?;
    rows.iter()
        .map(|r| Pilot::from_row(r).map_err(Into::into))
        .collect()
}

/// All available area slots, ordered by coordinate
pub async fn list_areas(pool: &Pool<Sqlite>) -> Result<Vec<Area>> {
    let rows = sqlx::query(
        "SELECT id, x_coord, y_coord, z_coord, available FROM areas \
         WHERE available = 1 ORDER BY x_coord, y_coord, z_coord",
    )
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|r| Area::from_row(r).map_err(Into::into))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use hangar_common::db::initialize_database;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> Pool<Sqlite> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        initialize_database(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_get_pilot_found_and_missing() {
        let pool = test_pool().await;
        let id = seed_pilot(&pool, "Asuka").await;
        let mut conn = pool.acquire().await.unwrap();

        let pilot = get_pilot(&mut conn, id).await.unwrap();
        assert_eq!(pilot.nickname, "Asuka");

        let missing = get_pilot(&mut conn, Uuid::new_v4()).await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_areas_skips_unavailable() {
        let pool = test_pool().await;
        seed_area(&pool, "Base-1", "Floor-1", "Seat-1", true).await;
        seed_area(&pool, "Base-1", "Floor-1", "Seat-2", false).await;

        let areas = list_areas(&pool).await.unwrap();
        assert_eq!(areas.len(), 1);
        assert_eq!(areas[0].z_coord, "Seat-1");
    }
}
