//! Booking store queries
//!
//! All mutation queries take a plain connection so the series manager can
//! run them inside one transaction; reads used by the API surface go
//! through the pool.

use chrono::{DateTime, Utc};
use hangar_common::db::Booking;
use sqlx::{Pool, Sqlite, SqliteConnection};
use uuid::Uuid;

use crate::error::Result;

/// Filters for the list query surface; all optional, combined with AND
#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub pilot_id: Option<Uuid>,
    pub area_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

const BOOKING_COLUMNS: &str = "id, pilot_id, area_id, x_coord, y_coord, z_coord, \
     start_time, duration_minutes, recurrence_kind, recurrence_pattern, recurrence_end, \
     parent_id, created_by, created_at, updated_at";

/// Insert one occurrence
pub async fn insert(conn: &mut SqliteConnection, booking: &Booking) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO bookings
            (id, pilot_id, area_id, x_coord, y_coord, z_coord,
             start_time, duration_minutes, recurrence_kind, recurrence_pattern,
             recurrence_end, parent_id, created_by, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(booking.id.to_string())
    .bind(booking.pilot_id.to_string())
    .bind(booking.area_id.to_string())
    .bind(&booking.x_coord)
    .bind(&booking.y_coord)
    .bind(&booking.z_coord)
    .bind(booking.start_time)
    .bind(booking.duration_minutes)
    .bind(booking.recurrence.kind_str())
    .bind(booking.recurrence.pattern_json())
    .bind(booking.recurrence_end)
    .bind(booking.parent_id.map(|id| id.to_string()))
    .bind(&booking.created_by)
    .bind(booking.created_at)
    .bind(booking.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Rewrite an occurrence's mutable fields (everything except id, pilot and
/// creation metadata)
pub async fn update(conn: &mut SqliteConnection, booking: &Booking) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE bookings SET
            area_id = ?, x_coord = ?, y_coord = ?, z_coord = ?,
            start_time = ?, duration_minutes = ?,
            recurrence_kind = ?, recurrence_pattern = ?, recurrence_end = ?,
            parent_id = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(booking.area_id.to_string())
    .bind(&booking.x_coord)
    .bind(&booking.y_coord)
    .bind(&booking.z_coord)
    .bind(booking.start_time)
    .bind(booking.duration_minutes)
    .bind(booking.recurrence.kind_str())
    .bind(booking.recurrence.pattern_json())
    .bind(booking.recurrence_end)
    .bind(booking.parent_id.map(|id| id.to_string()))
    .bind(booking.updated_at)
    .bind(booking.id.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Re-point a child occurrence at a new series root
pub async fn set_parent(
    conn: &mut SqliteConnection,
    id: Uuid,
    parent_id: Option<Uuid>,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE bookings SET parent_id = ?, updated_at = ? WHERE id = ?")
        .bind(parent_id.map(|p| p.to_string()))
        .bind(updated_at)
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Truncate an occurrence's recurrence end boundary (series split/truncate)
pub async fn set_recurrence_end(
    conn: &mut SqliteConnection,
    id: Uuid,
    recurrence_end: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE bookings SET recurrence_end = ?, updated_at = ? WHERE id = ?")
        .bind(recurrence_end)
        .bind(updated_at)
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Physically delete one occurrence; returns the number of rows removed
pub async fn delete(conn: &mut SqliteConnection, id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM bookings WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Fetch one occurrence by id
pub async fn get(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Booking>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM bookings WHERE id = ?",
        BOOKING_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|r| Booking::from_row(&r).map_err(Into::into))
        .transpose()
}

/// All members of a series (root first by start time): the root row itself
/// plus every row linking to it
pub async fn series_members(conn: &mut SqliteConnection, root_id: Uuid) -> Result<Vec<Booking>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM bookings WHERE id = ? OR parent_id = ? ORDER BY start_time",
        BOOKING_COLUMNS
    ))
    .bind(root_id.to_string())
    .bind(root_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|r| Booking::from_row(r).map_err(Into::into))
        .collect()
}

/// List occurrences by filter, ordered by start time
pub async fn list(pool: &Pool<Sqlite>, filter: &BookingFilter, limit: i64) -> Result<Vec<Booking>> {
    let mut sql = format!("SELECT {} FROM bookings WHERE 1=1", BOOKING_COLUMNS);
    if filter.pilot_id.is_some() {
        sql.push_str(" AND pilot_id = ?");
    }
    if filter.area_id.is_some() {
        sql.push_str(" AND area_id = ?");
    }
    if filter.from.is_some() {
        sql.push_str(" AND start_time >= ?");
    }
    if filter.until.is_some() {
        sql.push_str(" AND start_time < ?");
    }
    sql.push_str(" ORDER BY start_time LIMIT ?");

    let mut query = sqlx::query(&sql);
    if let Some(pilot_id) = filter.pilot_id {
        query = query.bind(pilot_id.to_string());
    }
    if let Some(area_id) = filter.area_id {
        query = query.bind(area_id.to_string());
    }
    if let Some(from) = filter.from {
        query = query.bind(from);
    }
    if let Some(until) = filter.until {
        query = query.bind(until);
    }
    let rows = query.bind(limit).fetch_all(pool).await?;

    rows.iter()
        .map(|r| Booking::from_row(r).map_err(Into::into))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use hangar_common::db::{initialize_database, Recurrence};
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

    fn sample_booking(start_h: u32, parent: Option<Uuid>) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            pilot_id: Uuid::new_v4(),
            area_id: Uuid::new_v4(),
            x_coord: "Base-1".to_string(),
            y_coord: "Floor-2".to_string(),
            z_coord: "Seat-3".to_string(),
            start_time: Utc.with_ymd_and_hms(2025, 1, 6, start_h, 0, 0).unwrap(),
            duration_minutes: 120,
            recurrence: Recurrence::None,
            recurrence_end: None,
            parent_id: parent,
            created_by: "tester".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_roundtrip() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let booking = sample_booking(9, None);

        insert(&mut conn, &booking).await.unwrap();
        let loaded = get(&mut conn, booking.id).await.unwrap().unwrap();
        assert_eq!(loaded, booking);
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        assert!(get(&mut conn, Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_series_members_ordered_by_start() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let root = sample_booking(9, None);
        insert(&mut conn, &root).await.unwrap();
        let mut late = sample_booking(15, Some(root.id));
        let mut early = sample_booking(11, Some(root.id));
        late.id = Uuid::new_v4();
        early.id = Uuid::new_v4();
        insert(&mut conn, &late).await.unwrap();
        insert(&mut conn, &early).await.unwrap();

        let members = series_members(&mut conn, root.id).await.unwrap();
        assert_eq!(members.len(), 3);
        assert_eq!(members[0].id, root.id);
        assert_eq!(members[1].id, early.id);
        assert_eq!(members[2].id, late.id);
    }

    #[tokio::test]
    async fn test_list_filters_by_pilot_and_window() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let a = sample_booking(9, None);
        let b = sample_booking(14, None);
        insert(&mut conn, &a).await.unwrap();
        insert(&mut conn, &b).await.unwrap();
        drop(conn);

        let filter = BookingFilter {
            pilot_id: Some(a.pilot_id),
            ..Default::default()
        };
        let found = list(&pool, &filter, 100).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a.id);

        let filter = BookingFilter {
            from: Some(Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap()),
            until: Some(Utc.with_ymd_and_hms(2025, 1, 7, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        let found = list(&pool, &filter, 100).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, b.id);
    }

    #[tokio::test]
    async fn test_delete_removes_row() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let booking = sample_booking(9, None);
        insert(&mut conn, &booking).await.unwrap();

        assert_eq!(delete(&mut conn, booking.id).await.unwrap(), 1);
        assert!(get(&mut conn, booking.id).await.unwrap().is_none());
        assert_eq!(delete(&mut conn, booking.id).await.unwrap(), 0);
    }
}
