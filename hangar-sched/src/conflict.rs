//! Conflict detection
//!
//! Finds existing bookings that overlap a set of candidate occurrences,
//! separately per area slot and per pilot. Intervals are half-open
//! `[start, start + duration)`: touching endpoints do not conflict.
//!
//! The store query narrows by a coarse time window (earliest candidate
//! start minus the maximum duration, through the latest candidate end)
//! over the indexed start column; exact overlap comparison happens here.
//! The detector reports every collision and resolves nothing.

use chrono::{DateTime, Duration, Utc};
use hangar_common::db::Booking;
use hangar_common::time::MAX_DURATION_MINUTES;
use serde::Serialize;
use sqlx::SqliteConnection;
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::Result;

/// One candidate occurrence to be checked
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
}

impl Candidate {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(self.duration_minutes)
    }
}

/// One existing booking colliding with one candidate occurrence
#[derive(Debug, Clone, Serialize)]
pub struct ConflictHit {
    /// Candidate start that triggered the collision
    pub candidate_start: DateTime<Utc>,
    /// The existing booking's identity and interval
    pub booking_id: Uuid,
    pub pilot_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub x_coord: String,
    pub y_coord: String,
    pub z_coord: String,
}

/// Full structured report: the two conflict classes are independent and
/// a single booking can appear in both
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConflictReport {
    pub area_conflicts: Vec<ConflictHit>,
    pub pilot_conflicts: Vec<ConflictHit>,
}

impl ConflictReport {
    pub fn is_clean(&self) -> bool {
        self.area_conflicts.is_empty() && self.pilot_conflicts.is_empty()
    }

    pub fn total(&self) -> usize {
        self.area_conflicts.len() + self.pilot_conflicts.len()
    }
}

/// Check candidates against existing bookings on the given area and pilot.
///
/// `exclude` holds ids of occurrences about to be replaced by the calling
/// edit, so an edit never collides with its own rows.
pub async fn check(
    conn: &mut SqliteConnection,
    candidates: &[Candidate],
    pilot_id: Uuid,
    area_id: Uuid,
    exclude: &HashSet<Uuid>,
) -> Result<ConflictReport> {
    let mut report = ConflictReport::default();

    // Coarse window: nothing starting before this can still overlap, and
    // nothing starting after the last candidate ends can overlap either.
    let bounds = candidates.iter().map(|c| c.start_time).min().zip(
        candidates.iter().map(|c| c.end_time()).max(),
    );
    let Some((earliest_start, latest)) = bounds else {
        return Ok(report);
    };
    let earliest = earliest_start - Duration::minutes(MAX_DURATION_MINUTES);

    let rows = sqlx::query(
        r#"
        SELECT id, pilot_id, area_id, x_coord, y_coord, z_coord,
               start_time, duration_minutes, recurrence_kind, recurrence_pattern,
               recurrence_end, parent_id, created_by, created_at, updated_at
        FROM bookings
        WHERE start_time > ? AND start_time < ?
          AND (area_id = ? OR pilot_id = ?)
        "#,
    )
    .bind(earliest)
    .bind(latest)
    .bind(area_id.to_string())
    .bind(pilot_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    let existing: Vec<Booking> = rows
        .iter()
        .map(|r| Booking::from_row(r).map_err(Into::into))
        .collect::<Result<_>>()?;

    for candidate in candidates {
        for other in &existing {
            if exclude.contains(&other.id) {
                continue;
            }
            // Half-open overlap
            if other.start_time < candidate.end_time() && other.end_time() > candidate.start_time {
                let hit = ConflictHit {
                    candidate_start: candidate.start_time,
                    booking_id: other.id,
                    pilot_id: other.pilot_id,
                    start_time: other.start_time,
                    duration_minutes: other.duration_minutes,
                    x_coord: other.x_coord.clone(),
                    y_coord: other.y_coord.clone(),
                    z_coord: other.z_coord.clone(),
                };
                if other.area_id == area_id {
                    report.area_conflicts.push(hit.clone());
                }
                if other.pilot_id == pilot_id {
                    report.pilot_conflicts.push(hit);
                }
            }
        }
    }

    Ok(report)
}
