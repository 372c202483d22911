//! Audit recording
//!
//! Append-only, field-level change log. Records are written after the
//! booking transaction commits: a failed audit write is reported as a
//! warning and never rolls back the committed mutation.

use hangar_common::db::{Booking, ChangeRecord};
use hangar_common::time;
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Result;

/// One pending change log entry, collected during a mutation and flushed
/// after commit
#[derive(Debug, Clone)]
pub struct PendingChange {
    pub booking_id: Uuid,
    pub field_name: String,
    pub old_value: String,
    pub new_value: String,
}

impl PendingChange {
    /// Entry for a freshly created occurrence
    pub fn created(booking: &Booking) -> PendingChange {
        PendingChange {
            booking_id: booking.id,
            field_name: "created".to_string(),
            old_value: String::new(),
            new_value: booking.start_time.to_rfc3339(),
        }
    }

    /// Entry for a physically deleted occurrence
    pub fn deleted(booking: &Booking) -> PendingChange {
        PendingChange {
            booking_id: booking.id,
            field_name: "deleted".to_string(),
            old_value: booking.start_time.to_rfc3339(),
            new_value: String::new(),
        }
    }
}

/// Field-level diff between a booking's previous and updated state.
/// The pilot is fixed after creation and therefore never diffed.
pub fn diff_fields(before: &Booking, after: &Booking) -> Vec<PendingChange> {
    let mut changes = Vec::new();
    let mut push = |field: &str, old: String, new: String| {
        if old != new {
            changes.push(PendingChange {
                booking_id: after.id,
                field_name: field.to_string(),
                old_value: old,
                new_value: new,
            });
        }
    };

    push(
        "area_id",
        before.area_id.to_string(),
        after.area_id.to_string(),
    );
    push("x_coord", before.x_coord.clone(), after.x_coord.clone());
    push("y_coord", before.y_coord.clone(), after.y_coord.clone());
    push("z_coord", before.z_coord.clone(), after.z_coord.clone());
    push(
        "start_time",
        before.start_time.to_rfc3339(),
        after.start_time.to_rfc3339(),
    );
    push(
        "duration_minutes",
        before.duration_minutes.to_string(),
        after.duration_minutes.to_string(),
    );
    push(
        "recurrence_kind",
        before.recurrence.kind_str().to_string(),
        after.recurrence.kind_str().to_string(),
    );
    push(
        "recurrence_pattern",
        before.recurrence.pattern_json().unwrap_or_default(),
        after.recurrence.pattern_json().unwrap_or_default(),
    );
    push(
        "recurrence_end",
        before
            .recurrence_end
            .map(|e| e.to_rfc3339())
            .unwrap_or_default(),
        after
            .recurrence_end
            .map(|e| e.to_rfc3339())
            .unwrap_or_default(),
    );

    changes
}

/// Append one change record
pub async fn record(
    pool: &Pool<Sqlite>,
    change: &PendingChange,
    actor: &str,
    origin: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO booking_changes
            (booking_id, actor, field_name, old_value, new_value, changed_at, origin)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(change.booking_id.to_string())
    .bind(actor)
    .bind(&change.field_name)
    .bind(&change.old_value)
    .bind(&change.new_value)
    .bind(time::now())
    .bind(origin)
    .execute(pool)
    .await?;
    Ok(())
}

/// Append a batch of change records; returns how many writes failed.
/// Failures are logged and swallowed: the booking mutation they describe
/// has already committed.
pub async fn record_batch(
    pool: &Pool<Sqlite>,
    changes: &[PendingChange],
    actor: &str,
    origin: Option<&str>,
) -> usize {
    let mut failures = 0;
    for change in changes {
        if let Err(e) = record(pool, change, actor, origin).await {
            warn!(
                "Audit write failed for booking {} field {}: {}",
                change.booking_id, change.field_name, e
            );
            failures += 1;
        }
    }
    if !changes.is_empty() {
        info!(
            "Recorded {} change(s) by {} ({} failed)",
            changes.len() - failures,
            actor,
            failures
        );
    }
    failures
}

/// Change history for one booking, newest first
pub async fn list_changes(
    pool: &Pool<Sqlite>,
    booking_id: Uuid,
    limit: i64,
) -> Result<Vec<ChangeRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, booking_id, actor, field_name, old_value, new_value, changed_at, origin
        FROM booking_changes
        WHERE booking_id = ?
        ORDER BY changed_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(booking_id.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|r| ChangeRecord::from_row(r).map_err(Into::into))
        .collect()
}
