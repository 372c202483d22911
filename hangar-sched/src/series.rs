//! Series management
//!
//! The [`Scheduler`] translates user-facing intents (create with
//! recurrence, scoped edit, scoped delete) into booking mutations while
//! preserving the series invariants: every live member of a series carries
//! the series descriptor, children link to exactly one root, and
//! overlapping intervals never share an area or a pilot.
//!
//! Every mutation is check-then-commit inside one transaction, and all
//! writers serialize on the scheduler's mutex so a passed conflict check
//! cannot be invalidated between check and commit. Audit records are
//! flushed after commit; their failure never unwinds the mutation.

use chrono::{DateTime, Duration, Utc};
use hangar_common::db::{Area, Booking, Recurrence};
use hangar_common::time::{self, STEP_MINUTES};
use sqlx::{Pool, Sqlite, SqliteConnection};
use std::collections::HashSet;
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::audit::{self, PendingChange};
use crate::catalog;
use crate::conflict::{self, Candidate, ConflictReport};
use crate::db::bookings;
use crate::error::{Error, Result};
use crate::recurrence;

/// Which part of a series a mutation applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditScope {
    /// Only the targeted occurrence
    ThisOnly,
    /// The targeted occurrence and every later one in its series
    FutureAll,
}

impl FromStr for EditScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<EditScope> {
        match s {
            "this_only" => Ok(EditScope::ThisOnly),
            "future_all" => Ok(EditScope::FutureAll),
            other => Err(Error::Validation(format!("unknown edit scope: {}", other))),
        }
    }
}

/// Intent to create a single or recurring booking
#[derive(Debug, Clone)]
pub struct CreateBooking {
    pub pilot_id: Uuid,
    pub area_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub recurrence: Recurrence,
    pub recurrence_end: Option<DateTime<Utc>>,
}

/// Intent to edit an occurrence (or its future tail). Absent fields keep
/// their current value; the pilot is fixed after creation.
#[derive(Debug, Clone, Default)]
pub struct EditBooking {
    pub area_id: Option<Uuid>,
    pub start_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub recurrence: Option<Recurrence>,
    pub recurrence_end: Option<DateTime<Utc>>,
}

/// Committed result of a create or edit
#[derive(Debug)]
pub struct MutationOutcome {
    /// All occurrences written by this mutation, in start order
    pub bookings: Vec<Booking>,
    /// Number of audit records that failed to write (already logged)
    pub audit_failures: usize,
}

/// Committed result of a delete
#[derive(Debug)]
pub struct DeleteOutcome {
    pub deleted: u64,
    pub audit_failures: usize,
}

/// Conflict preview for a prospective create or edit
#[derive(Debug)]
pub struct Preview {
    pub planned_starts: Vec<DateTime<Utc>>,
    pub report: ConflictReport,
}

/// The scheduling engine. Owns the booking store pool and the write lock
/// that serializes conflict-check + commit.
pub struct Scheduler {
    pool: Pool<Sqlite>,
    write_lock: Mutex<()>,
}

impl Scheduler {
    pub fn new(pool: Pool<Sqlite>) -> Scheduler {
        Scheduler {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    /// Read access for the query surface
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Create a booking, expanding its recurrence into a linked series.
    /// All-or-nothing: any conflict aborts with zero rows written.
    pub async fn create(
        &self,
        req: CreateBooking,
        actor: &str,
        origin: Option<&str>,
    ) -> Result<MutationOutcome> {
        validate_slot(req.start_time, req.duration_minutes)?;
        let expansion = recurrence::expand(req.start_time, &req.recurrence, req.recurrence_end)?;

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        catalog::get_pilot(&mut tx, req.pilot_id).await?;
        let area = resolve_area(&mut tx, req.area_id).await?;

        let candidates = as_candidates(&expansion.starts, req.duration_minutes);
        let report = conflict::check(
            &mut tx,
            &candidates,
            req.pilot_id,
            req.area_id,
            &HashSet::new(),
        )
        .await?;
        if !report.is_clean() {
            return Err(Error::Conflict(report));
        }

        let now = time::now();
        let root_id = Uuid::new_v4();
        let mut committed = Vec::with_capacity(expansion.starts.len());
        for (index, start) in expansion.starts.iter().enumerate() {
            let booking = Booking {
                id: if index == 0 { root_id } else { Uuid::new_v4() },
                pilot_id: req.pilot_id,
                area_id: area.id,
                x_coord: area.x_coord.clone(),
                y_coord: area.y_coord.clone(),
                z_coord: area.z_coord.clone(),
                start_time: *start,
                duration_minutes: req.duration_minutes,
                recurrence: expansion.recurrence.clone(),
                recurrence_end: expansion.recurrence_end,
                parent_id: (index > 0).then_some(root_id),
                created_by: actor.to_string(),
                created_at: now,
                updated_at: now,
            };
            bookings::insert(&mut tx, &booking).await?;
            committed.push(booking);
        }
        tx.commit().await?;

        info!(
            "Created series {} with {} occurrence(s) for pilot {}",
            root_id,
            committed.len(),
            req.pilot_id
        );

        let changes: Vec<PendingChange> = committed.iter().map(PendingChange::created).collect();
        let audit_failures = audit::record_batch(&self.pool, &changes, actor, origin).await;
        Ok(MutationOutcome {
            bookings: committed,
            audit_failures,
        })
    }

    /// Edit one occurrence or a series tail, per scope
    pub async fn edit(
        &self,
        id: Uuid,
        scope: EditScope,
        req: EditBooking,
        actor: &str,
        origin: Option<&str>,
    ) -> Result<MutationOutcome> {
        if let Some(start) = req.start_time {
            if !time::on_grid(start) {
                return Err(Error::Validation(
                    "start time must sit on the half-hour grid".to_string(),
                ));
            }
        }
        if let Some(duration) = req.duration_minutes {
            if !time::valid_duration(duration) {
                return Err(Error::Validation(format!(
                    "invalid duration: {} minutes",
                    duration
                )));
            }
        }
        if scope == EditScope::ThisOnly
            && (req.recurrence.is_some() || req.recurrence_end.is_some())
        {
            return Err(Error::Validation(
                "recurrence changes require future scope".to_string(),
            ));
        }

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let target = bookings::get(&mut tx, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("booking {}", id)))?;
        let area = match req.area_id {
            Some(area_id) => resolve_area(&mut tx, area_id).await?,
            None => snapshot_area(&target),
        };
        let members = bookings::series_members(&mut tx, target.series_root_id()).await?;

        let (committed, changes) = match scope {
            EditScope::ThisOnly => {
                apply_edit_single(&mut tx, &target, &members, &area, &req).await?
            }
            EditScope::FutureAll => {
                apply_edit_future(&mut tx, &target, &members, &area, &req, actor).await?
            }
        };
        tx.commit().await?;

        info!(
            "Edited booking {} ({:?}), {} occurrence(s) affected",
            id,
            scope,
            committed.len()
        );

        let audit_failures = audit::record_batch(&self.pool, &changes, actor, origin).await;
        Ok(MutationOutcome {
            bookings: committed,
            audit_failures,
        })
    }

    /// Delete one occurrence or a series tail, per scope
    pub async fn delete(
        &self,
        id: Uuid,
        scope: EditScope,
        actor: &str,
        origin: Option<&str>,
    ) -> Result<DeleteOutcome> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let target = bookings::get(&mut tx, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("booking {}", id)))?;
        let members = bookings::series_members(&mut tx, target.series_root_id()).await?;
        let now = time::now();

        let mut changes = Vec::new();
        let deleted = match scope {
            EditScope::ThisOnly => {
                if target.is_root() && members.len() > 1 {
                    promote_next_root(&mut tx, &target, &members, now).await?;
                }
                bookings::delete(&mut tx, target.id).await?;
                changes.push(PendingChange::deleted(&target));
                1
            }
            EditScope::FutureAll => {
                let (future, earlier) = split_at(&members, target.start_time);
                for member in &future {
                    bookings::delete(&mut tx, member.id).await?;
                    changes.push(PendingChange::deleted(member));
                }
                truncate_series(&mut tx, &earlier, target.start_time, now).await?;
                future.len() as u64
            }
        };
        tx.commit().await?;

        info!("Deleted {} occurrence(s) from booking {}", deleted, id);

        let audit_failures = audit::record_batch(&self.pool, &changes, actor, origin).await;
        Ok(DeleteOutcome {
            deleted,
            audit_failures,
        })
    }

    /// Dry-run conflict check for a prospective create or edit. For edit
    /// previews the occurrences that would be replaced are excluded,
    /// mirroring the real mutation.
    pub async fn preview(
        &self,
        req: CreateBooking,
        exclude_target: Option<(Uuid, EditScope)>,
    ) -> Result<Preview> {
        validate_slot(req.start_time, req.duration_minutes)?;
        let expansion = recurrence::expand(req.start_time, &req.recurrence, req.recurrence_end)?;

        let mut conn = self.pool.acquire().await?;
        catalog::get_pilot(&mut conn, req.pilot_id).await?;
        resolve_area(&mut conn, req.area_id).await?;

        let mut exclude = HashSet::new();
        if let Some((target_id, scope)) = exclude_target {
            let target = bookings::get(&mut conn, target_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("booking {}", target_id)))?;
            match scope {
                EditScope::ThisOnly => {
                    exclude.insert(target_id);
                }
                EditScope::FutureAll => {
                    let members =
                        bookings::series_members(&mut conn, target.series_root_id()).await?;
                    let (future, _) = split_at(&members, target.start_time);
                    exclude.extend(future.iter().map(|m| m.id));
                }
            }
        }

        let candidates = as_candidates(&expansion.starts, req.duration_minutes);
        let report = conflict::check(
            &mut conn,
            &candidates,
            req.pilot_id,
            req.area_id,
            &exclude,
        )
        .await?;

        Ok(Preview {
            planned_starts: expansion.starts,
            report,
        })
    }
}

/// Edit a single occurrence: detach it from its series (promoting a new
/// root first when the target is a root with children) and update fields
async fn apply_edit_single(
    conn: &mut SqliteConnection,
    target: &Booking,
    members: &[Booking],
    area: &Area,
    req: &EditBooking,
) -> Result<(Vec<Booking>, Vec<PendingChange>)> {
    let now = time::now();

    if target.is_root() && members.len() > 1 {
        promote_next_root(conn, target, members, now).await?;
    }

    let mut after = target.clone();
    after.area_id = area.id;
    after.x_coord = area.x_coord.clone();
    after.y_coord = area.y_coord.clone();
    after.z_coord = area.z_coord.clone();
    if let Some(start) = req.start_time {
        after.start_time = start;
    }
    if let Some(duration) = req.duration_minutes {
        after.duration_minutes = duration;
    }
    // Detached occurrences become trivial singleton series
    after.recurrence = Recurrence::None;
    after.recurrence_end = None;
    after.parent_id = None;
    after.updated_at = now;

    let candidates = [Candidate {
        start_time: after.start_time,
        duration_minutes: after.duration_minutes,
    }];
    let exclude: HashSet<Uuid> = [target.id].into_iter().collect();
    let report = conflict::check(conn, &candidates, after.pilot_id, after.area_id, &exclude).await?;
    if !report.is_clean() {
        return Err(Error::Conflict(report));
    }

    bookings::update(conn, &after).await?;
    let changes = audit::diff_fields(target, &after);
    Ok((vec![after], changes))
}

/// Edit the series tail: replace the target and every later member with a
/// freshly expanded series rooted at the target, and truncate the old
/// series just before the target's original start
async fn apply_edit_future(
    conn: &mut SqliteConnection,
    target: &Booking,
    members: &[Booking],
    area: &Area,
    req: &EditBooking,
    actor: &str,
) -> Result<(Vec<Booking>, Vec<PendingChange>)> {
    let now = time::now();
    let (future, earlier) = split_at(members, target.start_time);

    let new_start = req.start_time.unwrap_or(target.start_time);
    let new_duration = req.duration_minutes.unwrap_or(target.duration_minutes);
    // The end boundary is honored on its own; a new kind replaces the
    // boundary wholesale (a kind change with no end must not inherit one)
    let (new_recurrence, new_end) = match &req.recurrence {
        Some(recurrence) => (recurrence.clone(), req.recurrence_end),
        None => (
            target.recurrence.clone(),
            req.recurrence_end.or(target.recurrence_end),
        ),
    };
    let expansion = recurrence::expand(new_start, &new_recurrence, new_end)?;

    let exclude: HashSet<Uuid> = future.iter().map(|m| m.id).collect();
    let candidates = as_candidates(&expansion.starts, new_duration);
    let report = conflict::check(conn, &candidates, target.pilot_id, area.id, &exclude).await?;
    if !report.is_clean() {
        return Err(Error::Conflict(report));
    }

    let mut changes = Vec::new();

    // Replaced future siblings go away; the target row itself is rewritten
    // in place as the new root
    for member in &future {
        if member.id != target.id {
            bookings::delete(conn, member.id).await?;
            changes.push(PendingChange::deleted(member));
        }
    }

    truncate_series(conn, &earlier, target.start_time, now).await?;

    let mut new_root = target.clone();
    new_root.area_id = area.id;
    new_root.x_coord = area.x_coord.clone();
    new_root.y_coord = area.y_coord.clone();
    new_root.z_coord = area.z_coord.clone();
    new_root.start_time = expansion.starts[0];
    new_root.duration_minutes = new_duration;
    new_root.recurrence = expansion.recurrence.clone();
    new_root.recurrence_end = expansion.recurrence_end;
    new_root.parent_id = None;
    new_root.updated_at = now;
    bookings::update(conn, &new_root).await?;
    changes.extend(audit::diff_fields(target, &new_root));

    let mut committed = vec![new_root.clone()];
    for start in expansion.starts.iter().skip(1) {
        let occurrence = Booking {
            id: Uuid::new_v4(),
            pilot_id: target.pilot_id,
            area_id: area.id,
            x_coord: area.x_coord.clone(),
            y_coord: area.y_coord.clone(),
            z_coord: area.z_coord.clone(),
            start_time: *start,
            duration_minutes: new_duration,
            recurrence: expansion.recurrence.clone(),
            recurrence_end: expansion.recurrence_end,
            parent_id: Some(new_root.id),
            created_by: actor.to_string(),
            created_at: now,
            updated_at: now,
        };
        bookings::insert(conn, &occurrence).await?;
        changes.push(PendingChange::created(&occurrence));
        committed.push(occurrence);
    }

    Ok((committed, changes))
}

/// Promote the chronologically next occurrence to series root and re-point
/// the remaining siblings at it. Descriptors are carried by every member,
/// so promotion only rewrites links.
async fn promote_next_root(
    conn: &mut SqliteConnection,
    old_root: &Booking,
    members: &[Booking],
    now: DateTime<Utc>,
) -> Result<()> {
    let new_root = members
        .iter()
        .filter(|m| m.id != old_root.id)
        .min_by_key(|m| m.start_time)
        .ok_or_else(|| Error::Internal("promotion requires a sibling".to_string()))?;

    bookings::set_parent(conn, new_root.id, None, now).await?;
    for member in members {
        if member.id != old_root.id && member.id != new_root.id {
            bookings::set_parent(conn, member.id, Some(new_root.id), now).await?;
        }
    }
    Ok(())
}

/// Pull the remaining (earlier) part of a split series back to a finite
/// boundary just before the cut point
async fn truncate_series(
    conn: &mut SqliteConnection,
    earlier: &[Booking],
    cut_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<()> {
    if earlier.is_empty() {
        return Ok(());
    }
    let truncated_end = cut_start - Duration::minutes(STEP_MINUTES);
    for member in earlier {
        bookings::set_recurrence_end(conn, member.id, Some(truncated_end), now).await?;
    }
    Ok(())
}

/// Partition series members at the target's start: (future incl. target,
/// strictly earlier)
fn split_at(members: &[Booking], cut_start: DateTime<Utc>) -> (Vec<Booking>, Vec<Booking>) {
    members
        .iter()
        .cloned()
        .partition(|m| m.start_time >= cut_start)
}

fn as_candidates(starts: &[DateTime<Utc>], duration_minutes: i64) -> Vec<Candidate> {
    starts
        .iter()
        .map(|start| Candidate {
            start_time: *start,
            duration_minutes,
        })
        .collect()
}

fn validate_slot(start: DateTime<Utc>, duration_minutes: i64) -> Result<()> {
    if !time::on_grid(start) {
        return Err(Error::Validation(
            "start time must sit on the half-hour grid".to_string(),
        ));
    }
    if !time::valid_duration(duration_minutes) {
        return Err(Error::Validation(format!(
            "invalid duration: {} minutes",
            duration_minutes
        )));
    }
    Ok(())
}

async fn resolve_area(conn: &mut SqliteConnection, area_id: Uuid) -> Result<Area> {
    let area = catalog::get_area(conn, area_id).await?;
    if !area.available {
        return Err(Error::Validation(format!(
            "area {}-{}-{} is not available",
            area.x_coord, area.y_coord, area.z_coord
        )));
    }
    Ok(area)
}

/// Area view reconstructed from a booking's own snapshot, for edits that
/// keep the current slot
fn snapshot_area(booking: &Booking) -> Area {
    Area {
        id: booking.area_id,
        x_coord: booking.x_coord.clone(),
        y_coord: booking.y_coord.clone(),
        z_coord: booking.z_coord.clone(),
        available: true,
    }
}
