//! Recurrence expansion
//!
//! Pure expansion of a recurrence descriptor into a finite, ordered
//! sequence of start instants. All arithmetic is whole-day steps on the
//! absolute UTC timeline, so identical inputs always yield identical
//! sequences regardless of locale or calendar irregularities.
//!
//! Edge policy: an end boundary before the anchor normalizes the request
//! to a single non-recurring occurrence at the anchor. Degenerate patterns
//! (empty weekday set, zero interval, missing end boundary) are validation
//! errors, never a silent empty result.

use chrono::{DateTime, Datelike, Duration, Utc};
use hangar_common::db::{CustomPattern, Recurrence};
use hangar_common::time::MAX_RECURRENCE_SPAN_DAYS;

use crate::error::{Error, Result};

/// Result of expanding a recurrence descriptor from an anchor occurrence
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    /// Ordered start instants; never empty, first element is the anchor
    pub starts: Vec<DateTime<Utc>>,
    /// Descriptor after normalization (end-before-anchor collapses to None)
    pub recurrence: Recurrence,
    /// End boundary after normalization
    pub recurrence_end: Option<DateTime<Utc>>,
}

/// Expand `recurrence` from `anchor` up to and including `recurrence_end`
pub fn expand(
    anchor: DateTime<Utc>,
    recurrence: &Recurrence,
    recurrence_end: Option<DateTime<Utc>>,
) -> Result<Expansion> {
    if recurrence.is_none() {
        if recurrence_end.is_some() {
            return Err(Error::Validation(
                "recurrence end requires a recurrence kind".to_string(),
            ));
        }
        return Ok(Expansion {
            starts: vec![anchor],
            recurrence: Recurrence::None,
            recurrence_end: None,
        });
    }

    let end = recurrence_end.ok_or_else(|| {
        Error::Validation("recurring bookings require an end boundary".to_string())
    })?;

    // End before anchor: normalize to a single non-recurring occurrence
    if end < anchor {
        return Ok(Expansion {
            starts: vec![anchor],
            recurrence: Recurrence::None,
            recurrence_end: None,
        });
    }

    if end > anchor + Duration::days(MAX_RECURRENCE_SPAN_DAYS) {
        return Err(Error::Validation(format!(
            "recurrence span exceeds {} days",
            MAX_RECURRENCE_SPAN_DAYS
        )));
    }

    let starts = match recurrence {
        Recurrence::None => unreachable!("handled above"),
        Recurrence::Daily => stepped(anchor, end, Duration::days(1)),
        Recurrence::Weekly => stepped(anchor, end, Duration::days(7)),
        Recurrence::Custom(pattern) => {
            pattern.validate()?;
            match pattern {
                CustomPattern::EveryNDays { every_days } => {
                    stepped(anchor, end, Duration::days(i64::from(*every_days)))
                }
                CustomPattern::Weekdays { weekdays } => by_weekdays(anchor, end, weekdays),
            }
        }
    };

    Ok(Expansion {
        starts,
        recurrence: recurrence.clone(),
        recurrence_end: Some(end),
    })
}

/// Fixed-interval sequence: anchor, anchor+step, ... <= end
fn stepped(anchor: DateTime<Utc>, end: DateTime<Utc>, step: Duration) -> Vec<DateTime<Utc>> {
    let mut starts = Vec::new();
    let mut current = anchor;
    while current <= end {
        starts.push(current);
        current += step;
    }
    starts
}

/// Anchor plus every later day whose ISO weekday (1 = Monday) is in the
/// set, each at the anchor's time of day. The anchor is always included;
/// it is the user-chosen first occurrence even when its own weekday is
/// outside the set.
fn by_weekdays(anchor: DateTime<Utc>, end: DateTime<Utc>, weekdays: &[u8]) -> Vec<DateTime<Utc>> {
    let mut starts = vec![anchor];
    let mut current = anchor + Duration::days(1);
    while current <= end {
        let iso_weekday = current.weekday().number_from_monday() as u8;
        if weekdays.contains(&iso_weekday) {
            starts.push(current);
        }
        current += Duration::days(1);
    }
    starts
}
