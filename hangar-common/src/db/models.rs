//! Database models
//!
//! Row types for the booking store plus the recurrence descriptor. Raw
//! database values (recurrence kind strings, pattern JSON, uuid text) are
//! always parsed through the constructors here; core logic never touches
//! unchecked strings.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::{Error, Result};

/// Custom recurrence pattern: an explicit ISO weekday set or a fixed
/// interval in days
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CustomPattern {
    /// Occurrences on the given ISO weekdays (1 = Monday .. 7 = Sunday)
    Weekdays { weekdays: Vec<u8> },
    /// Occurrences every N days from the anchor
    EveryNDays { every_days: u32 },
}

impl CustomPattern {
    /// Reject degenerate patterns before any expansion runs
    pub fn validate(&self) -> Result<()> {
        match self {
            CustomPattern::Weekdays { weekdays } => {
                if weekdays.is_empty() {
                    return Err(Error::InvalidInput(
                        "custom weekday pattern must name at least one weekday".to_string(),
                    ));
                }
                for day in weekdays {
                    if !(1..=7).contains(day) {
                        return Err(Error::InvalidInput(format!(
                            "weekday {} out of range 1-7",
                            day
                        )));
                    }
                }
                Ok(())
            }
            CustomPattern::EveryNDays { every_days } => {
                if *every_days == 0 {
                    return Err(Error::InvalidInput(
                        "custom interval must be at least one day".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Recurrence descriptor for a booking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "pattern", rename_all = "snake_case")]
pub enum Recurrence {
    None,
    Daily,
    Weekly,
    Custom(CustomPattern),
}

impl Recurrence {
    pub fn is_none(&self) -> bool {
        matches!(self, Recurrence::None)
    }

    /// Kind discriminant as stored in the `recurrence_kind` column
    pub fn kind_str(&self) -> &'static str {
        match self {
            Recurrence::None => "none",
            Recurrence::Daily => "daily",
            Recurrence::Weekly => "weekly",
            Recurrence::Custom(_) => "custom",
        }
    }

    /// Pattern JSON as stored in the `recurrence_pattern` column
    /// (custom kinds only)
    pub fn pattern_json(&self) -> Option<String> {
        match self {
            Recurrence::Custom(pattern) => serde_json::to_string(pattern).ok(),
            _ => None,
        }
    }

    /// Parse a kind string + optional pattern JSON into a validated
    /// descriptor. Unknown kinds and malformed patterns are input errors,
    /// never coerced.
    pub fn from_parts(kind: &str, pattern: Option<&str>) -> Result<Recurrence> {
        match kind {
            "none" => Ok(Recurrence::None),
            "daily" => Ok(Recurrence::Daily),
            "weekly" => Ok(Recurrence::Weekly),
            "custom" => {
                let raw = pattern.ok_or_else(|| {
                    Error::InvalidInput("custom recurrence requires a pattern".to_string())
                })?;
                let parsed: CustomPattern = serde_json::from_str(raw).map_err(|e| {
                    Error::InvalidInput(format!("malformed recurrence pattern: {}", e))
                })?;
                parsed.validate()?;
                Ok(Recurrence::Custom(parsed))
            }
            other => Err(Error::InvalidInput(format!(
                "unknown recurrence kind: {}",
                other
            ))),
        }
    }
}

/// One booked occurrence: one pilot on one area slot for one time interval
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Booking {
    pub id: Uuid,
    pub pilot_id: Uuid,
    pub area_id: Uuid,
    /// Coordinate snapshot captured from the catalog at creation time,
    /// kept so history stays legible after catalog edits
    pub x_coord: String,
    pub y_coord: String,
    pub z_coord: String,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
    #[serde(flatten)]
    pub recurrence: Recurrence,
    pub recurrence_end: Option<DateTime<Utc>>,
    /// Series link: root occurrence of this booking's series; empty for
    /// roots and singletons
    pub parent_id: Option<Uuid>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Exclusive end of the booked interval
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(self.duration_minutes)
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Root id of the series this booking belongs to (self for roots)
    pub fn series_root_id(&self) -> Uuid {
        self.parent_id.unwrap_or(self.id)
    }

    /// Map a `bookings` row into a typed booking
    pub fn from_row(row: &SqliteRow) -> Result<Booking> {
        let kind: String = row.try_get("recurrence_kind")?;
        let pattern: Option<String> = row.try_get("recurrence_pattern")?;
        Ok(Booking {
            id: parse_uuid(&row.try_get::<String, _>("id")?)?,
            pilot_id: parse_uuid(&row.try_get::<String, _>("pilot_id")?)?,
            area_id: parse_uuid(&row.try_get::<String, _>("area_id")?)?,
            x_coord: row.try_get("x_coord")?,
            y_coord: row.try_get("y_coord")?,
            z_coord: row.try_get("z_coord")?,
            start_time: row.try_get("start_time")?,
            duration_minutes: row.try_get("duration_minutes")?,
            recurrence: Recurrence::from_parts(&kind, pattern.as_deref())?,
            recurrence_end: row.try_get("recurrence_end")?,
            parent_id: row
                .try_get::<Option<String>, _>("parent_id")?
                .map(|s| parse_uuid(&s))
                .transpose()?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Append-only change record for one booking field mutation
#[derive(Debug, Clone, Serialize)]
pub struct ChangeRecord {
    pub id: i64,
    pub booking_id: Uuid,
    pub actor: String,
    pub field_name: String,
    pub old_value: String,
    pub new_value: String,
    pub changed_at: DateTime<Utc>,
    pub origin: Option<String>,
}

impl ChangeRecord {
    pub fn from_row(row: &SqliteRow) -> Result<ChangeRecord> {
        Ok(ChangeRecord {
            id: row.try_get("id")?,
            booking_id: parse_uuid(&row.try_get::<String, _>("booking_id")?)?,
            actor: row.try_get("actor")?,
            field_name: row.try_get("field_name")?,
            old_value: row.try_get("old_value")?,
            new_value: row.try_get("new_value")?,
            changed_at: row.try_get("changed_at")?,
            origin: row.try_get("origin")?,
        })
    }
}

/// Bookable slot from the resource catalog (consumed, not managed here)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Area {
    pub id: Uuid,
    pub x_coord: String,
    pub y_coord: String,
    pub z_coord: String,
    pub available: bool,
}

impl Area {
    pub fn from_row(row: &SqliteRow) -> Result<Area> {
        Ok(Area {
            id: parse_uuid(&row.try_get::<String, _>("id")?)?,
            x_coord: row.try_get("x_coord")?,
            y_coord: row.try_get("y_coord")?,
            z_coord: row.try_get("z_coord")?,
            available: row.try_get("available")?,
        })
    }
}

/// Pilot directory entry (consumed, not managed here)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pilot {
    pub id: Uuid,
    pub nickname: String,
}

impl Pilot {
    pub fn from_row(row: &SqliteRow) -> Result<Pilot> {
        Ok(Pilot {
            id: parse_uuid(&row.try_get::<String, _>("id")?)?,
            nickname: row.try_get("nickname")?,
        })
    }
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Internal(format!("bad uuid in database: {}", e)))
}
