//! Error types for hangar-sched
//!
//! The taxonomy separates caller mistakes (validation, not-found), the one
//! domain error the engine exists to report (scheduling conflicts, carrying
//! the full collision report), and infrastructure faults. A write that loses
//! a race on the store surfaces as `Busy` so callers can retry.

use crate::conflict::ConflictReport;
use thiserror::Error;

/// Main error type for hangar-sched
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or out-of-bounds request input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing pilot, area, or booking target
    #[error("Not found: {0}")]
    NotFound(String),

    /// Area or pilot double-booking; nothing was persisted
    #[error("Scheduling conflict: {} colliding booking(s)", .0.total())]
    Conflict(ConflictReport),

    /// The store was busy; the operation may be retried as-is
    #[error("Store busy: {0}")]
    Busy(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        // SQLite reports a lost write race as a locked/busy database
        if let Some(db_err) = e.as_database_error() {
            let message = db_err.message();
            if message.contains("database is locked") || message.contains("database is busy") {
                return Error::Busy(message.to_string());
            }
        }
        Error::Database(e)
    }
}

impl From<hangar_common::Error> for Error {
    fn from(e: hangar_common::Error) -> Self {
        match e {
            hangar_common::Error::InvalidInput(msg) => Error::Validation(msg),
            hangar_common::Error::NotFound(msg) => Error::NotFound(msg),
            hangar_common::Error::Database(e) => Error::from(e),
            other => Error::Internal(other.to_string()),
        }
    }
}

/// Convenience Result type using hangar-sched Error
pub type Result<T> = std::result::Result<T, Error>;
