//! # Hangar Scheduler (hangar-sched)
//!
//! Announcement scheduling engine for the Hangar operations backend:
//! - Recurrence expansion (none / daily / weekly / bounded custom)
//! - Conflict detection per area slot and per pilot
//! - Scoped series mutation (this occurrence only vs. all future)
//! - Field-level audit trail for every mutation
//!
//! The HTTP surface in [`api`] is the integration point for UI and report
//! collaborators; everything temporal lives on a single absolute UTC
//! timeline.

pub mod api;
pub mod audit;
pub mod catalog;
pub mod conflict;
pub mod db;
pub mod error;
pub mod recurrence;
pub mod series;

pub use error::{Error, Result};
pub use series::Scheduler;
