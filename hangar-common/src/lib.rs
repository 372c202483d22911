//! # Hangar Common Library
//!
//! Shared code for the Hangar operations backend:
//! - Database schema, models and connection setup
//! - Error types
//! - Configuration loading
//! - Timeline utilities (UTC clock, half-hour grid)

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
