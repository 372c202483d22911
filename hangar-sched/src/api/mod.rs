//! REST API for the scheduling service
//!
//! Thin HTTP boundary over the scheduler: handlers parse raw wire values
//! (recurrence kinds, edit scopes) into typed intents and map engine
//! errors onto status codes. No scheduling logic lives here.

pub mod handlers;
pub mod server;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::error::Error;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::Validation(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            Error::NotFound(what) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("not found: {}", what) })),
            )
                .into_response(),
            Error::Conflict(report) => (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": "scheduling conflict",
                    "area_conflicts": report.area_conflicts,
                    "pilot_conflicts": report.pilot_conflicts,
                })),
            )
                .into_response(),
            Error::Busy(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": msg })),
            )
                .into_response(),
            // Internal detail stays in the log, not on the wire
            Error::Database(e) => {
                error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                )
                    .into_response()
            }
            Error::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                )
                    .into_response()
            }
        }
    }
}
