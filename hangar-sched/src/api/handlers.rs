//! HTTP request handlers
//!
//! Wire types deliberately carry the recurrence kind as a raw string so
//! unknown kinds surface as 400s from our own validation rather than
//! opaque deserialization failures.

use crate::api::server::AppContext;
use crate::audit;
use crate::catalog;
use crate::conflict::ConflictHit;
use crate::db::bookings::{self, BookingFilter};
use crate::error::{Error, Result};
use crate::series::{CreateBooking, EditBooking, EditScope};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use hangar_common::db::{Area, Booking, ChangeRecord, Pilot, Recurrence};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_LIST_LIMIT: i64 = 500;
const MAX_LIST_LIMIT: i64 = 2000;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pilot_id: Uuid,
    area_id: Uuid,
    start_time: DateTime<Utc>,
    duration_minutes: i64,
    #[serde(default = "default_kind")]
    recurrence_kind: String,
    recurrence_pattern: Option<serde_json::Value>,
    recurrence_end: Option<DateTime<Utc>>,
}

fn default_kind() -> String {
    "none".to_string()
}

impl CreateBookingRequest {
    fn into_intent(self) -> Result<CreateBooking> {
        let pattern = self.recurrence_pattern.map(|v| v.to_string());
        let recurrence = Recurrence::from_parts(&self.recurrence_kind, pattern.as_deref())?;
        Ok(CreateBooking {
            pilot_id: self.pilot_id,
            area_id: self.area_id,
            start_time: self.start_time,
            duration_minutes: self.duration_minutes,
            recurrence,
            recurrence_end: self.recurrence_end,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct EditBookingRequest {
    area_id: Option<Uuid>,
    start_time: Option<DateTime<Utc>>,
    duration_minutes: Option<i64>,
    recurrence_kind: Option<String>,
    recurrence_pattern: Option<serde_json::Value>,
    recurrence_end: Option<DateTime<Utc>>,
}

impl EditBookingRequest {
    fn into_intent(self) -> Result<EditBooking> {
        let recurrence = match self.recurrence_kind {
            Some(kind) => {
                let pattern = self.recurrence_pattern.map(|v| v.to_string());
                Some(Recurrence::from_parts(&kind, pattern.as_deref())?)
            }
            None => None,
        };
        Ok(EditBooking {
            area_id: self.area_id,
            start_time: self.start_time,
            duration_minutes: self.duration_minutes,
            recurrence,
            recurrence_end: self.recurrence_end,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckBookingRequest {
    #[serde(flatten)]
    booking: CreateBookingRequest,
    /// Booking being edited, if this check previews an edit
    target_id: Option<Uuid>,
    #[serde(default = "default_scope")]
    scope: String,
}

#[derive(Debug, Deserialize)]
pub struct ScopeQuery {
    #[serde(default = "default_scope")]
    scope: String,
}

fn default_scope() -> String {
    "this_only".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pilot_id: Option<Uuid>,
    area_id: Option<Uuid>,
    from: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ChangesQuery {
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MutationResponse {
    occurrences: Vec<Booking>,
    audit_failures: usize,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    deleted: u64,
    audit_failures: usize,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    clean: bool,
    planned_starts: Vec<DateTime<Utc>>,
    area_conflicts: Vec<ConflictHit>,
    pilot_conflicts: Vec<ConflictHit>,
}

#[derive(Debug, Serialize)]
pub struct SeriesResponse {
    root_id: Uuid,
    occurrences: Vec<Booking>,
}

#[derive(Debug, Serialize)]
pub struct ChangesResponse {
    changes: Vec<ChangeRecord>,
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "hangar-sched".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Booking Lifecycle Endpoints
// ============================================================================

/// POST /bookings - Create a booking, expanding recurrence into a series
pub async fn create_booking(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<MutationResponse>)> {
    let intent = req.into_intent()?;
    let actor = actor_from(&headers);
    let origin = origin_from(&headers);
    let outcome = ctx
        .scheduler
        .create(intent, &actor, origin.as_deref())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(MutationResponse {
            occurrences: outcome.bookings,
            audit_failures: outcome.audit_failures,
        }),
    ))
}

/// POST /bookings/check - Dry-run conflict check, no persistence
pub async fn check_booking(
    State(ctx): State<AppContext>,
    Json(req): Json<CheckBookingRequest>,
) -> Result<Json<CheckResponse>> {
    let exclude_target = match req.target_id {
        Some(id) => Some((id, req.scope.parse::<EditScope>()?)),
        None => None,
    };
    let preview = ctx
        .scheduler
        .preview(req.booking.into_intent()?, exclude_target)
        .await?;
    Ok(Json(CheckResponse {
        clean: preview.report.is_clean(),
        planned_starts: preview.planned_starts,
        area_conflicts: preview.report.area_conflicts,
        pilot_conflicts: preview.report.pilot_conflicts,
    }))
}

/// GET /bookings - List bookings by filter
pub async fn list_bookings(
    State(ctx): State<AppContext>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Booking>>> {
    let filter = BookingFilter {
        pilot_id: query.pilot_id,
        area_id: query.area_id,
        from: query.from,
        until: query.until,
    };
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let found = bookings::list(&ctx.db_pool, &filter, limit).await?;
    Ok(Json(found))
}

/// GET /bookings/:id - Fetch one occurrence
pub async fn get_booking(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>> {
    let mut conn = ctx.db_pool.acquire().await?;
    let booking = bookings::get(&mut conn, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("booking {}", id)))?;
    Ok(Json(booking))
}

/// PATCH /bookings/:id?scope= - Edit one occurrence or its future tail
pub async fn edit_booking(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
    Query(query): Query<ScopeQuery>,
    headers: HeaderMap,
    Json(req): Json<EditBookingRequest>,
) -> Result<Json<MutationResponse>> {
    let scope = query.scope.parse::<EditScope>()?;
    let intent = req.into_intent()?;
    let actor = actor_from(&headers);
    let origin = origin_from(&headers);
    let outcome = ctx
        .scheduler
        .edit(id, scope, intent, &actor, origin.as_deref())
        .await?;
    Ok(Json(MutationResponse {
        occurrences: outcome.bookings,
        audit_failures: outcome.audit_failures,
    }))
}

/// DELETE /bookings/:id?scope= - Delete one occurrence or its future tail
pub async fn delete_booking(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
    Query(query): Query<ScopeQuery>,
    headers: HeaderMap,
) -> Result<Json<DeleteResponse>> {
    let scope = query.scope.parse::<EditScope>()?;
    let actor = actor_from(&headers);
    let origin = origin_from(&headers);
    let outcome = ctx
        .scheduler
        .delete(id, scope, &actor, origin.as_deref())
        .await?;
    Ok(Json(DeleteResponse {
        deleted: outcome.deleted,
        audit_failures: outcome.audit_failures,
    }))
}

// ============================================================================
// Series and History Endpoints
// ============================================================================

/// GET /bookings/:id/series - All members of the booking's series
pub async fn get_series(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<SeriesResponse>> {
    let mut conn = ctx.db_pool.acquire().await?;
    let booking = bookings::get(&mut conn, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("booking {}", id)))?;
    let root_id = booking.series_root_id();
    let occurrences = bookings::series_members(&mut conn, root_id).await?;
    Ok(Json(SeriesResponse {
        root_id,
        occurrences,
    }))
}

/// GET /bookings/:id/changes - Change history, newest first
pub async fn get_changes(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
    Query(query): Query<ChangesQuery>,
) -> Result<Json<ChangesResponse>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let changes = audit::list_changes(&ctx.db_pool, id, limit).await?;
    Ok(Json(ChangesResponse { changes }))
}

// ============================================================================
// Catalog Endpoints
// ============================================================================

/// GET /pilots - Pilot directory
pub async fn list_pilots(State(ctx): State<AppContext>) -> Result<Json<Vec<Pilot>>> {
    Ok(Json(catalog::list_pilots(&ctx.db_pool).await?))
}

/// GET /areas - Available area slots
pub async fn list_areas(State(ctx): State<AppContext>) -> Result<Json<Vec<Area>>> {
    Ok(Json(catalog::list_areas(&ctx.db_pool).await?))
}

// ============================================================================
// Header Helpers
// ============================================================================

/// Acting user from the `x-actor` header; unattributed requests are
/// recorded as "system"
fn actor_from(headers: &HeaderMap) -> String {
    headers
        .get("x-actor")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("system")
        .to_string()
}

/// Request origin from `x-forwarded-for` (first hop)
fn origin_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| raw.split(',').next())
        .map(|hop| hop.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::server::{router, AppContext};
    use crate::catalog::test_support::{seed_area, seed_pilot};
    use crate::series::Scheduler;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use axum::Router;
    use hangar_common::db::initialize_database;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct TestApp {
        app: Router,
        pilot: Uuid,
        area: Uuid,
    }

    async fn test_app() -> TestApp {
        let pool: Pool<Sqlite> = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        initialize_database(&pool).await.unwrap();
        let pilot = seed_pilot(&pool, "Asuka").await;
        let area = seed_area(&pool, "Base-1", "Floor-1", "Seat-1", true).await;
        let ctx = AppContext {
            scheduler: Arc::new(Scheduler::new(pool.clone())),
            db_pool: pool,
        };
        TestApp {
            app: router(ctx),
            pilot,
            area,
        }
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(value) => builder
                .header("content-type", "application/json")
                .header("x-actor", "tester")
                .body(Body::from(value.to_string())),
            None => builder.header("x-actor", "tester").body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn weekly_body(tapp: &TestApp) -> Value {
        json!({
            "pilot_id": tapp.pilot,
            "area_id": tapp.area,
            "start_time": "2025-01-06T09:00:00Z",
            "duration_minutes": 120,
            "recurrence_kind": "weekly",
            "recurrence_end": "2025-01-27T09:00:00Z",
        })
    }

    #[tokio::test]
    async fn test_health() {
        let tapp = test_app().await;
        let (status, body) = send(&tapp.app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["module"], "hangar-sched");
    }

    #[tokio::test]
    async fn test_create_weekly_series() {
        let tapp = test_app().await;
        let (status, body) =
            send(&tapp.app, Method::POST, "/bookings", Some(weekly_body(&tapp))).await;
        assert_eq!(status, StatusCode::CREATED);
        let occurrences = body["occurrences"].as_array().unwrap();
        assert_eq!(occurrences.len(), 4);
        assert_eq!(occurrences[0]["kind"], "weekly");
        assert!(occurrences[0]["parent_id"].is_null());
        assert_eq!(occurrences[1]["parent_id"], occurrences[0]["id"]);
        assert_eq!(body["audit_failures"], 0);
    }

    #[tokio::test]
    async fn test_create_unknown_kind_is_bad_request() {
        let tapp = test_app().await;
        let mut body = weekly_body(&tapp);
        body["recurrence_kind"] = json!("fortnightly");
        let (status, response) = send(&tapp.app, Method::POST, "/bookings", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(response["error"]
            .as_str()
            .unwrap()
            .contains("unknown recurrence kind"));
    }

    #[tokio::test]
    async fn test_create_conflict_returns_report() {
        let tapp = test_app().await;
        let (status, _) =
            send(&tapp.app, Method::POST, "/bookings", Some(weekly_body(&tapp))).await;
        assert_eq!(status, StatusCode::CREATED);

        // Same pilot, same slot again
        let (status, body) =
            send(&tapp.app, Method::POST, "/bookings", Some(weekly_body(&tapp))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(!body["area_conflicts"].as_array().unwrap().is_empty());
        assert!(!body["pilot_conflicts"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_check_reports_without_creating() {
        let tapp = test_app().await;
        send(&tapp.app, Method::POST, "/bookings", Some(weekly_body(&tapp))).await;

        let (status, body) =
            send(&tapp.app, Method::POST, "/bookings/check", Some(weekly_body(&tapp))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["clean"], false);
        assert_eq!(body["planned_starts"].as_array().unwrap().len(), 4);

        let (_, listing) = send(&tapp.app, Method::GET, "/bookings", None).await;
        assert_eq!(listing.as_array().unwrap().len(), 4); // check persisted nothing
    }

    #[tokio::test]
    async fn test_get_booking_and_missing() {
        let tapp = test_app().await;
        let (_, created) =
            send(&tapp.app, Method::POST, "/bookings", Some(weekly_body(&tapp))).await;
        let id = created["occurrences"][0]["id"].as_str().unwrap().to_string();

        let (status, body) =
            send(&tapp.app, Method::GET, &format!("/bookings/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], id.as_str());

        let (status, _) = send(
            &tapp.app,
            Method::GET,
            &format!("/bookings/{}", Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_edit_future_scope() {
        let tapp = test_app().await;
        let (_, created) =
            send(&tapp.app, Method::POST, "/bookings", Some(weekly_body(&tapp))).await;
        let third = created["occurrences"][2]["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &tapp.app,
            Method::PATCH,
            &format!("/bookings/{}?scope=future_all", third),
            Some(json!({ "duration_minutes": 180 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let occurrences = body["occurrences"].as_array().unwrap();
        assert_eq!(occurrences.len(), 2);
        assert_eq!(occurrences[0]["id"], third.as_str());
        assert_eq!(occurrences[0]["duration_minutes"], 180);
    }

    #[tokio::test]
    async fn test_edit_unknown_scope_is_bad_request() {
        let tapp = test_app().await;
        let (_, created) =
            send(&tapp.app, Method::POST, "/bookings", Some(weekly_body(&tapp))).await;
        let id = created["occurrences"][0]["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &tapp.app,
            Method::PATCH,
            &format!("/bookings/{}?scope=everything", id),
            Some(json!({ "duration_minutes": 180 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_future_scope() {
        let tapp = test_app().await;
        let (_, created) =
            send(&tapp.app, Method::POST, "/bookings", Some(weekly_body(&tapp))).await;
        let third = created["occurrences"][2]["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &tapp.app,
            Method::DELETE,
            &format!("/bookings/{}?scope=future_all", third),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], 2);

        let (_, listing) = send(&tapp.app, Method::GET, "/bookings", None).await;
        assert_eq!(listing.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_series_view() {
        let tapp = test_app().await;
        let (_, created) =
            send(&tapp.app, Method::POST, "/bookings", Some(weekly_body(&tapp))).await;
        let root = created["occurrences"][0]["id"].as_str().unwrap().to_string();
        let child = created["occurrences"][3]["id"].as_str().unwrap().to_string();

        // Series view from a child resolves the same root
        let (status, body) = send(
            &tapp.app,
            Method::GET,
            &format!("/bookings/{}/series", child),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["root_id"], root.as_str());
        assert_eq!(body["occurrences"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_changes_view_records_actor() {
        let tapp = test_app().await;
        let (_, created) =
            send(&tapp.app, Method::POST, "/bookings", Some(weekly_body(&tapp))).await;
        let id = created["occurrences"][1]["id"].as_str().unwrap().to_string();

        send(
            &tapp.app,
            Method::PATCH,
            &format!("/bookings/{}?scope=this_only", id),
            Some(json!({ "duration_minutes": 180 })),
        )
        .await;

        let (status, body) = send(
            &tapp.app,
            Method::GET,
            &format!("/bookings/{}/changes", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let changes = body["changes"].as_array().unwrap();
        assert!(!changes.is_empty());
        assert_eq!(changes[0]["actor"], "tester");
    }

    #[tokio::test]
    async fn test_list_bookings_filtered_by_window() {
        let tapp = test_app().await;
        send(&tapp.app, Method::POST, "/bookings", Some(weekly_body(&tapp))).await;

        let (status, body) = send(
            &tapp.app,
            Method::GET,
            "/bookings?from=2025-01-13T00:00:00Z&until=2025-01-21T00:00:00Z",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_catalog_views() {
        let tapp = test_app().await;
        let (status, pilots) = send(&tapp.app, Method::GET, "/pilots", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pilots.as_array().unwrap().len(), 1);
        assert_eq!(pilots[0]["nickname"], "Asuka");

        let (status, areas) = send(&tapp.app, Method::GET, "/areas", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(areas[0]["x_coord"], "Base-1");
    }
}
