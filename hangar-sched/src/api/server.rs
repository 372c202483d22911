//! HTTP server setup and routing

use crate::series::Scheduler;
use axum::routing::{get, post};
use axum::Router;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application context passed to all handlers
///
/// **Note:** AppContext implements Clone, which gives us `FromRef<AppContext>`
/// for free via Axum's blanket implementation.
#[derive(Clone)]
pub struct AppContext {
    pub scheduler: Arc<Scheduler>,
    pub db_pool: Pool<Sqlite>,
}

/// Build the API router
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(super::handlers::health))
        // Booking lifecycle
        .route(
            "/bookings",
            get(super::handlers::list_bookings).post(super::handlers::create_booking),
        )
        .route("/bookings/check", post(super::handlers::check_booking))
        .route(
            "/bookings/:id",
            get(super::handlers::get_booking)
                .patch(super::handlers::edit_booking)
                .delete(super::handlers::delete_booking),
        )
        // Series and history views
        .route("/bookings/:id/series", get(super::handlers::get_series))
        .route("/bookings/:id/changes", get(super::handlers::get_changes))
        // Catalog views
        .route("/pilots", get(super::handlers::list_pilots))
        .route("/areas", get(super::handlers::list_areas))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
