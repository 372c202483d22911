//! Hangar scheduler (hangar-sched) - Main entry point
//!
//! Booking scheduler microservice: expands recurrence into series,
//! rejects conflicting bookings, and keeps a field-level change log.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hangar_common::config::resolve_database_path;
use hangar_common::db::{initialize_database, open_pool};
use hangar_sched::api::server::{router, AppContext};
use hangar_sched::Scheduler;

/// Command-line arguments for hangar-sched
#[derive(Parser, Debug)]
#[command(name = "hangar-sched")]
#[command(about = "Booking scheduler microservice for Hangar")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5730", env = "HANGAR_SCHED_PORT")]
    port: u16,

    /// Path to the SQLite database file
    #[arg(short, long)]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hangar_sched=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments
    let args = Args::parse();

    info!("Starting Hangar scheduler on port {}", args.port);

    let db_path = resolve_database_path(args.database.as_deref(), "HANGAR_DB")
        .context("Failed to resolve database path")?;
    info!("Database: {}", db_path.display());

    let db_pool = open_pool(&db_path)
        .await
        .context("Failed to open database")?;
    initialize_database(&db_pool)
        .await
        .context("Failed to initialize database schema")?;

    let ctx = AppContext {
        scheduler: Arc::new(Scheduler::new(db_pool.clone())),
        db_pool,
    };
    let app = router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
