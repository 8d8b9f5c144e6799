/// Server setup and initialization
///
/// Wires together the database pool, storage client, resource routes and the
/// notification scheduler into the Axum app.

use crate::{
    api::{create_api_routes, AppState},
    config::Config,
    db::Database,
    scheduler::NotificationScheduler,
};
use anyhow::Result;
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

/// Router over an already built state; also what the integration tests drive
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .merge(create_api_routes().with_state(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Running application: the router plus the scheduler it started, if any
pub struct App {
    pub router: Router,
    pub scheduler: Option<NotificationScheduler>,
}

/// Connect to the database, start the scheduler and build the router
pub async fn create_app(config: Config) -> Result<App> {
    tracing::info!("🗄️ Initializing database pool");
    let db = Database::connect(&config.database).await?;

    let scheduler = if config.scheduler.enabled {
        tracing::info!("⏰ Initializing notification scheduler");
        let scheduler = NotificationScheduler::new(&config.scheduler, db.clone())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize notification scheduler: {}", e))?;
        scheduler.start().await?;
        Some(scheduler)
    } else {
        tracing::info!("⏭️ Notification scheduler disabled");
        None
    };

    tracing::info!("📡 Creating HTTP router with all endpoints");
    let router = build_router(AppState::new(config, db));

    tracing::info!("✅ Application initialized successfully");
    Ok(App { router, scheduler })
}

/// Start the HTTP server with the given configuration
///
/// Log level comes from `RUST_LOG`, defaulting to `info`.
pub async fn start_server(config: Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting COMETA server...");

    let bind_addr = config.bind_addr();
    let app = create_app(config).await?;

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(scheduler) = app.scheduler {
        scheduler.stop().await?;
    }
    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("⏹️ Shutdown signal received");
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}
