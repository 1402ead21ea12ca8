//! Feature Config Server - Main Application Entry Point
//!
//! This is the data-plane service of a feature-flag control plane. It
//! authenticates SDK traffic with opaque API keys, enforces per-key rate
//! limits, publishes immutable content-addressed config snapshots, serves
//! the latest snapshot with cache revalidation, ingests batched telemetry
//! events, and aggregates usage and audit records.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries); the single source
//!   of truth and the only synchronization point across stateless workers
//! - **Authentication**: SDK routes via SHA-256-hashed API keys, internal
//!   routes via a static operator token
//! - **Format**: JSON requests/responses
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Build HTTP router with routes and middleware
//! 5. Start server on configured port

mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;

use tracing_subscriber::EnvFilter;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use handlers::AppState;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let state = AppState {
        pool,
        config: config.clone(),
    };

    // SDK data-plane routes (API key auth)
    let sdk_routes = Router::new()
        .route("/v1/config", get(handlers::config_delivery::get_config))
        .route("/v1/events", post(handlers::events::ingest_events))
        // Apply API key authentication to all routes in this group
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    // Internal operator routes (static token auth)
    let internal_routes = Router::new()
        .route(
            "/internal/environments/{id}/publish",
            post(handlers::admin::publish_environment),
        )
        .route("/internal/keys", post(handlers::admin::create_key))
        .route(
            "/internal/keys/{id}/revoke",
            post(handlers::admin::revoke_key),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::admin::admin_auth_middleware,
        ));

    // Combine route groups with public routes
    let app = Router::new()
        // Public routes (no authentication required)
        .route("/health", get(handlers::health::health_check))
        .merge(sdk_routes)
        .merge(internal_routes)
        // Add distributed tracing middleware for observability
        .layer(TraceLayer::new_for_http())
        // Share pool and config with all handlers via State extraction
        .with_state(state);

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Start serving HTTP requests
    // This blocks forever, handling requests concurrently with tokio
    axum::serve(listener, app).await?;

    Ok(())
}
