//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, headers)
//! 2. Performs business logic (database queries, validation)
//! 3. Returns HTTP response (JSON, status code, cache headers)

use crate::{config::Config, db::DbPool};

/// Shared application state injected into handlers and middleware.
#[derive(Debug, Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Config,
}

/// Internal operator endpoints (publish, key management)
pub mod admin;
/// SDK config delivery endpoint
pub mod config_delivery;
/// SDK event ingestion endpoint
pub mod events;
/// Health check endpoint
pub mod health;
