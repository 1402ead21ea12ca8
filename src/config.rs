//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `ADMIN_TOKEN` (required): bearer token for internal operator routes
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `EVENTS_RATE_LIMIT` (optional): ingestion requests per window, defaults to 300
/// - `EVENTS_RATE_WINDOW_SECS` (optional): rate-limit window in seconds, defaults to 60
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    /// Static token that guards /internal/* routes. Human/console auth is
    /// out of scope for this service; operators present this token instead.
    pub admin_token: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_events_rate_limit")]
    pub events_rate_limit: i64,

    #[serde(default = "default_events_rate_window_secs")]
    pub events_rate_window_secs: i64,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

/// Default ingestion rate limit: 300 requests per window.
fn default_events_rate_limit() -> i64 {
    300
}

/// Default fixed-window duration: 60 seconds.
fn default_events_rate_window_secs() -> i64 {
    60
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Parse environment variables into Config struct
        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }
}
