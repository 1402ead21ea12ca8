//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// This enum represents all possible errors that can occur in the application.
/// Each variant maps to a specific HTTP status code and a stable error code
/// string that SDKs can match on.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from store operations
/// - **Credential Errors**: Missing, invalid, revoked or incomplete API keys
/// - **Absence Errors**: Environments or published config that do not exist
/// - **Validation Errors**: Invalid request data
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    ///
    /// This wraps any sqlx::Error using the `#[from]` attribute, which
    /// automatically implements `From<sqlx::Error> for AppError`.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No bearer secret or API-key header was present on the request.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Missing API key")]
    MissingApiKey,

    /// The presented secret does not hash to any stored key.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// The key exists but has been revoked.
    ///
    /// Returns HTTP 403 Forbidden. Revocation is terminal: a revoked key
    /// fails validation forever.
    #[error("API key has been revoked")]
    RevokedApiKey,

    /// The key has no environment scope.
    ///
    /// Returns HTTP 400 Bad Request. Config delivery and event ingestion
    /// both require an environment-scoped key.
    #[error("API key is not scoped to an environment")]
    KeyMissingEnvironment,

    /// Operator token missing or wrong on an internal route.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Unauthorized")]
    Unauthorized,

    /// Requested environment does not exist.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Environment not found")]
    EnvironmentNotFound,

    /// The environment has no published config snapshot yet.
    ///
    /// Returns HTTP 404 Not Found with `Cache-Control: no-store` so that
    /// intermediaries never cache the absence.
    #[error("No published config")]
    NoPublishedConfig,

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    /// The String contains details about what was invalid.
    #[error("Invalid request")]
    InvalidRequest(String),
}

/// Convert AppError into an HTTP response.
///
/// This implementation allows Axum handlers to return `Result<T, AppError>`
/// and have errors automatically converted to proper HTTP responses.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": "error_code"
/// }
/// ```
///
/// # Status Code Mapping
///
/// - `MissingApiKey` / `InvalidApiKey` / `Unauthorized` → 401
/// - `RevokedApiKey` → 403
/// - `KeyMissingEnvironment` → 400
/// - `EnvironmentNotFound` / `NoPublishedConfig` → 404
/// - `InvalidRequest` → 400
/// - `Database` → 500 (hides details from client)
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Map each error variant to (HTTP status, error code)
        let (status, code) = match self {
            AppError::MissingApiKey => (StatusCode::UNAUTHORIZED, "missing_api_key"),
            AppError::InvalidApiKey => (StatusCode::UNAUTHORIZED, "invalid_api_key"),
            AppError::RevokedApiKey => (StatusCode::FORBIDDEN, "revoked_api_key"),
            AppError::KeyMissingEnvironment => {
                (StatusCode::BAD_REQUEST, "key_missing_environment")
            }
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::EnvironmentNotFound => (StatusCode::NOT_FOUND, "not_found"),
            AppError::NoPublishedConfig => (StatusCode::NOT_FOUND, "no_published_config"),
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            AppError::Database(ref err) => {
                // Log the store failure; the client only sees a generic code
                tracing::error!(error = %err, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        let no_store = matches!(self, AppError::NoPublishedConfig);

        // Build JSON response body
        let body = match self {
            AppError::InvalidRequest(ref msg) => Json(json!({
                "error": code,
                "message": msg,
            })),
            _ => Json(json!({ "error": code })),
        };

        let mut response = (status, body).into_response();

        // Absence of published config must never be cached downstream,
        // and like every delivery response it varies by credential
        if no_store {
            response.headers_mut().insert(
                header::CACHE_CONTROL,
                header::HeaderValue::from_static("no-store"),
            );
            response.headers_mut().insert(
                header::VARY,
                header::HeaderValue::from_static("Authorization, X-Api-Key"),
            );
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_errors_map_to_expected_statuses() {
        assert_eq!(
            AppError::MissingApiKey.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::InvalidApiKey.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::RevokedApiKey.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::KeyMissingEnvironment.into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn missing_config_is_not_cacheable() {
        let response = AppError::NoPublishedConfig.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-store"
        );
    }
}
