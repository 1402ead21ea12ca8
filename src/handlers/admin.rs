//! Internal operator endpoints.
//!
//! This module implements the producer side of the SDK contract:
//! - POST /internal/environments/{id}/publish - Publish a config snapshot
//! - POST /internal/keys - Generate an API key
//! - POST /internal/keys/{id}/revoke - Revoke an API key
//!
//! All routes sit behind the operator-token middleware. An optional
//! `X-Actor` header carries the operator identity into audit entries.

use crate::{
    error::AppError,
    handlers::AppState,
    models::{
        api_key::{ApiKeyCreatedResponse, CreateApiKeyRequest},
        snapshot::SnapshotResponse,
    },
    services::{key_service, snapshot_service},
};
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

/// Operator identity from the `X-Actor` header, if supplied.
fn actor(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-actor")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub snapshot: SnapshotResponse,
}

/// Publish the current config for an environment.
///
/// # Endpoint
///
/// `POST /internal/environments/{id}/publish`
///
/// # Idempotence
///
/// Publishing unchanged content re-publishes the existing snapshot and
/// returns the same version and hash; only changed content mints a new
/// version.
///
/// # Response (201)
///
/// ```json
/// {
///   "snapshot": {
///     "id": "...", "environment_id": "...", "version": 1,
///     "status": "published", "content_sha256": "...",
///     "created_at": "...", "published_at": "..."
///   }
/// }
/// ```
pub async fn publish_environment(
    State(state): State<AppState>,
    Path(environment_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<PublishResponse>), AppError> {
    let snapshot = snapshot_service::publish(&state.pool, environment_id, actor(&headers)).await?;

    Ok((
        StatusCode::CREATED,
        Json(PublishResponse {
            snapshot: snapshot.into(),
        }),
    ))
}

/// Generate a new environment-scoped API key.
///
/// # Endpoint
///
/// `POST /internal/keys`
///
/// # Response (201)
///
/// The `key` field is the full plaintext secret, shown exactly once.
pub async fn create_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<ApiKeyCreatedResponse>), AppError> {
    let generated = key_service::create_api_key(
        &state.pool,
        request.project_id,
        request.environment_id,
        request.name,
        actor(&headers),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiKeyCreatedResponse {
            api_key_id: generated.id,
            prefix: generated.prefix,
            key: generated.full_key,
        }),
    ))
}

/// Revoke an API key.
///
/// # Endpoint
///
/// `POST /internal/keys/{id}/revoke`
///
/// Revocation is terminal and idempotent: revoking an already-revoked key
/// succeeds without changing anything.
pub async fn revoke_key(
    State(state): State<AppState>,
    Path(api_key_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    key_service::revoke_api_key(&state.pool, api_key_id, actor(&headers)).await?;

    Ok(Json(json!({ "ok": true })))
}
