//! Event ingestion endpoint.
//!
//! `POST /v1/events` accepts a single event object or an array of them,
//! normalizes field aliases, bulk-inserts with dedup, and records usage.
//! Every response after authentication also produces a best-effort
//! request-log line and usage-bucket increment; neither can fail the
//! response.

use crate::{
    db::DbPool,
    error::AppError,
    handlers::AppState,
    middleware::auth::AuthContext,
    models::event::{IngestResponse, NormalizedEvent, RawEvent},
    services::{event_service, rate_limit, usage_service},
};
use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::{Value, json};
use std::time::Instant;
use uuid::Uuid;

/// Maximum number of events per batch.
const MAX_BATCH: usize = 100;

/// First hop of `X-Forwarded-For`, if present.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Split the body into raw batch elements: an array is a batch, a single
/// object is a batch of one.
fn batch_elements(body: Value) -> Vec<Value> {
    match body {
        Value::Array(elements) => elements,
        other => vec![other],
    }
}

/// Best-effort telemetry writer for one ingestion request.
///
/// Bundles everything the request log and usage bucket need so the handler
/// can record any outcome in one call. Writes are spawned; failures are
/// logged at debug and dropped.
struct RequestRecorder {
    pool: DbPool,
    auth: AuthContext,
    request_id: Uuid,
    started: Instant,
    ip: Option<String>,
    user_agent: Option<String>,
}

impl RequestRecorder {
    fn new(state: &AppState, auth: &AuthContext, request_id: Uuid, headers: &HeaderMap) -> Self {
        Self {
            pool: state.pool.clone(),
            auth: auth.clone(),
            request_id,
            started: Instant::now(),
            ip: client_ip(headers),
            user_agent: headers
                .get(header::USER_AGENT)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string),
        }
    }

    /// Record the final status and inserted-event count for this request.
    fn record(&self, status: u16, events_ingested: i64) {
        let latency_ms = self.started.elapsed().as_millis() as i64;
        let now = Utc::now();

        let pool = self.pool.clone();
        let auth = self.auth.clone();
        let request_id = self.request_id;
        let ip = self.ip.clone();
        let user_agent = self.user_agent.clone();
        tokio::spawn(async move {
            let result = event_service::log_request(
                &pool,
                auth.project_id,
                Some(auth.environment_id),
                auth.api_key_id,
                request_id,
                "POST",
                "/v1/events",
                status,
                latency_ms,
                ip,
                user_agent,
                now,
            )
            .await;

            if let Err(err) = result {
                tracing::debug!(error = %err, "request log write failed");
            }
        });

        let pool = self.pool.clone();
        let auth = self.auth.clone();
        tokio::spawn(async move {
            let result = usage_service::bump_usage(
                &pool,
                auth.project_id,
                auth.environment_id,
                Some(auth.api_key_id),
                status,
                Some(latency_ms),
                events_ingested,
                now,
            )
            .await;

            if let Err(err) = result {
                tracing::debug!(error = %err, "usage bump failed");
            }
        });
    }
}

/// Ingest a batch of SDK events.
///
/// # Pipeline
///
/// 1. Credentials were already validated by the auth middleware; failures
///    there return before any usage is recorded
/// 2. Rate limit per API key (fixed window from configuration); denials
///    respond 429 with `Retry-After` / `X-RateLimit-*` and are recorded
///    with zero events
/// 3. Parse body as one event object or an array; `invalid_json`,
///    `empty_batch` and `batch_too_large` reject the whole batch
/// 4. Normalize field aliases and dedup identifiers
/// 5. One bulk insert, silently skipping dedup collisions
/// 6. Record usage with the final status and rows actually inserted
///
/// # Responses
///
/// - **202**: `{ok, request_id, received, inserted}`
/// - **400/413/429/500**: error code plus `request_id`
pub async fn ingest_events(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let request_id = Uuid::new_v4();
    let recorder = RequestRecorder::new(&state, &auth, request_id, &headers);

    // Rate limit before doing any parse work
    let decision = rate_limit::check_rate_limit(
        &state.pool,
        auth.api_key_id,
        state.config.events_rate_limit,
        state.config.events_rate_window_secs,
    )
    .await?;

    if !decision.allowed {
        recorder.record(429, 0);

        let response = (
            StatusCode::TOO_MANY_REQUESTS,
            [
                ("retry-after", decision.retry_after_secs.to_string()),
                ("x-ratelimit-limit", decision.limit.to_string()),
                ("x-ratelimit-remaining", decision.remaining.to_string()),
                ("x-ratelimit-reset", decision.reset_at.timestamp().to_string()),
            ],
            Json(json!({
                "error": "rate_limited",
                "request_id": request_id,
                "limit": decision.limit,
                "remaining": decision.remaining,
                "reset_at": decision.reset_at,
                "retry_after_seconds": decision.retry_after_secs,
            })),
        );
        return Ok(response.into_response());
    }

    // Parse: single object or array of objects
    let Ok(parsed) = serde_json::from_slice::<Value>(&body) else {
        recorder.record(400, 0);
        return Ok(error_response(
            StatusCode::BAD_REQUEST,
            "invalid_json",
            request_id,
        ));
    };

    let raw_elements = batch_elements(parsed);

    if raw_elements.is_empty() {
        recorder.record(400, 0);
        return Ok(error_response(
            StatusCode::BAD_REQUEST,
            "empty_batch",
            request_id,
        ));
    }

    if raw_elements.len() > MAX_BATCH {
        recorder.record(413, 0);
        let response = (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(json!({
                "error": "batch_too_large",
                "max": MAX_BATCH,
                "request_id": request_id,
            })),
        );
        return Ok(response.into_response());
    }

    let received = raw_elements.len();

    // Resolve aliases into the canonical event shape; one bad element
    // rejects the batch
    let mut events: Vec<NormalizedEvent> = Vec::with_capacity(received);
    for element in raw_elements {
        let raw: RawEvent = match serde_json::from_value(element) {
            Ok(raw) => raw,
            Err(err) => {
                recorder.record(400, 0);
                let response = (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "invalid_request",
                        "message": err.to_string(),
                        "request_id": request_id,
                    })),
                );
                return Ok(response.into_response());
            }
        };

        match raw.normalize() {
            Ok(event) => events.push(event),
            Err(message) => {
                recorder.record(400, 0);
                let response = (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "invalid_request",
                        "message": message,
                        "request_id": request_id,
                    })),
                );
                return Ok(response.into_response());
            }
        }
    }

    match event_service::insert_events(
        &state.pool,
        auth.project_id,
        auth.environment_id,
        auth.api_key_id,
        &events,
    )
    .await
    {
        Ok(inserted) => {
            // Usage counts rows actually written, not rows submitted
            recorder.record(202, inserted as i64);

            let response = (
                StatusCode::ACCEPTED,
                Json(IngestResponse {
                    ok: true,
                    request_id,
                    received,
                    inserted,
                }),
            );
            Ok(response.into_response())
        }
        Err(err) => {
            tracing::error!(error = %err, "event insert failed");
            recorder.record(500, 0);

            let response = (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "internal_error",
                    "request_id": request_id,
                })),
            );
            Ok(response.into_response())
        }
    }
}

fn error_response(status: StatusCode, code: &str, request_id: Uuid) -> Response {
    (
        status,
        Json(json!({ "error": code, "request_id": request_id })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn single_object_becomes_batch_of_one() {
        let elements = batch_elements(json!({ "type": "click" }));
        assert_eq!(elements.len(), 1);
    }

    #[test]
    fn array_is_taken_as_is() {
        let elements = batch_elements(json!([{ "type": "a" }, { "type": "b" }]));
        assert_eq!(elements.len(), 2);
    }

    #[test]
    fn empty_array_is_an_empty_batch() {
        assert!(batch_elements(json!([])).is_empty());
    }

    #[test]
    fn client_ip_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.9"));
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }
}
