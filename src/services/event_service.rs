//! Event persistence for the ingestion endpoint.
//!
//! Normalized events are inserted in one bulk statement scoped to the
//! key's project/environment. Rows colliding on the per-environment dedup
//! identifier are skipped silently, making batch re-submission idempotent.

use crate::{db::DbPool, models::event::NormalizedEvent};
use chrono::{DateTime, Utc};
use sqlx::QueryBuilder;
use uuid::Uuid;

/// Bulk-insert a normalized batch, skipping dedup collisions.
///
/// Returns the number of rows actually inserted, which the ingestion
/// response reports as `inserted` (duplicates make it lower than the
/// submitted count).
pub async fn insert_events(
    pool: &DbPool,
    project_id: Uuid,
    environment_id: Uuid,
    api_key_id: Uuid,
    events: &[NormalizedEvent],
) -> Result<u64, sqlx::Error> {
    if events.is_empty() {
        return Ok(0);
    }

    let mut builder = QueryBuilder::new(
        "INSERT INTO events (project_id, environment_id, api_key_id, event_id, event_type, payload_json) ",
    );

    builder.push_values(events, |mut row, event| {
        row.push_bind(project_id)
            .push_bind(environment_id)
            .push_bind(api_key_id)
            .push_bind(event.event_id)
            .push_bind(&event.event_type)
            .push_bind(&event.payload_json);
    });

    // Idempotent re-submission: duplicates on (environment_id, event_id)
    // are dropped, not errors
    builder.push(" ON CONFLICT (environment_id, event_id) DO NOTHING");

    let result = builder.build().execute(pool).await?;

    Ok(result.rows_affected())
}

/// Request-level telemetry line for one ingestion attempt.
///
/// Written fire-and-forget after authentication; the caller spawns this
/// and drops any failure.
#[allow(clippy::too_many_arguments)]
pub async fn log_request(
    pool: &DbPool,
    project_id: Uuid,
    environment_id: Option<Uuid>,
    api_key_id: Uuid,
    request_id: Uuid,
    method: &str,
    path: &str,
    status: u16,
    latency_ms: i64,
    ip: Option<String>,
    user_agent: Option<String>,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO request_logs (
            project_id, environment_id, api_key_id, request_id,
            method, path, status, latency_ms, ip, user_agent, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(project_id)
    .bind(environment_id)
    .bind(api_key_id)
    .bind(request_id)
    .bind(method)
    .bind(path)
    .bind(i32::from(status))
    .bind(latency_ms)
    .bind(ip)
    .bind(user_agent)
    .bind(at)
    .execute(pool)
    .await?;

    Ok(())
}
