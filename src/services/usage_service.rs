//! Hourly usage aggregation.
//!
//! Every ingestion request increments one hour-aligned bucket keyed by
//! (project, environment, scope). The update is a single atomic
//! upsert-increment, so concurrent requests in the same hour never lose
//! counts. Buckets are commutative: increments are order-independent.

use crate::{db::DbPool, error::AppError};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Floor a timestamp to the start of its containing hour.
fn floor_to_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    let ms = at.timestamp_millis();
    let floored = ms - ms.rem_euclid(3_600_000);
    DateTime::from_timestamp_millis(floored).unwrap_or(at)
}

/// Classify a status code into exactly one response-class counter.
///
/// Returns (requests_202, requests_4xx, requests_5xx) increments. The
/// success counter matches 202 exactly, which is the only success status
/// the ingestion path produces.
fn classify_status(status: u16) -> (i64, i64, i64) {
    match status {
        202 => (1, 0, 0),
        400..=499 => (0, 1, 0),
        500..=u16::MAX => (0, 0, 1),
        _ => (0, 0, 0),
    }
}

/// Usage dimension: per-key when a key id is known, otherwise project-wide.
pub fn scope_key(api_key_id: Option<Uuid>) -> String {
    match api_key_id {
        Some(id) => format!("apiKey:{id}"),
        None => "project".to_string(),
    }
}

/// Increment the hour bucket for one request outcome.
///
/// Classifies `status` into one response-class counter, adds
/// `events_ingested`, and, when latency is present, adds it to the running
/// sum and bumps the sample count (negative latencies clamp to 0).
///
/// # Concurrency
///
/// One `INSERT .. ON CONFLICT .. DO UPDATE` statement against the unique
/// (project_id, environment_id, scope_key, bucket_start) key; never a
/// read-modify-write.
pub async fn bump_usage(
    pool: &DbPool,
    project_id: Uuid,
    environment_id: Uuid,
    api_key_id: Option<Uuid>,
    status: u16,
    latency_ms: Option<i64>,
    events_ingested: i64,
    at: DateTime<Utc>,
) -> Result<(), AppError> {
    let bucket_start = floor_to_hour(at);
    let scope = scope_key(api_key_id);
    let (requests_202, requests_4xx, requests_5xx) = classify_status(status);
    let latency_sum = latency_ms.map(|l| l.max(0)).unwrap_or(0);
    let latency_count: i64 = i64::from(latency_ms.is_some());

    sqlx::query(
        r#"
        INSERT INTO usage_buckets (
            project_id, environment_id, scope_key, bucket_start,
            events_ingested, requests_202, requests_4xx, requests_5xx,
            latency_sum_ms, latency_count
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (project_id, environment_id, scope_key, bucket_start)
        DO UPDATE SET
            events_ingested = usage_buckets.events_ingested + EXCLUDED.events_ingested,
            requests_202 = usage_buckets.requests_202 + EXCLUDED.requests_202,
            requests_4xx = usage_buckets.requests_4xx + EXCLUDED.requests_4xx,
            requests_5xx = usage_buckets.requests_5xx + EXCLUDED.requests_5xx,
            latency_sum_ms = usage_buckets.latency_sum_ms + EXCLUDED.latency_sum_ms,
            latency_count = usage_buckets.latency_count + EXCLUDED.latency_count
        "#,
    )
    .bind(project_id)
    .bind(environment_id)
    .bind(&scope)
    .bind(bucket_start)
    .bind(events_ingested)
    .bind(requests_202)
    .bind(requests_4xx)
    .bind(requests_5xx)
    .bind(latency_sum)
    .bind(latency_count)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn hour_flooring_is_hour_aligned() {
        let at = Utc.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap();
        let floored = floor_to_hour(at);
        assert_eq!(floored, Utc.with_ymd_and_hms(2025, 3, 14, 15, 0, 0).unwrap());

        // Already aligned timestamps are unchanged
        assert_eq!(floor_to_hour(floored), floored);
    }

    #[test]
    fn same_hour_maps_to_same_bucket() {
        let a = Utc.with_ymd_and_hms(2025, 3, 14, 15, 0, 1).unwrap();
        let b = Utc.with_ymd_and_hms(2025, 3, 14, 15, 59, 59).unwrap();
        assert_eq!(floor_to_hour(a), floor_to_hour(b));
    }

    #[test]
    fn status_classifies_into_exactly_one_counter() {
        assert_eq!(classify_status(202), (1, 0, 0));
        assert_eq!(classify_status(400), (0, 1, 0));
        assert_eq!(classify_status(429), (0, 1, 0));
        assert_eq!(classify_status(499), (0, 1, 0));
        assert_eq!(classify_status(500), (0, 0, 1));
        assert_eq!(classify_status(503), (0, 0, 1));
        // 200 is not a status the ingestion path produces; counts nowhere
        assert_eq!(classify_status(200), (0, 0, 0));
    }

    #[test]
    fn scope_key_distinguishes_key_and_project() {
        let id = Uuid::new_v4();
        assert_eq!(scope_key(Some(id)), format!("apiKey:{id}"));
        assert_eq!(scope_key(None), "project");
    }
}
