//! Fixed-window rate limiting backed by a durable counter.
//!
//! The service is stateless and horizontally scaled, so the counter lives
//! in PostgreSQL rather than process memory: one row per (api key, window
//! start), incremented in a single atomic upsert. Windows are epoch-aligned
//! (current time floored to a multiple of the window duration), not sliding.

use crate::{db::DbPool, error::AppError};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Outcome of a rate-limit check.
///
/// Carried into the 429 response body and `X-RateLimit-*` headers.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,

    /// Requests permitted per window
    pub limit: i64,

    /// Requests left in the current window, floored at 0
    pub remaining: i64,

    /// When the current window ends and the counter resets
    pub reset_at: DateTime<Utc>,

    /// Seconds until the window resets; at least 1 when denied
    pub retry_after_secs: i64,
}

/// Floor a millisecond timestamp to the start of its fixed window.
fn floor_to_window(now_ms: i64, window_ms: i64) -> i64 {
    now_ms - now_ms.rem_euclid(window_ms)
}

/// Derive the decision from a post-increment count.
///
/// Separated from the store round-trip so the arithmetic is unit-testable.
fn decide(count: i64, limit: i64, now_ms: i64, window_start_ms: i64, window_ms: i64) -> RateLimitDecision {
    let reset_ms = window_start_ms + window_ms;
    let remaining = (limit - count).max(0);
    let allowed = count <= limit;

    // Ceil to whole seconds, minimum 1, so clients never retry too early
    let retry_after_secs = if allowed {
        0
    } else {
        ((reset_ms - now_ms + 999) / 1000).max(1)
    };

    RateLimitDecision {
        allowed,
        limit,
        remaining,
        reset_at: DateTime::from_timestamp_millis(reset_ms).unwrap_or_else(Utc::now),
        retry_after_secs,
    }
}

/// Check and consume one request against the key's fixed-window counter.
///
/// # Atomicity
///
/// The increment is a single `INSERT .. ON CONFLICT .. DO UPDATE` round
/// trip, so concurrent requests for the same key never lose updates; the
/// (limit+1)th request in a window is always denied regardless of
/// interleaving.
///
/// # Cleanup
///
/// Counter rows older than two windows are deleted opportunistically in a
/// spawned task. Cleanup failures are logged and never block the decision.
pub async fn check_rate_limit(
    pool: &DbPool,
    api_key_id: Uuid,
    limit: i64,
    window_secs: i64,
) -> Result<RateLimitDecision, AppError> {
    let window_ms = window_secs * 1000;
    let now = Utc::now();
    let now_ms = now.timestamp_millis();
    let window_start_ms = floor_to_window(now_ms, window_ms);

    let window_start = DateTime::from_timestamp_millis(window_start_ms)
        .ok_or_else(|| AppError::InvalidRequest("invalid rate limit window".to_string()))?;

    // Best-effort cleanup of expired windows, off the request path
    let cleanup_pool = pool.clone();
    let cutoff = DateTime::from_timestamp_millis(window_start_ms - 2 * window_ms);
    tokio::spawn(async move {
        let Some(cutoff) = cutoff else { return };
        let result = sqlx::query(
            "DELETE FROM rate_limit_counters WHERE api_key_id = $1 AND window_start < $2",
        )
        .bind(api_key_id)
        .bind(cutoff)
        .execute(&cleanup_pool)
        .await;

        if let Err(err) = result {
            tracing::debug!(error = %err, "rate limit counter cleanup failed");
        }
    });

    // Atomic increment per (api_key_id, window_start); creates the row at 1
    let count: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO rate_limit_counters (api_key_id, window_start, count)
        VALUES ($1, $2, 1)
        ON CONFLICT (api_key_id, window_start)
        DO UPDATE SET count = rate_limit_counters.count + 1
        RETURNING count
        "#,
    )
    .bind(api_key_id)
    .bind(window_start)
    .fetch_one(pool)
    .await?;

    Ok(decide(count, limit, now_ms, window_start_ms, window_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW_MS: i64 = 60_000;

    #[test]
    fn windows_are_epoch_aligned() {
        assert_eq!(floor_to_window(0, WINDOW_MS), 0);
        assert_eq!(floor_to_window(59_999, WINDOW_MS), 0);
        assert_eq!(floor_to_window(60_000, WINDOW_MS), 60_000);
        assert_eq!(floor_to_window(1_700_000_123_456, WINDOW_MS), 1_700_000_100_000);
    }

    #[test]
    fn counts_up_to_limit_are_allowed() {
        for count in 1..=5 {
            let decision = decide(count, 5, 10_000, 0, WINDOW_MS);
            assert!(decision.allowed, "count {count} should be allowed");
            assert_eq!(decision.remaining, 5 - count);
            assert_eq!(decision.retry_after_secs, 0);
        }
    }

    #[test]
    fn count_past_limit_is_denied_with_retry_after() {
        let decision = decide(6, 5, 10_000, 0, WINDOW_MS);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        // 50 seconds left in the window
        assert_eq!(decision.retry_after_secs, 50);
        assert_eq!(decision.reset_at.timestamp_millis(), 60_000);
    }

    #[test]
    fn remaining_never_goes_negative() {
        let decision = decide(100, 5, 10_000, 0, WINDOW_MS);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn retry_after_is_at_least_one_second() {
        // Denied 1ms before the window resets
        let decision = decide(6, 5, 59_999, 0, WINDOW_MS);
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after_secs, 1);
    }

    #[test]
    fn next_window_starts_fresh() {
        let first = floor_to_window(59_000, WINDOW_MS);
        let second = floor_to_window(61_000, WINDOW_MS);
        // Different counter rows, so the count resets rather than carrying over
        assert_ne!(first, second);
    }
}
