//! Config delivery endpoint.
//!
//! `GET /v1/config` serves the newest published snapshot for the
//! authenticated key's environment with cache-revalidation semantics: the
//! content hash doubles as a strong ETag, the publish time as
//! Last-Modified, and conditional requests short-circuit to 304.

use crate::{
    error::AppError,
    handlers::AppState,
    middleware::auth::AuthContext,
    models::snapshot::{ConfigResponse, PublishedConfig},
};
use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};

/// Format a timestamp as an RFC 7231 HTTP date (IMF-fixdate, GMT).
fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse an HTTP date header value.
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Does an `If-None-Match` header match the current validator?
///
/// The value is a comma-separated set of entity tags; weak `W/` prefixes
/// are tolerated and compared by their opaque part.
fn if_none_match_matches(header_value: &str, etag: &str) -> bool {
    header_value
        .split(',')
        .map(str::trim)
        .map(|tag| tag.strip_prefix("W/").unwrap_or(tag))
        .any(|tag| tag == etag)
}

/// Cache headers shared by 200 and 304 responses.
///
/// `Vary` covers both credential headers: different keys resolve to
/// different environments and must never share a cached response.
fn cache_headers(etag: &str, last_modified: DateTime<Utc>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(etag) {
        headers.insert(header::ETAG, value);
    }
    if let Ok(value) = HeaderValue::from_str(&http_date(last_modified)) {
        headers.insert(header::LAST_MODIFIED, value);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("private, max-age=0, must-revalidate"),
    );
    headers.insert(
        header::VARY,
        HeaderValue::from_static("Authorization, X-Api-Key"),
    );
    headers
}

/// Serve the latest published config for the authenticated environment.
///
/// # Endpoint
///
/// `GET /v1/config`
///
/// # Conditional requests
///
/// `If-None-Match` is evaluated before `If-Modified-Since`; if either
/// matches, the response is 304 with no body and the same cache headers.
///
/// # Responses
///
/// - **200**: `{version, sha256, publishedAt, createdAt, config}` with
///   `ETag`, `Last-Modified`, `Cache-Control` and `Vary`
/// - **304**: empty body, same cache headers
/// - **404** `no_published_config` with `Cache-Control: no-store`
pub async fn get_config(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    request_headers: HeaderMap,
) -> Result<Response, AppError> {
    let snapshot = sqlx::query_as::<_, PublishedConfig>(
        r#"
        SELECT version, content_sha256, content_json, published_at, created_at
        FROM config_snapshots
        WHERE environment_id = $1 AND status = 'published'
        ORDER BY version DESC
        LIMIT 1
        "#,
    )
    .bind(auth.environment_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NoPublishedConfig)?;

    // Strong validator from the content hash; publish time as the
    // modification time, falling back to creation time
    let etag = format!("\"{}\"", snapshot.content_sha256);
    let last_modified = snapshot.published_at.unwrap_or(snapshot.created_at);

    let headers = cache_headers(&etag, last_modified);

    if let Some(inm) = request_headers
        .get(header::IF_NONE_MATCH)
        .and_then(|h| h.to_str().ok())
    {
        if if_none_match_matches(inm, &etag) {
            return Ok((StatusCode::NOT_MODIFIED, headers).into_response());
        }
    }

    if let Some(since) = request_headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|h| h.to_str().ok())
        .and_then(parse_http_date)
    {
        // HTTP dates carry whole seconds; compare at that resolution
        if since.timestamp() >= last_modified.timestamp() {
            return Ok((StatusCode::NOT_MODIFIED, headers).into_response());
        }
    }

    let body = ConfigResponse {
        version: snapshot.version,
        sha256: snapshot.content_sha256,
        published_at: snapshot.published_at,
        created_at: snapshot.created_at,
        config: snapshot.content_json,
    };

    Ok((StatusCode::OK, headers, Json(body)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ETAG: &str = "\"abc123\"";

    #[test]
    fn exact_etag_matches() {
        assert!(if_none_match_matches("\"abc123\"", ETAG));
    }

    #[test]
    fn etag_list_matches_any_member() {
        assert!(if_none_match_matches("\"old\", \"abc123\"", ETAG));
        assert!(if_none_match_matches("\"old\",\"abc123\",\"older\"", ETAG));
    }

    #[test]
    fn weak_prefix_is_tolerated() {
        assert!(if_none_match_matches("W/\"abc123\"", ETAG));
        assert!(if_none_match_matches("\"stale\", W/\"abc123\"", ETAG));
    }

    #[test]
    fn stale_etag_does_not_match() {
        assert!(!if_none_match_matches("\"stale\"", ETAG));
        assert!(!if_none_match_matches("\"stale\", \"older\"", ETAG));
        // Unquoted value is a different entity tag
        assert!(!if_none_match_matches("abc123", ETAG));
    }

    #[test]
    fn http_date_round_trips() {
        let at = Utc.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap();
        let formatted = http_date(at);
        assert_eq!(formatted, "Fri, 14 Mar 2025 15:09:26 GMT");
        assert_eq!(parse_http_date(&formatted), Some(at));
    }

    #[test]
    fn garbage_http_date_is_rejected() {
        assert_eq!(parse_http_date("not a date"), None);
    }
}
