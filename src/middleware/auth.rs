//! API key authentication middleware for SDK routes.
//!
//! This middleware intercepts every data-plane request to:
//! 1. Extract the bearer secret from the Authorization or X-Api-Key header
//! 2. Hash it and look the hash up in the database
//! 3. Reject revoked or environment-less keys
//! 4. Inject the resolved scope into the request
//!
//! The secret itself is never logged, echoed or stored; only its SHA-256
//! hash is compared, over the full secret (the display prefix is not a
//! security boundary).

use crate::{
    error::AppError, handlers::AppState, models::api_key::ApiKey, services::key_service,
};
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Authentication context attached to authenticated data-plane requests.
///
/// Inserted into the request's extension map; route handlers extract it to
/// know which project/environment the key resolves to. Different keys map
/// to different environments, so responses keyed on this context must
/// carry `Vary` on the credential headers.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// ID of the authenticated API key
    pub api_key_id: Uuid,

    /// Project the key belongs to
    pub project_id: Uuid,

    /// Environment the key is scoped to.
    ///
    /// Guaranteed present here: keys without an environment scope are
    /// rejected before any handler runs.
    pub environment_id: Uuid,
}

/// Pull the opaque secret out of the request headers.
///
/// Accepts `Authorization: Bearer <secret>` (scheme case-insensitive) or a
/// dedicated `X-Api-Key` header.
fn extract_secret(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("authorization").and_then(|h| h.to_str().ok()) {
        if value.len() > 7 && value[..7].eq_ignore_ascii_case("bearer ") {
            let token = value[7..].trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    headers
        .get("x-api-key")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// API key authentication middleware function.
///
/// # Flow
///
/// 1. Extract the secret; 401 `missing_api_key` if absent
/// 2. SHA-256 the secret and look up the hash; 401 `invalid_api_key` if no
///    record matches
/// 3. 403 `revoked_api_key` if the key has a revocation timestamp
/// 4. 400 `key_missing_environment` if the key has no environment scope
/// 5. Inject `AuthContext`, fire a best-effort `last_used_at` update, and
///    call the next handler
///
/// The `last_used_at` update runs in a spawned task; its failure never
/// fails the request.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let secret = extract_secret(request.headers()).ok_or(AppError::MissingApiKey)?;

    let key_hash = key_service::hash_key(&secret);

    let key = sqlx::query_as::<_, ApiKey>(
        r#"
        SELECT id, project_id, environment_id, name, prefix, key_hash,
               created_at, revoked_at, last_used_at
        FROM api_keys
        WHERE key_hash = $1
        "#,
    )
    .bind(&key_hash)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::InvalidApiKey)?;

    if key.revoked_at.is_some() {
        return Err(AppError::RevokedApiKey);
    }

    let environment_id = key.environment_id.ok_or(AppError::KeyMissingEnvironment)?;

    let auth_context = AuthContext {
        api_key_id: key.id,
        project_id: key.project_id,
        environment_id,
    };

    // Best-effort last-used stamp, off the request path
    let pool = state.pool.clone();
    let api_key_id = key.id;
    tokio::spawn(async move {
        let result = sqlx::query("UPDATE api_keys SET last_used_at = NOW() WHERE id = $1")
            .bind(api_key_id)
            .execute(&pool)
            .await;

        if let Err(err) = result {
            tracing::debug!(error = %err, "last_used_at update failed");
        }
    });

    request.extensions_mut().insert(auth_context);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn bearer_header_is_extracted() {
        let h = headers(&[("authorization", "Bearer cpk_abc_secret")]);
        assert_eq!(extract_secret(&h).as_deref(), Some("cpk_abc_secret"));
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let h = headers(&[("authorization", "bearer cpk_abc_secret")]);
        assert_eq!(extract_secret(&h).as_deref(), Some("cpk_abc_secret"));
    }

    #[test]
    fn api_key_header_is_accepted() {
        let h = headers(&[("x-api-key", " cpk_abc_secret ")]);
        assert_eq!(extract_secret(&h).as_deref(), Some("cpk_abc_secret"));
    }

    #[test]
    fn authorization_wins_over_api_key_header() {
        let h = headers(&[
            ("authorization", "Bearer from_auth"),
            ("x-api-key", "from_header"),
        ]);
        assert_eq!(extract_secret(&h).as_deref(), Some("from_auth"));
    }

    #[test]
    fn empty_or_missing_credentials_yield_none() {
        assert_eq!(extract_secret(&headers(&[])), None);
        assert_eq!(
            extract_secret(&headers(&[("authorization", "Bearer   ")])),
            None
        );
        assert_eq!(extract_secret(&headers(&[("x-api-key", "")])), None);
        // Wrong scheme is not a bearer credential
        assert_eq!(
            extract_secret(&headers(&[("authorization", "Basic dXNlcjpwdw==")])),
            None
        );
    }
}
