//! Operator token gate for internal routes.
//!
//! Human/console authentication is handled outside this service; the
//! internal publish and key-management routes are instead guarded by a
//! static bearer token from configuration. Presenting the token is the
//! whole authorization model: any holder is a recognized operator.

use crate::{error::AppError, handlers::AppState};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Require `Authorization: Bearer <ADMIN_TOKEN>` on internal routes.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(AppError::Unauthorized)?;

    if token != state.config.admin_token {
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}
