//! Bearer token authentication for the publish endpoint
//!
//! Clients send `Authorization: Bearer <key>`; the key must be one of the
//! configured `user-keys`. A missing or malformed header is a 401, an
//! unknown key a 403. The accepted key is stored in the request extensions
//! as [`AuthenticatedKey`] so the publish handler can write it to the audit
//! log.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::{error::AppError, state::AppState};

/// The publish key that authenticated the current request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedKey(pub String);

/// Extract bearer token from Authorization header
fn extract_bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Middleware guarding mutating endpoints
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(&req).ok_or_else(|| {
        AppError::Unauthorized("Missing or invalid Authorization header".to_string())
    })?;

    if !state.config.is_authorized(token) {
        warn!(path = %req.uri().path(), "Rejected publish with unknown key");
        return Err(AppError::Forbidden("Invalid publish key".to_string()));
    }

    let key = AuthenticatedKey(token.to_string());
    req.extensions_mut().insert(key);

    Ok(next.run(req).await)
}
