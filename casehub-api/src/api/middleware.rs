//! Authentication middleware
//!
//! `require_auth` rejects requests without a valid Bearer access token.
//! `optional_auth` lets everything through but tags the request with the
//! caller's resolved tier so catalog handlers can gate content.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use casehub_common::auth::TokenKind;

use crate::access::{resolve_access, UserAccess};
use crate::error::ApiError;
use crate::AppState;

/// The authenticated caller, inserted as a request extension
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Decode the Bearer token to a user id; None when absent or invalid
fn authenticated_user(state: &AppState, headers: &HeaderMap) -> Option<String> {
    let token = bearer_token(headers)?;
    let claims = state.tokens.decode(token).ok()?;
    if claims.kind != TokenKind::Access {
        return None;
    }
    Some(claims.user_id)
}

/// Reject unauthenticated requests with 401
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(user_id) = authenticated_user(&state, request.headers()) else {
        return Err(ApiError::unauthorized("Missing or invalid access token"));
    };
    let access = resolve_access(&state.db, Some(&user_id)).await?;
    request.extensions_mut().insert(CurrentUser { user_id });
    request.extensions_mut().insert(access);
    Ok(next.run(request).await)
}

/// Resolve the caller's tier; anonymous callers pass through as guests
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let access = match authenticated_user(&state, request.headers()) {
        Some(user_id) => resolve_access(&state.db, Some(&user_id)).await?,
        None => UserAccess::guest(),
    };
    request.extensions_mut().insert(access);
    Ok(next.run(request).await)
}
