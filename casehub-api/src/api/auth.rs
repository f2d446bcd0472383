//! User registration and token issuance

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::Row;
use uuid::Uuid;

use casehub_common::auth::{
    hash_password, verify_password, TokenKind, ACCESS_TOKEN_TTL_MS, REFRESH_TOKEN_TTL_MS,
};
use casehub_common::db::models::{User, UserProfile};
use casehub_common::time::now_ms;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub mobile_number: String,
    #[serde(default)]
    pub designation: Option<String>,
}

fn valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

fn valid_mobile(mobile: &str) -> bool {
    mobile.len() == 10 && mobile.chars().all(|c| c.is_ascii_digit())
}

async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let email = body.email.trim().to_lowercase();
    if !valid_email(&email) {
        return Err(ApiError::invalid("Invalid email address"));
    }
    if body.password.len() < 8 {
        return Err(ApiError::invalid("Password must be at least 8 characters"));
    }
    if body.name.trim().is_empty() {
        return Err(ApiError::invalid("Name is required"));
    }
    if !valid_mobile(&body.mobile_number) {
        return Err(ApiError::invalid("Mobile number must be 10 digits"));
    }

    let existing: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM users WHERE email = ? OR mobile_number = ?",
    )
    .bind(&email)
    .bind(&body.mobile_number)
    .fetch_one(&state.db)
    .await?;
    if existing > 0 {
        return Err(ApiError::invalid(
            "An account with this email or mobile number already exists",
        ));
    }

    let guid = Uuid::new_v4().to_string();
    let password_hash = hash_password(&body.password)?;
    sqlx::query(
        "INSERT INTO users (guid, email, password_hash, name, mobile_number, designation, role, created_at)
         VALUES (?, ?, ?, ?, ?, ?, 'user', ?)",
    )
    .bind(&guid)
    .bind(&email)
    .bind(&password_hash)
    .bind(body.name.trim())
    .bind(&body.mobile_number)
    .bind(&body.designation)
    .bind(now_ms())
    .execute(&state.db)
    .await?;

    tracing::info!("Registered user {}", guid);
    Ok(Json(json!({
        "message": "User registered successfully",
        "user_id": guid,
    })))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Email address or 10-digit mobile number
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserProfile,
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let identifier = body.identifier.trim().to_lowercase();
    let row = sqlx::query("SELECT * FROM users WHERE email = ? OR mobile_number = ?")
        .bind(&identifier)
        .bind(&identifier)
        .fetch_optional(&state.db)
        .await?;

    let Some(row) = row else {
        return Err(ApiError::unauthorized("Invalid credentials"));
    };
    let user = User {
        guid: row.get("guid"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        name: row.get("name"),
        mobile_number: row.get("mobile_number"),
        designation: row.get("designation"),
        role: row.get("role"),
        created_at: row.get("created_at"),
    };
    if !verify_password(&body.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let access_token = state
        .tokens
        .issue(&user.guid, TokenKind::Access, ACCESS_TOKEN_TTL_MS);
    let refresh_token = state
        .tokens
        .issue(&user.guid, TokenKind::Refresh, REFRESH_TOKEN_TTL_MS);

    Ok(Json(LoginResponse {
        access_token,
        refresh_token,
        user: UserProfile::from(&user),
    }))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let claims = state
        .tokens
        .decode(&body.refresh_token)
        .map_err(|_| ApiError::forbidden("Invalid or expired refresh token"))?;
    if claims.kind != TokenKind::Refresh {
        return Err(ApiError::forbidden("Not a refresh token"));
    }

    let access_token = state
        .tokens
        .issue(&claims.user_id, TokenKind::Access, ACCESS_TOKEN_TTL_MS);
    Ok(Json(json!({ "access_token": access_token })))
}

/// Tokens are stateless; logout exists so clients have a uniform flow
async fn logout() -> Json<serde_json::Value> {
    Json(json!({ "message": "Logged out" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(valid_email("someone@example.com"));
        assert!(valid_email("a.b+c@sub.domain.org"));
        assert!(!valid_email("no-at-sign"));
        assert!(!valid_email("@example.com"));
        assert!(!valid_email("user@nodot"));
        assert!(!valid_email("user@.com"));
    }

    #[test]
    fn test_mobile_validation() {
        assert!(valid_mobile("9876543210"));
        assert!(!valid_mobile("98765"));
        assert!(!valid_mobile("98765432101"));
        assert!(!valid_mobile("98765abcde"));
    }
}
