//! HTTP error responses
//!
//! Wraps the common error type so handlers can use `?` on database and
//! domain errors and still produce a JSON `{"error": ...}` body with the
//! right status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use casehub_common::Error;
use serde_json::json;

/// Handler error type; converts into a JSON error response
#[derive(Debug)]
pub struct ApiError(pub Error);

/// Handler result type
pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl<E> From<E> for ApiError
where
    E: Into<Error>,
{
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError(Error::NotFound(msg.into()))
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        ApiError(Error::InvalidInput(msg.into()))
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        ApiError(Error::Unauthorized(msg.into()))
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ApiError(Error::Forbidden(msg.into()))
    }

    pub fn payment(msg: impl Into<String>) -> Self {
        ApiError(Error::Payment(msg.into()))
    }
}

/// True when an insert failed on a UNIQUE constraint rather than an
/// infrastructure error
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|e| e.is_unique_violation())
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Error::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Error::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            Error::Payment(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            Error::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Error::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            Error::Io(e) => {
                tracing::error!("IO error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            Error::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
