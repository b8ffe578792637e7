//! Error types for referidos-api
//!
//! Every pipeline failure maps to exactly one variant. The payload is the
//! user-facing message; underlying causes are logged where they happen.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Malformed or missing input (400)
    #[error("{0}")]
    Validation(String),

    /// Missing or invalid token (401)
    #[error("{0}")]
    Unauthorized(String),

    /// Valid identity without the admin role (403)
    #[error("{0}")]
    Forbidden(String),

    /// Duplicate referred email or phone (409)
    #[error("{0}")]
    Conflict(String),

    /// Cooldown window still active (429)
    #[error("{0}")]
    RateLimited(String),

    /// Database or provider failure (500)
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError::Internal(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::Validation(m)
            | ApiError::Unauthorized(m)
            | ApiError::Forbidden(m)
            | ApiError::Conflict(m)
            | ApiError::RateLimited(m)
            | ApiError::Internal(m) => m,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "ok": false,
            "message": self.message(),
        }));

        (self.status(), body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
