//! API error handling with the structured rejection body.
//!
//! Expected client failures (no cookie, unknown view, bad body) are ordinary
//! typed results; only genuinely unexpected faults take the internal path,
//! and those keep their detail in the logs unless debug mode is on.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::auth::AuthError;

/// API error type with structured responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Please login")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// Wrap an unexpected fault. The error chain reaches the client only in
    /// debug mode; otherwise the body carries a generic message and the
    /// chain stays in the logs.
    pub fn internal(err: anyhow::Error, debug: bool) -> Self {
        error!(error = ?err, "internal error");
        if debug {
            Self::Internal(format!("{err:?}"))
        } else {
            Self::Internal("Internal server error".to_string())
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Structured rejection body, shared by the HTTP surface and the WebSocket
/// handshake refusal frame.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();
        debug!(code = status.as_u16(), %message, "request rejected");
        let body = ErrorBody {
            error: message,
            code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(_: AuthError) -> Self {
        ApiError::Unauthorized
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
