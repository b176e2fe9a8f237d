//! API error type and the JSON envelope every endpoint answers with.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth;
use crate::validate::ValidationError;

// ── Response Types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Json<Self> {
        Json(Self {
            ok: true,
            data: Some(data),
            error: None,
        })
    }
}

pub fn error_response(status: StatusCode, msg: &str) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            ok: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// Anything a handler can fail with
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] uploader_core::Error),

    #[error("{0}")]
    BadRequest(String),

    #[error("Auth required")]
    Unauthorized,

    #[error("Invalid secret key")]
    InvalidSecret,

    #[error("Upload too large")]
    PayloadTooLarge,

    #[error("Range not satisfiable")]
    RangeNotSatisfiable { length: u64 },

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Task(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Validation(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
            ApiError::BadRequest(msg) => error_response(StatusCode::BAD_REQUEST, msg),
            ApiError::Store(e) if e.is_not_found() => {
                error_response(StatusCode::NOT_FOUND, "File not found")
            }
            ApiError::Store(e) if e.is_conflict() => {
                error_response(StatusCode::CONFLICT, "File already exists")
            }
            ApiError::Store(e) => {
                tracing::error!(error = %e, "Store operation failed");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            ApiError::Unauthorized => {
                let mut resp = error_response(StatusCode::UNAUTHORIZED, "Auth required");
                resp.headers_mut().insert(
                    header::SET_COOKIE,
                    HeaderValue::from_static(auth::CLEAR_SESSION_COOKIE),
                );
                resp
            }
            ApiError::InvalidSecret => {
                error_response(StatusCode::UNAUTHORIZED, "Invalid secret key")
            }
            ApiError::PayloadTooLarge => {
                error_response(StatusCode::PAYLOAD_TOO_LARGE, "Upload too large")
            }
            ApiError::RangeNotSatisfiable { length } => {
                let mut resp =
                    error_response(StatusCode::RANGE_NOT_SATISFIABLE, "Range not satisfiable");
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", length)) {
                    resp.headers_mut().insert(header::CONTENT_RANGE, value);
                }
                resp
            }
            ApiError::Task(msg) => {
                tracing::error!(error = msg.as_str(), "Blocking task failed");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

/// Errors that stop the server from starting
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to open record store: {0}")]
    Store(#[from] uploader_core::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
