//! API error handling.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    /// The body was not valid JSON.
    BadRequest(String),
    Validation(String),
    Busy,
    Spawn(String),
    PipelineFailed { code: Option<i32>, logs: String },
    Timeout,
    NotFound,
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Busy => StatusCode::CONFLICT,
            ApiError::Spawn(_) | ApiError::PipelineFailed { .. } | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::BadRequest(msg) => json!({ "ok": false, "error": "bad_request", "message": msg }),
            ApiError::Validation(msg) => json!({ "ok": false, "error": "validation", "message": msg }),
            ApiError::Busy => json!({
                "ok": false,
                "error": "busy",
                "message": "A render is already in progress"
            }),
            ApiError::Spawn(msg) => json!({ "ok": false, "error": "spawn_error", "message": msg }),
            ApiError::PipelineFailed { code, logs } => json!({
                "ok": false,
                "error": "pipeline_failed",
                "code": code,
                "logs": logs
            }),
            ApiError::Timeout => json!({
                "ok": false,
                "error": "timeout",
                "message": "Render timed out"
            }),
            ApiError::NotFound => json!({ "ok": false, "error": "not_found" }),
            ApiError::Internal(msg) => json!({ "ok": false, "error": "internal", "message": msg }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<listcast_core::Error> for ApiError {
    fn from(err: listcast_core::Error) -> Self {
        use listcast_core::Error;

        match err {
            Error::Validation(msg) => ApiError::Validation(msg),
            Error::Busy => ApiError::Busy,
            Error::Spawn(msg) => ApiError::Spawn(msg),
            Error::PipelineFailed { code } => ApiError::PipelineFailed {
                code,
                logs: String::new(),
            },
            Error::Timeout => ApiError::Timeout,
            _ => ApiError::Internal(err.to_string()),
        }
    }
}
