//! API Error Handling
//!
//! HTTP error responses carrying the request id, plus the error body shared
//! with WebSocket command replies.

use crate::errors::EngineError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// VALIDATION_ERROR, STATE_ERROR, NOT_FOUND, ...
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }
}

impl From<&EngineError> for ErrorBody {
    fn from(err: &EngineError) -> Self {
        let message = match err {
            EngineError::Validation(message) | EngineError::State(message) => message.clone(),
            other => other.to_string(),
        };
        ErrorBody::new(err.code(), message)
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    InternalError(String),
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn internal_error(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::InternalError(message),
            request_id,
        }
    }

    /// Map an engine rejection onto an HTTP status
    pub fn from_engine(request_id: String, err: EngineError) -> Self {
        let message = err.to_string();
        let kind = match err {
            EngineError::Validation(_) => ApiErrorKind::BadRequest(message),
            EngineError::State(_) => ApiErrorKind::Conflict(message),
            EngineError::NotFound(_) => ApiErrorKind::NotFound(message),
            EngineError::Unavailable => ApiErrorKind::ServiceUnavailable(message),
        };
        Self { kind, request_id }
    }

    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match &self.kind {
            ApiErrorKind::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiErrorKind::BadRequest(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            ApiErrorKind::Conflict(msg) => (StatusCode::CONFLICT, "STATE_ERROR", msg),
            ApiErrorKind::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiErrorKind::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "ENGINE_UNAVAILABLE", msg),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (status, _, message) = self.parts();
        write!(f, "[{}] {}: {}", self.request_id, status, message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = Json(ErrorResponse {
            request_id: self.request_id.clone(),
            error: ErrorBody::new(code, message),
        });
        (status, body).into_response()
    }
}
