//! HTTP request handlers for the Postdate API.
//!
//! Handlers follow a consistent pattern: input validation with appropriate
//! error codes, tracing for observability, and standardized error responses.
//!
//! # Handler Organization
//!
//! - `sweep` - manual sweep triggering
//! - `items` - owner-facing CRUD over scheduled deliveries
//! - `events` - realtime sweep completion stream
//! - `health` - health and liveness probes
//!
//! # Error Handling
//!
//! All handlers return a standardized error body with a stable machine
//! readable code and a human-readable message, plus the appropriate HTTP
//! status.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;

pub mod events;
pub mod health;
pub mod items;
pub mod sweep;

/// Error response with code and message.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error details including code and message.
    pub error: ErrorDetail,
}

/// Detailed error information.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable error description.
    pub message: String,
}

/// Creates a standardized error response.
pub(crate) fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    let body = ErrorResponse {
        error: ErrorDetail { code: code.to_string(), message: message.into() },
    };
    (status, Json(body)).into_response()
}
