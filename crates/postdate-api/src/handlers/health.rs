//! Health check handlers for service monitoring.
//!
//! Provides liveness and health endpoints with a store connectivity check
//! for orchestration systems.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, instrument};

use crate::AppState;

/// Health check response structure.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service health status.
    pub status: HealthStatus,
    /// Timestamp when health check was performed.
    pub timestamp: DateTime<Utc>,
    /// Individual component health checks.
    pub checks: HealthChecks,
    /// Service version information.
    pub version: String,
}

/// Overall health status enumeration.
#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational.
    Healthy,
    /// Critical systems failing.
    Unhealthy,
}

/// Individual component health check results.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Item store connectivity.
    pub store: ComponentHealth,
}

/// Health status for individual components.
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    /// Component status.
    pub status: ComponentStatus,
    /// Optional error message if unhealthy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Response time in milliseconds.
    pub response_time_ms: u64,
}

/// Component-level health status.
#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is healthy.
    Up,
    /// Component is experiencing issues.
    Down,
}

/// Health check endpoint handler.
///
/// Performs a lightweight store connectivity check. Designed to be called
/// frequently by orchestration systems and load balancers, so it avoids
/// expensive operations.
#[instrument(name = "health_check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Response {
    let timestamp = state.clock.now_utc();
    let start = state.clock.now();

    let (status, message) = match state.store.ping().await {
        Ok(()) => (ComponentStatus::Up, None),
        Err(e) => {
            error!("Store health check failed: {}", e);
            (ComponentStatus::Down, Some(format!("store connection failed: {e}")))
        },
    };
    let elapsed = state.clock.now().duration_since(start);
    let store = ComponentHealth {
        status,
        message,
        response_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
    };

    let (status, status_code) = match store.status {
        ComponentStatus::Up => (HealthStatus::Healthy, StatusCode::OK),
        ComponentStatus::Down => (HealthStatus::Unhealthy, StatusCode::SERVICE_UNAVAILABLE),
    };

    debug!(status = ?status, "Health check completed");

    let response = HealthResponse {
        status,
        timestamp,
        checks: HealthChecks { store },
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    (status_code, Json(response)).into_response()
}

/// Liveness check endpoint.
///
/// Returns a minimal response indicating the process is alive, without
/// testing external dependencies.
#[instrument(name = "liveness_check", skip(state))]
pub async fn liveness_check(State(state): State<AppState>) -> Response {
    let response = serde_json::json!({
        "status": "alive",
        "timestamp": state.clock.now_utc(),
        "service": "postdate-api",
    });
    (StatusCode::OK, Json(response)).into_response()
}
