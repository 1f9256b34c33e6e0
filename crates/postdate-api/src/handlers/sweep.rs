//! Manual sweep trigger.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, instrument};

use super::error_response;
use crate::AppState;

/// Runs one delivery sweep and returns the aggregate report.
///
/// Safe to call at any time and from any number of clients; the claim
/// mechanism makes redundant triggers harmless. A sweep that finds nothing
/// to do still returns 200 with a zeroed report.
///
/// # Errors
///
/// - 503: the store could not be queried for due items
#[instrument(name = "trigger_sweep", skip(state))]
pub async fn trigger_sweep(State(state): State<AppState>) -> Response {
    match state.scheduler.sweep().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            error!(error = %e, "Sweep failed");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", e.to_string())
        },
    }
}
