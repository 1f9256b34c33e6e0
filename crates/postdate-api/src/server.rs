//! HTTP server configuration and request routing.
//!
//! Provides Axum server setup with middleware stack, graceful shutdown, and
//! the shared application state that ties the sweep scheduler, item store
//! and event hub together. Requests flow through middleware in order:
//! 1. Request ID generation
//! 2. Request/response tracing
//! 3. Timeout enforcement (30s default)
//! 4. Handler execution

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use postdate_core::{BroadcastHub, Clock};
use postdate_sweep::{ItemStore, SweepScheduler};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::handlers;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The sweep scheduler all trigger paths funnel into.
    pub scheduler: Arc<SweepScheduler>,
    /// Item store for the owner-facing CRUD surface.
    pub store: Arc<dyn ItemStore>,
    /// Event hub backing the realtime stream.
    pub hub: BroadcastHub,
    /// Time source for timestamps in responses.
    pub clock: Arc<dyn Clock>,
}

/// Creates the Axum router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/live", get(handlers::health::liveness_check));

    let api_routes = Router::new()
        .route("/sweep", post(handlers::sweep::trigger_sweep))
        .route("/items", post(handlers::items::create_item).get(handlers::items::list_items))
        .route(
            "/items/{id}",
            get(handlers::items::get_item)
                .patch(handlers::items::patch_item)
                .delete(handlers::items::delete_item),
        )
        .route("/events", get(handlers::events::event_stream));

    Router::new()
        .merge(health_routes)
        .merge(api_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(inject_request_id))
        .with_state(state)
}

/// Middleware to inject request ID into all responses.
///
/// Adds X-Request-Id header for tracing requests across services.
async fn inject_request_id(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();

    let mut req = req;
    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;

    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert("X-Request-Id", header_value);
    }

    response
}

/// Starts the HTTP server with graceful shutdown support.
///
/// Binds to the specified address and serves requests until a shutdown
/// signal is received.
///
/// # Errors
///
/// Returns `std::io::Error` if the port is already in use or the network
/// interface is unavailable.
pub async fn start_server(state: AppState, addr: SocketAddr) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("HTTP server listening on {}", actual_addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("HTTP server stopped gracefully");
    Ok(())
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received CTRL+C, starting graceful shutdown");
        },
        () = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    warn!("Waiting for in-flight requests to complete");
}
