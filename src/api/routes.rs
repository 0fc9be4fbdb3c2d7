//! Route Definitions

use super::{handlers::*, websocket::websocket_handler};
use axum::{routing::get, Router};
use std::sync::Arc;

/// Build the router; `/metrics` is mounted only when enabled
pub fn create_router(state: Arc<AppState>, enable_metrics: bool) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/history", get(history_handler))
        // Game traffic: commands in, events out
        .route("/ws", get(websocket_handler));

    if enable_metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.with_state(state)
}
