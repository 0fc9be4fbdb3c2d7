//! Request Handlers

use super::{errors::ApiError, middleware::RequestId, models::*};
use crate::game::{ChannelGateway, EngineHandle};
use crate::metrics::Metrics;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub engine: EngineHandle,
    pub gateway: ChannelGateway,
    pub metrics: Arc<Metrics>,
    pub version: String,
}

/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /status
pub async fn status_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, ApiError> {
    let status = state
        .engine
        .status()
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    Ok(Json(StatusResponse {
        status: "running".to_string(),
        version: state.version.clone(),
        phase: status.phase,
        players: status.players,
        rounds_played: status.rounds_played,
        connections: state.metrics.ws_connections.get(),
    }))
}

/// GET /history
pub async fn history_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let snapshot = state
        .engine
        .snapshot()
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    Ok(Json(HistoryResponse {
        recent_games: snapshot.recent_games,
        game_history: snapshot.game_history,
    }))
}

/// GET /metrics, Prometheus text format
pub async fn metrics_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let body = state
        .metrics
        .encode()
        .map_err(|e| ApiError::internal_error(request_id.0.clone(), format!("Failed to encode metrics: {}", e)))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response())
}
