//! API Server
//!
//! Wires the round engine, the broadcast gateway and the axum router, then
//! serves until Ctrl+C or SIGTERM.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::config::LiftoffConfig;
use crate::game::{spawn_engine, ChannelGateway, EngineHandle};
use crate::metrics::Metrics;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{signal, task::JoinHandle};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Install the global subscriber; `RUST_LOG` wins over the configured filter
pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    // A subscriber may already be installed (tests, embedding)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// A running engine plus the router that fronts it
pub struct App {
    pub router: axum::Router,
    pub engine: EngineHandle,
    pub engine_task: JoinHandle<()>,
}

/// Start the engine and build the router with the middleware stack.
/// Must be called inside a tokio runtime.
pub fn create_app(config: &LiftoffConfig) -> Result<App, prometheus::Error> {
    let metrics = Arc::new(Metrics::new()?);
    let gateway = ChannelGateway::new(config.server.event_buffer);
    let (engine, engine_task) = spawn_engine(config, Arc::new(gateway.clone()), Some(metrics.clone()));

    let state = Arc::new(AppState {
        engine: engine.clone(),
        gateway,
        metrics,
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    let router = create_router(state, config.monitoring.enable_metrics)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(create_cors_layer(&config.server.allowed_origins))
        .layer(TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs)))
        .layer(TraceLayer::new_for_http());

    Ok(App {
        router,
        engine,
        engine_task,
    })
}

pub struct ApiServer {
    config: LiftoffConfig,
}

impl ApiServer {
    pub fn new(config: LiftoffConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        init_tracing(&self.config.monitoring.log_filter);

        let addr = self.socket_addr()?;
        let App {
            router,
            engine,
            engine_task,
        } = create_app(&self.config)?;

        info!("🚀 Starting Liftoff crash game server");
        self.log_server_info(addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("✅ Listening on http://{}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        engine.shutdown().await;
        if let Err(e) = engine_task.await {
            warn!("round engine task ended abnormally: {}", e);
        }
        info!("🛑 Server stopped gracefully");
        Ok(())
    }

    fn socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((
            self.config.server.host.parse::<std::net::IpAddr>()?,
            self.config.server.port,
        )))
    }

    fn log_server_info(&self, addr: SocketAddr) {
        let round = &self.config.round;
        info!("📋 Server configuration:");
        info!("   Listen: {}", addr);
        info!("   CORS: {:?}", self.config.server.allowed_origins);
        info!("   Crash policy: {:?}", self.config.crash.policy);
        info!(
            "   Countdown: {}s, multiplier tick: {}ms, settle delay: {}ms",
            round.countdown_seconds, round.multiplier_tick_ms, round.settle_delay_ms
        );
        info!("📊 Endpoints: GET /ws, /health, /status, /history{}",
            if self.config.monitoring.enable_metrics { ", /metrics" } else { "" });
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    async fn get(app: &App, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
        let response = app
            .router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let request_id = response
            .headers()
            .get("x-request-id")
            .map(|v| v.to_str().unwrap().to_string());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, request_id, body.to_vec())
    }

    #[tokio::test]
    async fn test_health_and_status() {
        let app = create_app(&LiftoffConfig::default()).unwrap();
        app.engine.register("Alice").await.unwrap();

        let (status, request_id, body) = get(&app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(request_id.is_some());
        let health: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["status"], "ok");

        let (status, _, body) = get(&app, "/status").await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["phase"], "idle");
        assert_eq!(body["players"], 1);
        assert_eq!(body["connections"], 0);
    }

    #[tokio::test]
    async fn test_history_starts_empty() {
        let app = create_app(&LiftoffConfig::default()).unwrap();
        let (status, _, body) = get(&app, "/history").await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["recentGames"], serde_json::json!([]));
        assert_eq!(body["gameHistory"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_metrics_endpoint_toggle() {
        let app = create_app(&LiftoffConfig::default()).unwrap();
        let (status, _, body) = get(&app, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(body).unwrap().contains("liftoff_ws_connections"));

        let mut config = LiftoffConfig::default();
        config.monitoring.enable_metrics = false;
        let app = create_app(&config).unwrap();
        let (status, _, _) = get(&app, "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stopped_engine_reports_unavailable() {
        let app = create_app(&LiftoffConfig::default()).unwrap();
        app.engine.shutdown().await;
        let (status, _, body) = get(&app, "/status").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"]["code"], "ENGINE_UNAVAILABLE");
    }
}
