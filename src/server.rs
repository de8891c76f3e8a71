//! Exporter HTTP surface and graceful shutdown.
//!
//! Serves `GET /metrics` (Prometheus text format) and `GET /health`
//! (JSON runtime diagnostics) from a small Axum router.
//! [`shutdown_signal`] handles SIGTERM / Ctrl+C.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::controller::Controller;
use crate::metrics;

pub struct ExporterState {
    pub controller: Arc<Controller>,
    pub start_time: Instant,
}

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub git: String,
    pub uptime_seconds: u64,
    pub config: ConfigHealth,
}

#[derive(Serialize, Deserialize)]
pub struct ConfigHealth {
    pub version: String,
    pub loaded_ago_seconds: u64,
    pub sync_interval: u64,
    pub managers: Vec<String>,
}

pub fn build_router(state: Arc<ExporterState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

async fn metrics_handler() -> String {
    metrics::gather()
}

async fn health_handler(State(state): State<Arc<ExporterState>>) -> Json<HealthResponse> {
    let info = state.controller.info().await;

    let config = info.map_or_else(
        || ConfigHealth {
            version: "none".to_string(),
            loaded_ago_seconds: 0,
            sync_interval: 0,
            managers: Vec::new(),
        },
        |info| ConfigHealth {
            version: info.config_version,
            loaded_ago_seconds: info.loaded_ago_seconds,
            sync_interval: info.sync_interval,
            managers: info.managers,
        },
    );

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git: env!("BUTLER_GIT_SHORT").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        config,
    })
}

/// Resolve once the process is asked to stop.
///
/// The agent is normally stopped by its supervisor via SIGTERM; Ctrl+C
/// covers interactive runs. A handler that cannot be installed is logged
/// and the other signal keeps working.
pub async fn shutdown_signal() {
    let interrupted = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminated = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "no SIGTERM handler, relying on Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminated = std::future::pending::<()>();

    tokio::select! {
        () = interrupted => tracing::info!("interrupt received, shutting down"),
        () = terminated => tracing::info!("termination requested, shutting down"),
    }
}
