//! # HTTP Server
//!
//! Metrics and Kubernetes probe endpoints:
//! - `/metrics` - Prometheus metrics in text format
//! - `/healthz` - Liveness probe (always 200)
//! - `/readyz` - Readiness probe (200 once the controller is watching)

use crate::observability::metrics::REGISTRY;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, TextEncoder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Readiness flag shared with the watch loop
#[derive(Debug, Default)]
pub struct ServerState {
    pub is_ready: Arc<AtomicBool>,
}

impl ServerState {
    pub fn ready(&self) -> bool {
        self.is_ready.load(Ordering::Relaxed)
    }

    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::Relaxed);
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the process exits, marking the server ready once bound
///
/// # Errors
///
/// Returns an error if the port cannot be bound or the server fails.
pub async fn start_server(port: u16, state: Arc<ServerState>) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);
    state.set_ready(true);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn status_of(state: Arc<ServerState>, uri: &str) -> StatusCode {
        router(state)
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request should build in test"),
            )
            .await
            .expect("router should respond in test")
            .status()
    }

    #[tokio::test]
    async fn test_readyz_follows_ready_flag() {
        let state = Arc::new(ServerState::default());
        assert_eq!(
            status_of(Arc::clone(&state), "/readyz").await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        state.set_ready(true);
        assert_eq!(status_of(state, "/readyz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_healthz_and_metrics_respond() {
        let state = Arc::new(ServerState::default());
        assert_eq!(status_of(Arc::clone(&state), "/healthz").await, StatusCode::OK);
        assert_eq!(status_of(state, "/metrics").await, StatusCode::OK);
    }
}
