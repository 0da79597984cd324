//! Liveness/readiness HTTP surface.
//!
//! Exposes a single `/health` endpoint reporting whether the process has
//! completed startup and whether its durable queue connection (if any) is
//! reachable. Kept deliberately thin relative to the mesh's full health
//! monitor: this pipeline has one process-wide health signal, not a
//! per-service registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::config::HealthConfig;

#[derive(Clone, Default)]
pub struct HealthState {
    ready: Arc<AtomicBool>,
    queue_connected: Arc<AtomicBool>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn set_queue_connected(&self, connected: bool) {
        self.queue_connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    queue_connected: bool,
}

async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let ready = state.is_ready();
    let body = HealthBody {
        status: if ready { "ok" } else { "starting" },
        queue_connected: state.queue_connected.load(Ordering::SeqCst),
    };
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Binds and serves the health router until the process is cancelled.
pub async fn serve(
    config: &HealthConfig,
    state: HealthState,
    shutdown: tokio_util::sync::CancellationToken,
) -> std::io::Result<()> {
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "health endpoint listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_unready_before_mark_ready() {
        let state = HealthState::new();
        assert!(!state.is_ready());
        state.mark_ready();
        assert!(state.is_ready());
    }
}
