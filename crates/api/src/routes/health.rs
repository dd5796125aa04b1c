use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use taskhub_jobs::Broker;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok` when the broker answers, `degraded` otherwise.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Jobs waiting for a worker; `null` when the broker is unreachable.
    pub queue_depth: Option<usize>,
}

/// GET /health -- returns service and broker health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let queue_depth = match state.broker.depth().await {
        Ok(depth) => Some(depth),
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not reach the broker");
            None
        }
    };

    Json(HealthResponse {
        status: if queue_depth.is_some() { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        queue_depth,
    })
}

/// Mount health check routes.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
