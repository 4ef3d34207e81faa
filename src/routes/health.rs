use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::SharedState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub active_audits: usize,
    pub detached_failures: usize,
    pub missing_keys: Vec<&'static str>,
}

/// GET /health
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let missing_keys = state.config.missing_keys();
    Json(HealthResponse {
        status: if missing_keys.is_empty() { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        active_audits: state.tracker.active().await.len(),
        detached_failures: state.detached.failure_count(),
        missing_keys,
    })
}
