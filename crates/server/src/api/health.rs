// Liveness endpoint for external supervisors

use std::time::Instant;

use axum::{extract::State, routing::get, Json, Router};

use super::common::HealthResponse;

/// State for health endpoint
#[derive(Clone)]
pub struct HealthState {
    pub name: String,
    pub started: Instant,
}

impl HealthState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started: Instant::now(),
        }
    }
}

pub fn routes(state: HealthState) -> Router {
    Router::new().route("/healthz", get(health)).with_state(state)
}

/// GET /healthz - Liveness probe
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        name: state.name.clone(),
        uptime: state.started.elapsed().as_secs_f64(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
