//! Health check routes
//!
//! - `GET /health` - plain liveness check
//! - `GET /health/live` - liveness probe with version
//! - `GET /health/ready` - readiness probe (database, extractor, jobs)

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};

use crate::services::HealthService;

/// Shared state for health handlers
#[derive(Clone)]
pub struct HealthState {
    pub health_service: HealthService,
}

impl HealthState {
    pub fn new(health_service: HealthService) -> Self {
        Self { health_service }
    }
}

pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/", get(simple_health))
        .route("/live", get(liveness_probe))
        .route("/ready", get(readiness_probe))
        .with_state(state)
}

async fn simple_health() -> &'static str {
    "OK"
}

/// Does not look at dependencies; that is what `/ready` is for
async fn liveness_probe() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `200` if every required dependency is healthy, `503` otherwise
async fn readiness_probe(State(state): State<HealthState>) -> impl IntoResponse {
    let response = state.health_service.check_all().await;

    let status_code = if response.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}
