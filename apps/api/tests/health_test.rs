//! Integration tests for health check endpoints

mod common;

use axum::http::StatusCode;
use btecify_api::routes::{health_router, HealthState};
use btecify_api::services::HealthService;
use common::{get, json_body, test_registry};

fn app() -> axum::Router {
    health_router(HealthState::new(HealthService::registry_only(test_registry())))
}

#[tokio::test]
async fn test_simple_health_check() {
    let response = get(app(), "/").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn test_liveness_probe() {
    let body = json_body(get(app(), "/live").await, StatusCode::OK).await;
    assert_eq!(body["status"], "alive");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_readiness_reports_services() {
    let body = json_body(get(app(), "/ready").await, StatusCode::OK).await;

    assert_eq!(body["status"], "healthy");
    let services = body["services"].as_array().unwrap();
    let status_of = |name: &str| {
        services
            .iter()
            .find(|s| s["name"] == name)
            .map(|s| s["status"].clone())
            .unwrap()
    };
    assert_eq!(status_of("database"), "skipped");
    assert_eq!(status_of("extractor"), "skipped");
    assert_eq!(status_of("jobs"), "healthy");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let response = get(app(), "/nonexistent").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
