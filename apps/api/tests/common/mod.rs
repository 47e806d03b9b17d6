//! Shared helpers for API integration tests

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use btecify_jobs::{JobRegistry, SweepPolicy};
use tower::ServiceExt;

/// Registry with the default eviction policy
pub fn test_registry() -> JobRegistry {
    JobRegistry::new(SweepPolicy::default())
}

/// Send one request through `app`
pub async fn send(app: Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    send(app, Method::GET, uri, None).await
}

/// Read the body of `response` as JSON, asserting its status first
pub async fn json_body(response: Response, expected: StatusCode) -> serde_json::Value {
    assert_eq!(response.status(), expected);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
