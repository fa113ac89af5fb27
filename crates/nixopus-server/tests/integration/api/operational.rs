/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use tower::ServiceExt;

use crate::fixtures::TestFixture;

async fn get_text(fixture: &TestFixture, uri: &str) -> (StatusCode, String) {
    let response = fixture
        .create_test_router()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_healthz_endpoint() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let (status, body) = get_text(&fixture, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn test_readyz_endpoint() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let (status, body) = get_text(&fixture, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Ready");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let Some(fixture) = TestFixture::try_new() else { return };
    nixopus_server::metrics::record_probe("healthy", 0.01);
    let (status, body) = get_text(&fixture, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("nixopus_healthcheck_probes_total"));
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let (status, body) = get_text(&fixture, "/docs/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    let doc: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(doc["paths"]["/api/v1/healthcheck"].is_object());
}
