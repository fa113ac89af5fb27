/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use super::send;
use crate::fixtures::TestFixture;
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use nixopus_models::models::HealthStatus;
use nixopus_server::healthcheck::ProbeOutcome;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_create_health_check_with_defaults() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    let app = fixture.insert_test_application(org.id, Some("app.example.com"));
    let router = fixture.create_test_router();

    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/healthcheck",
        Some(org.id),
        Some(json!({"application_id": app.id, "endpoint": "/health"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    let data = &body["data"];
    assert_eq!(data["endpoint"], "/health");
    assert_eq!(data["method"], "GET");
    assert_eq!(data["timeout_seconds"], 30);
    assert_eq!(data["interval_seconds"], 60);
    assert_eq!(data["failure_threshold"], 3);
    assert_eq!(data["expected_status_codes"], json!([200]));
    assert_eq!(data["retention_days"], 30);
    assert_eq!(data["effective_state"], "unknown");
}

#[tokio::test]
async fn test_create_conflicts_and_missing_application() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    let app = fixture.insert_test_application(org.id, None);
    let router = fixture.create_test_router();
    let create = json!({"application_id": app.id});

    let (first, _) = send(&router, "POST", "/api/v1/healthcheck", Some(org.id), Some(create.clone())).await;
    assert_eq!(first, StatusCode::OK);

    let (second, body) = send(&router, "POST", "/api/v1/healthcheck", Some(org.id), Some(create)).await;
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(body["status"], "error");

    let (missing, body) = send(
        &router,
        "POST",
        "/api/v1/healthcheck",
        Some(org.id),
        Some(json!({"application_id": Uuid::new_v4()})),
    )
    .await;
    assert_eq!(missing, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "application not found");

    // Another organization's application looks missing.
    let other = fixture.insert_test_organization();
    let (foreign, _) = send(
        &router,
        "POST",
        "/api/v1/healthcheck",
        Some(other.id),
        Some(json!({"application_id": app.id})),
    )
    .await;
    assert_eq!(foreign, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_rejects_invalid_input() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    let app = fixture.insert_test_application(org.id, None);
    let router = fixture.create_test_router();

    let cases = [
        (json!({"application_id": app.id, "timeout_seconds": 1}), "timeout_seconds must be between 5 and 120"),
        (json!({"application_id": app.id, "method": "DELETE"}), "method must be one of GET, POST, HEAD"),
        (json!({"application_id": app.id, "endpoint": "health"}), "endpoint must be a path starting with / or an absolute http(s) URL"),
        (json!({"application_id": "nope"}), "invalid application id"),
    ];
    for (payload, message) in cases {
        let (status, body) = send(&router, "POST", "/api/v1/healthcheck", Some(org.id), Some(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], message);
    }

    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/healthcheck",
        None,
        Some(json!({"application_id": app.id})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing organization id");
}

#[tokio::test]
async fn test_get_returns_null_without_check() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    let app = fixture.insert_test_application(org.id, None);
    let router = fixture.create_test_router();

    let uri = format!("/api/v1/healthcheck?application_id={}", app.id);
    let (status, body) = send(&router, "GET", &uri, Some(org.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn test_update_toggle_and_delete() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    let app = fixture.insert_test_application(org.id, None);
    let check = fixture.insert_test_health_check(&app);
    fixture.record(
        &check,
        ProbeOutcome::error("connection refused", None),
        Utc::now() - Duration::minutes(1),
    );
    let router = fixture.create_test_router();

    let (status, body) = send(
        &router,
        "PUT",
        "/api/v1/healthcheck",
        Some(org.id),
        Some(json!({"application_id": app.id, "interval_seconds": 120, "headers": {"X-Probe": "1"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["interval_seconds"], 120);
    assert_eq!(body["data"]["headers"], json!({"X-Probe": "1"}));
    assert_eq!(body["data"]["consecutive_fails"], 1);

    let (status, body) = send(
        &router,
        "PUT",
        "/api/v1/healthcheck",
        Some(org.id),
        Some(json!({"application_id": app.id, "interval_seconds": 10})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "interval_seconds must be between 30 and 3600");

    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/healthcheck/toggle",
        Some(org.id),
        Some(json!({"application_id": app.id, "enabled": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["enabled"], false);
    assert_eq!(body["data"]["consecutive_fails"], 1);
    assert!(!body["data"]["last_checked_at"].is_null());

    let uri = format!("/api/v1/healthcheck?application_id={}", app.id);
    let (status, _) = send(&router, "DELETE", &uri, Some(org.id), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&router, "DELETE", &uri, Some(org.id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &router,
        "PUT",
        "/api/v1/healthcheck",
        Some(org.id),
        Some(json!({"application_id": app.id, "interval_seconds": 120})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_results_and_stats() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    let app = fixture.insert_test_application(org.id, None);
    let check = fixture.insert_test_health_check(&app);
    let now = Utc::now();
    for (i, status) in [HealthStatus::Healthy, HealthStatus::Healthy, HealthStatus::Unhealthy, HealthStatus::Healthy]
        .into_iter()
        .enumerate()
    {
        fixture.record(
            &check,
            ProbeOutcome {
                status,
                status_code: if status.is_healthy() { 200 } else { 500 },
                response_time_ms: Some(100),
                error_message: String::new(),
            },
            now - Duration::minutes(40 - i as i64 * 10),
        );
    }
    let router = fixture.create_test_router();

    let uri = format!("/api/v1/healthcheck/results?application_id={}&limit=2", app.id);
    let (status, body) = send(&router, "GET", &uri, Some(org.id), None).await;
    assert_eq!(status, StatusCode::OK);
    let results = body["data"].as_array().expect("results array");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["status"], "healthy");
    assert_eq!(results[1]["status"], "unhealthy");

    let uri = format!("/api/v1/healthcheck/results?application_id={}&limit=5000", app.id);
    let (status, body) = send(&router, "GET", &uri, Some(org.id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "limit must be between 1 and 1000");

    let uri = format!("/api/v1/healthcheck/stats?application_id={}&period=1h", app.id);
    let (status, body) = send(&router, "GET", &uri, Some(org.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_checks"], 4);
    assert_eq!(body["data"]["successful_checks"], 3);
    assert_eq!(body["data"]["failed_checks"], 1);
    assert_eq!(body["data"]["uptime_percentage"], 75.0);

    let uri = format!("/api/v1/healthcheck/stats?application_id={}&period=soon", app.id);
    let (status, _) = send(&router, "GET", &uri, Some(org.id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/api/v1/healthcheck/stats?application_id={}", Uuid::new_v4());
    let (status, body) = send(&router, "GET", &uri, Some(org.id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "health check not found");
}
