/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::fixtures::TestFixture;
use chrono::{Duration, Utc};
use nixopus_models::models::{HealthCheckChangeset, HealthStatus};
use nixopus_server::healthcheck::ProbeOutcome;

fn healthy(ms: i32) -> ProbeOutcome {
    ProbeOutcome {
        status: HealthStatus::Healthy,
        status_code: 200,
        response_time_ms: Some(ms),
        error_message: String::new(),
    }
}

fn failed() -> ProbeOutcome {
    ProbeOutcome::error("connection refused", None)
}

#[test]
fn test_list_is_newest_first_and_limited() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    let app = fixture.insert_test_application(org.id, None);
    let check = fixture.insert_test_health_check(&app);
    let start = Utc::now() - Duration::hours(1);
    for i in 0..5 {
        fixture.record(&check, healthy(10 + i), start + Duration::minutes(i.into()));
    }

    let results = fixture
        .dal
        .health_check_results()
        .list(check.id, 3, None, None)
        .expect("Failed to list results");
    assert_eq!(results.len(), 3);
    assert!(results.windows(2).all(|w| w[0].checked_at >= w[1].checked_at));
    assert_eq!(results[0].response_time_ms, Some(14));
}

#[test]
fn test_list_respects_time_window() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    let app = fixture.insert_test_application(org.id, None);
    let check = fixture.insert_test_health_check(&app);
    let start = Utc::now() - Duration::hours(3);
    for i in 0..3 {
        fixture.record(&check, healthy(20), start + Duration::hours(i));
    }

    let window = fixture
        .dal
        .health_check_results()
        .list(
            check.id,
            100,
            Some(start + Duration::minutes(30)),
            Some(start + Duration::minutes(90)),
        )
        .expect("Failed to list results");
    assert_eq!(window.len(), 1);
}

#[test]
fn test_stats_since_aggregates_window() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    let app = fixture.insert_test_application(org.id, None);
    let check = fixture.insert_test_health_check(&app);
    let now = Utc::now();

    fixture.record(&check, healthy(100), now - Duration::hours(30));
    fixture.record(&check, healthy(100), now - Duration::hours(2));
    fixture.record(&check, healthy(300), now - Duration::hours(1));
    fixture.record(&check, failed(), now - Duration::minutes(30));

    let stats = fixture
        .dal
        .health_check_results()
        .stats_since(check.id, now - Duration::hours(24))
        .expect("Failed to compute stats");
    assert_eq!(stats.total_checks, 3);
    assert_eq!(stats.successful_checks, 2);
    assert_eq!(stats.failed_checks, 1);
    assert!((stats.avg_response_time_ms - 200.0).abs() < f64::EPSILON);
}

#[test]
fn test_expired_results_use_each_checks_retention() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    let short_app = fixture.insert_test_application(org.id, None);
    let long_app = fixture.insert_test_application(org.id, None);
    let short = fixture.insert_test_health_check(&short_app);
    let long = fixture.insert_test_health_check(&long_app);
    fixture
        .dal
        .health_checks()
        .update(
            org.id,
            short_app.id,
            &HealthCheckChangeset {
                retention_days: Some(1),
                ..Default::default()
            },
        )
        .expect("Failed to update retention");

    let now = Utc::now();
    fixture.record(&short, healthy(10), now - Duration::days(3));
    fixture.record(&short, healthy(10), now - Duration::hours(1));
    fixture.record(&long, healthy(10), now - Duration::days(3));

    let deleted = fixture
        .dal
        .health_check_results()
        .delete_expired_for_organization(org.id, now)
        .expect("Failed to delete expired results");
    assert_eq!(deleted, 1);
    assert_eq!(fixture.dal.health_check_results().count(short.id).expect("count"), 1);
    assert_eq!(fixture.dal.health_check_results().count(long.id).expect("count"), 1);
}
