/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::fixtures::TestFixture;
use chrono::{Duration, Utc};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use nixopus_models::models::{
    EffectiveState, HealthCheckChangeset, HealthStatus, NewHealthCheck,
};
use nixopus_server::dal::DalError;
use nixopus_server::healthcheck::ProbeOutcome;
use uuid::Uuid;

fn outcome(status: HealthStatus) -> ProbeOutcome {
    ProbeOutcome {
        status,
        status_code: if status.is_healthy() { 200 } else { 503 },
        response_time_ms: Some(12),
        error_message: if status.is_healthy() {
            String::new()
        } else {
            "unexpected status code 503".into()
        },
    }
}

#[test]
fn test_create_and_get_health_check() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    let app = fixture.insert_test_application(org.id, Some("app.example.com"));

    let created = fixture.insert_test_health_check(&app);
    assert_eq!(created.application_id, app.id);
    assert_eq!(created.endpoint, "/");
    assert_eq!(created.consecutive_fails, 0);
    assert!(created.last_checked_at.is_none());
    assert_eq!(created.effective_state(), EffectiveState::Unknown);

    let fetched = fixture
        .dal
        .health_checks()
        .get_by_application(org.id, app.id)
        .expect("Failed to get health check")
        .expect("Health check should exist");
    assert_eq!(fetched.id, created.id);
}

#[test]
fn test_second_check_for_application_is_unique_violation() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    let app = fixture.insert_test_application(org.id, None);
    fixture.insert_test_health_check(&app);

    let result = fixture
        .dal
        .health_checks()
        .create(&NewHealthCheck::with_defaults(app.id, org.id));
    assert!(matches!(
        result,
        Err(DalError::Query(DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            _
        )))
    ));
}

#[test]
fn test_lookup_is_scoped_to_organization() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    let other = fixture.insert_test_organization();
    let app = fixture.insert_test_application(org.id, None);
    fixture.insert_test_health_check(&app);

    let found = fixture
        .dal
        .health_checks()
        .get_by_application(other.id, app.id)
        .expect("Failed to query");
    assert!(found.is_none());
    assert_eq!(
        fixture.dal.health_checks().delete(other.id, app.id).expect("delete"),
        0
    );
}

#[test]
fn test_toggle_preserves_counters_and_last_checked() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    let app = fixture.insert_test_application(org.id, None);
    let check = fixture.insert_test_health_check(&app);

    let now = Utc::now();
    fixture.record(&check, outcome(HealthStatus::Unhealthy), now - Duration::seconds(120));
    fixture.record(&check, outcome(HealthStatus::Unhealthy), now - Duration::seconds(60));

    let disabled = fixture
        .dal
        .health_checks()
        .set_enabled(org.id, app.id, false)
        .expect("Failed to toggle")
        .expect("Health check should exist");
    assert!(!disabled.enabled);
    assert_eq!(disabled.consecutive_fails, 2);
    assert!(disabled.last_checked_at.is_some());

    let enabled = fixture
        .dal
        .health_checks()
        .set_enabled(org.id, app.id, true)
        .expect("Failed to toggle")
        .expect("Health check should exist");
    assert!(enabled.enabled);
    assert_eq!(enabled.consecutive_fails, 2);
    assert_eq!(enabled.last_checked_at, disabled.last_checked_at);
}

#[test]
fn test_update_changes_only_present_fields() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    let app = fixture.insert_test_application(org.id, None);
    let check = fixture.insert_test_health_check(&app);

    let changes = HealthCheckChangeset {
        endpoint: Some("/healthz".into()),
        interval_seconds: Some(300),
        ..Default::default()
    };
    let updated = fixture
        .dal
        .health_checks()
        .update(org.id, app.id, &changes)
        .expect("Failed to update")
        .expect("Health check should exist");
    assert_eq!(updated.endpoint, "/healthz");
    assert_eq!(updated.interval_seconds, 300);
    assert_eq!(updated.method, check.method);
    assert_eq!(updated.timeout_seconds, check.timeout_seconds);

    let missing = fixture
        .dal
        .health_checks()
        .update(org.id, Uuid::new_v4(), &changes)
        .expect("Failed to update");
    assert!(missing.is_none());
}

#[test]
fn test_delete_cascades_to_results() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    let app = fixture.insert_test_application(org.id, None);
    let check = fixture.insert_test_health_check(&app);
    fixture.record(&check, outcome(HealthStatus::Healthy), Utc::now());

    assert_eq!(fixture.dal.health_check_results().count(check.id).expect("count"), 1);
    assert_eq!(fixture.dal.health_checks().delete(org.id, app.id).expect("delete"), 1);
    assert_eq!(fixture.dal.health_check_results().count(check.id).expect("count"), 0);

    // Deleting again is a no-op.
    assert_eq!(fixture.dal.health_checks().delete(org.id, app.id).expect("delete"), 0);
}

#[test]
fn test_record_probe_drives_counters_and_state() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    let app = fixture.insert_test_application(org.id, None);
    let check = fixture.insert_test_health_check(&app);
    let start = Utc::now() - Duration::minutes(10);

    let mut last = None;
    for i in 0..3 {
        let record = fixture
            .dal
            .health_checks()
            .record_probe(
                check.id,
                &outcome(HealthStatus::Unhealthy),
                start + Duration::minutes(i),
            )
            .expect("Failed to record probe");
        last = Some(record);
    }
    let record = last.expect("three probes recorded");
    assert_eq!(record.after.consecutive_fails, 3);
    assert_eq!(record.before.effective_state(), EffectiveState::Up);
    assert_eq!(record.after.effective_state(), EffectiveState::Down);
    assert_eq!(record.result.status, "unhealthy");
    assert_eq!(record.result.status_code, 503);

    let recovered = fixture
        .dal
        .health_checks()
        .record_probe(check.id, &outcome(HealthStatus::Healthy), start + Duration::minutes(3))
        .expect("Failed to record probe");
    assert_eq!(recovered.after.consecutive_fails, 0);
    assert_eq!(recovered.after.consecutive_successes, 1);
    assert_eq!(recovered.after.effective_state(), EffectiveState::Up);
    assert_eq!(fixture.dal.health_check_results().count(check.id).expect("count"), 4);
}

#[test]
fn test_record_probe_never_moves_checked_at_backwards() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    let app = fixture.insert_test_application(org.id, None);
    let check = fixture.insert_test_health_check(&app);

    let later = Utc::now();
    let first = fixture
        .dal
        .health_checks()
        .record_probe(check.id, &outcome(HealthStatus::Healthy), later)
        .expect("Failed to record probe");
    let second = fixture
        .dal
        .health_checks()
        .record_probe(
            check.id,
            &outcome(HealthStatus::Healthy),
            later - Duration::seconds(30),
        )
        .expect("Failed to record probe");

    assert!(second.result.checked_at >= first.result.checked_at);
    assert_eq!(second.after.last_checked_at, first.after.last_checked_at);
}

#[test]
fn test_list_enabled_joins_domain_and_skips_disabled() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    let with_domain = fixture.insert_test_application(org.id, Some("shop.example.com"));
    let disabled_app = fixture.insert_test_application(org.id, None);
    let enabled = fixture.insert_test_health_check(&with_domain);
    fixture.insert_test_health_check(&disabled_app);
    fixture
        .dal
        .health_checks()
        .set_enabled(org.id, disabled_app.id, false)
        .expect("Failed to toggle");

    let candidates = fixture
        .dal
        .health_checks()
        .list_enabled_with_domain()
        .expect("Failed to list");
    let ours: Vec<_> = candidates
        .iter()
        .filter(|c| c.check.organization_id == org.id)
        .collect();
    assert_eq!(ours.len(), 1);
    assert_eq!(ours[0].check.id, enabled.id);
    assert_eq!(ours[0].domain.as_deref(), Some("shop.example.com"));
}
