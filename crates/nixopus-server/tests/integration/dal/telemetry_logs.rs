/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::fixtures::TestFixture;
use chrono::{Duration, Utc};
use nixopus_models::models::{NewApplicationLog, NewAuditLog, SettingsData};
use nixopus_server::scheduler::{DeploymentLogsCleanup, Scheduler, SchedulerConfig, SettingsResolver};
use std::sync::Arc;

#[test]
fn test_application_logs_are_deleted_per_organization() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    let other = fixture.insert_test_organization();
    let app = fixture.insert_test_application(org.id, None);
    let other_app = fixture.insert_test_application(other.id, None);
    let now = Utc::now();

    for (application_id, age) in [(app.id, 40), (app.id, 1), (other_app.id, 40)] {
        fixture
            .dal
            .telemetry_logs()
            .insert_application_log(&NewApplicationLog {
                application_id,
                log: "build step".into(),
                created_at: now - Duration::days(age),
            })
            .expect("Failed to insert log");
    }

    let deleted = fixture
        .dal
        .telemetry_logs()
        .delete_application_logs_before(org.id, now - Duration::days(30))
        .expect("Failed to delete logs");
    assert_eq!(deleted, 1);
    assert_eq!(fixture.dal.telemetry_logs().count_application_logs(app.id).expect("count"), 1);
    assert_eq!(
        fixture.dal.telemetry_logs().count_application_logs(other_app.id).expect("count"),
        1
    );
}

#[test]
fn test_audit_log_cutoff_is_exclusive() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    let cutoff = Utc::now() - Duration::days(30);

    for created_at in [cutoff - Duration::seconds(1), cutoff + Duration::seconds(1)] {
        fixture
            .dal
            .telemetry_logs()
            .insert_audit_log(&NewAuditLog {
                organization_id: org.id,
                action: "login".into(),
                created_at,
            })
            .expect("Failed to insert audit log");
    }

    let deleted = fixture
        .dal
        .telemetry_logs()
        .delete_audit_logs_before(org.id, cutoff)
        .expect("Failed to delete audit logs");
    assert_eq!(deleted, 1);
    assert_eq!(fixture.dal.telemetry_logs().count_audit_logs(org.id).expect("count"), 1);
}

#[tokio::test]
async fn test_sweep_applies_organization_retention() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    let app = fixture.insert_test_application(org.id, None);
    fixture
        .dal
        .organization_settings()
        .merge(
            org.id,
            &SettingsData {
                deployment_logs_retention_days: Some(7),
                ..Default::default()
            },
        )
        .expect("Failed to merge settings");

    let now = Utc::now();
    for age in [10, 8, 3] {
        fixture
            .dal
            .telemetry_logs()
            .insert_application_log(&NewApplicationLog {
                application_id: app.id,
                log: format!("{} days old", age),
                created_at: now - Duration::days(age),
            })
            .expect("Failed to insert log");
    }

    let resolver = Arc::new(SettingsResolver::new(Arc::new(fixture.dal.clone())));
    let mut scheduler = Scheduler::new(resolver, SchedulerConfig::default());
    scheduler.register(Arc::new(DeploymentLogsCleanup::new(Arc::new(fixture.dal.clone()))));

    let report = scheduler.run_now().await.expect("Sweep failed");
    assert_eq!(report.failures(), 0);
    let outcome = report
        .outcomes_for("deployment_logs_cleanup")
        .find(|o| o.organization_id == org.id)
        .expect("Outcome for our organization");
    assert_eq!(outcome.affected, 2);
    assert_eq!(fixture.dal.telemetry_logs().count_application_logs(app.id).expect("count"), 1);
}
