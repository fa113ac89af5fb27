/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::fixtures::TestFixture;
use diesel::prelude::*;
use nixopus_models::models::{SettingsData, DEFAULT_RETENTION_DAYS};
use nixopus_models::schema::organization_settings;
use serde_json::json;
use nixopus_server::scheduler::SettingsResolver;
use std::sync::Arc;

#[test]
fn test_insert_default_is_idempotent() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();

    assert_eq!(fixture.dal.organization_settings().insert_default(org.id).expect("insert"), 1);
    assert_eq!(fixture.dal.organization_settings().insert_default(org.id).expect("insert"), 0);

    let stored = fixture
        .dal
        .organization_settings()
        .get(org.id)
        .expect("Failed to get settings")
        .expect("Settings should exist");
    let resolved = stored.resolved();
    assert!(resolved.deployment_logs_cleanup_enabled);
    assert_eq!(resolved.deployment_logs_retention_days, DEFAULT_RETENTION_DAYS);
}

#[test]
fn test_merge_overwrites_only_present_fields() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();

    fixture
        .dal
        .organization_settings()
        .merge(
            org.id,
            &SettingsData {
                audit_logs_retention_days: Some(90),
                ..Default::default()
            },
        )
        .expect("Failed to merge");
    let merged = fixture
        .dal
        .organization_settings()
        .merge(
            org.id,
            &SettingsData {
                container_auto_prune_dangling_images: Some(true),
                ..Default::default()
            },
        )
        .expect("Failed to merge");

    let resolved = merged.resolved();
    assert_eq!(resolved.audit_logs_retention_days, 90);
    assert!(resolved.container_auto_prune_dangling_images);
    assert!(!resolved.container_auto_prune_build_cache);
}

#[test]
fn test_merge_keeps_valid_fields_beside_a_malformed_one() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    fixture
        .dal
        .organization_settings()
        .insert_default(org.id)
        .expect("Failed to insert settings");
    {
        let mut conn = fixture.dal.pool.get().expect("Failed to get connection");
        diesel::update(
            organization_settings::table
                .filter(organization_settings::organization_id.eq(org.id)),
        )
        .set(organization_settings::settings.eq(json!({
            "audit_logs_cleanup_enabled": false,
            "deployment_logs_retention_days": 90,
            "audit_logs_retention_days": "seven"
        })))
        .execute(&mut conn)
        .expect("Failed to store settings");
    }

    let merged = fixture
        .dal
        .organization_settings()
        .merge(
            org.id,
            &SettingsData {
                container_auto_prune_build_cache: Some(true),
                ..Default::default()
            },
        )
        .expect("Failed to merge");

    assert_eq!(
        merged.settings,
        json!({
            "audit_logs_cleanup_enabled": false,
            "deployment_logs_retention_days": 90,
            "container_auto_prune_build_cache": true
        })
    );
    let resolved = merged.resolved();
    assert!(!resolved.audit_logs_cleanup_enabled);
    assert_eq!(resolved.deployment_logs_retention_days, 90);
    assert_eq!(resolved.audit_logs_retention_days, DEFAULT_RETENTION_DAYS);
}

#[tokio::test]
async fn test_resolver_keeps_opt_out_beside_malformed_field() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    fixture
        .dal
        .organization_settings()
        .insert_default(org.id)
        .expect("Failed to insert settings");
    {
        let mut conn = fixture.dal.pool.get().expect("Failed to get connection");
        diesel::update(
            organization_settings::table
                .filter(organization_settings::organization_id.eq(org.id)),
        )
        .set(organization_settings::settings.eq(json!({
            "audit_logs_cleanup_enabled": false,
            "audit_logs_retention_days": "seven"
        })))
        .execute(&mut conn)
        .expect("Failed to store settings");
    }

    let resolver = SettingsResolver::new(Arc::new(fixture.dal.clone()));
    let resolved = resolver.resolve(org.id).await;
    assert!(!resolved.audit_logs_cleanup_enabled);
    assert_eq!(resolved.audit_logs_retention_days, DEFAULT_RETENTION_DAYS);
}

#[tokio::test]
async fn test_resolver_creates_missing_record() {
    let Some(fixture) = TestFixture::try_new() else { return };
    let org = fixture.insert_test_organization();
    let resolver = SettingsResolver::new(Arc::new(fixture.dal.clone()));

    let resolved = resolver.resolve(org.id).await;
    assert_eq!(resolved.extension_logs_retention_days, DEFAULT_RETENTION_DAYS);
    assert!(fixture
        .dal
        .organization_settings()
        .get(org.id)
        .expect("Failed to get settings")
        .is_some());
}
