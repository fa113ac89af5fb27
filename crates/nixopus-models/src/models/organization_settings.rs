/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Per-organization operational settings.
//!
//! The stored record is a sparse JSON object ([`SettingsData`]); every field is
//! optional so that older rows and partial writes stay valid. Readers work
//! with [`ResolvedSettings`], where defaults have been applied.

use crate::schema::organization_settings;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub const DEFAULT_RETENTION_DAYS: i32 = 30;

/// Sparse settings value as persisted in `organization_settings.settings`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SettingsData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_logs_cleanup_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_logs_retention_days: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_logs_cleanup_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_logs_retention_days: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_logs_cleanup_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_logs_retention_days: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_auto_prune_dangling_images: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_auto_prune_build_cache: Option<bool>,
}

/// Settings with every field filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResolvedSettings {
    pub deployment_logs_cleanup_enabled: bool,
    pub deployment_logs_retention_days: i32,
    pub audit_logs_cleanup_enabled: bool,
    pub audit_logs_retention_days: i32,
    pub extension_logs_cleanup_enabled: bool,
    pub extension_logs_retention_days: i32,
    pub container_auto_prune_dangling_images: bool,
    pub container_auto_prune_build_cache: bool,
}

impl Default for ResolvedSettings {
    fn default() -> Self {
        Self {
            deployment_logs_cleanup_enabled: true,
            deployment_logs_retention_days: DEFAULT_RETENTION_DAYS,
            audit_logs_cleanup_enabled: true,
            audit_logs_retention_days: DEFAULT_RETENTION_DAYS,
            extension_logs_cleanup_enabled: true,
            extension_logs_retention_days: DEFAULT_RETENTION_DAYS,
            container_auto_prune_dangling_images: false,
            container_auto_prune_build_cache: false,
        }
    }
}

/// Retention values below one day are not meaningful and fall back to the default.
fn retention_or(value: Option<i32>, default: i32) -> i32 {
    value.filter(|days| *days >= 1).unwrap_or(default)
}

impl SettingsData {
    /// Fills absent fields from the defaults.
    pub fn resolve(&self) -> ResolvedSettings {
        let d = ResolvedSettings::default();
        ResolvedSettings {
            deployment_logs_cleanup_enabled: self
                .deployment_logs_cleanup_enabled
                .unwrap_or(d.deployment_logs_cleanup_enabled),
            deployment_logs_retention_days: retention_or(
                self.deployment_logs_retention_days,
                d.deployment_logs_retention_days,
            ),
            audit_logs_cleanup_enabled: self
                .audit_logs_cleanup_enabled
                .unwrap_or(d.audit_logs_cleanup_enabled),
            audit_logs_retention_days: retention_or(
                self.audit_logs_retention_days,
                d.audit_logs_retention_days,
            ),
            extension_logs_cleanup_enabled: self
                .extension_logs_cleanup_enabled
                .unwrap_or(d.extension_logs_cleanup_enabled),
            extension_logs_retention_days: retention_or(
                self.extension_logs_retention_days,
                d.extension_logs_retention_days,
            ),
            container_auto_prune_dangling_images: self
                .container_auto_prune_dangling_images
                .unwrap_or(d.container_auto_prune_dangling_images),
            container_auto_prune_build_cache: self
                .container_auto_prune_build_cache
                .unwrap_or(d.container_auto_prune_build_cache),
        }
    }

    /// Overwrites the fields present in `patch`, leaving the rest untouched.
    pub fn merge(&mut self, patch: &SettingsData) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if patch.$field.is_some() { self.$field = patch.$field; })*
            };
        }
        take!(
            deployment_logs_cleanup_enabled,
            deployment_logs_retention_days,
            audit_logs_cleanup_enabled,
            audit_logs_retention_days,
            extension_logs_cleanup_enabled,
            extension_logs_retention_days,
            container_auto_prune_dangling_images,
            container_auto_prune_build_cache
        );
    }

    /// Parses a stored JSON value. Unknown keys are ignored.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }

    /// Decodes a stored document one field at a time.
    ///
    /// A field whose value does not parse reads as absent and its key is
    /// returned; the remaining fields keep their stored values. A document
    /// that is not an object decodes as empty and is reported as `settings`.
    pub fn from_value_lenient(value: &serde_json::Value) -> (Self, Vec<&'static str>) {
        let mut data = Self::default();
        let mut skipped = Vec::new();
        let Some(map) = value.as_object() else {
            return (data, vec!["settings"]);
        };
        macro_rules! decode {
            ($($field:ident),*) => {
                $(if let Some(raw) = map.get(stringify!($field)) {
                    match serde_json::from_value(raw.clone()) {
                        Ok(parsed) => data.$field = parsed,
                        Err(_) => skipped.push(stringify!($field)),
                    }
                })*
            };
        }
        decode!(
            deployment_logs_cleanup_enabled,
            deployment_logs_retention_days,
            audit_logs_cleanup_enabled,
            audit_logs_retention_days,
            extension_logs_cleanup_enabled,
            extension_logs_retention_days,
            container_auto_prune_dangling_images,
            container_auto_prune_build_cache
        );
        (data, skipped)
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }
}

/// A settings row from the database.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = organization_settings)]
pub struct OrganizationSettings {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrganizationSettings {
    /// The decoded settings value and the keys that failed to parse.
    pub fn decode(&self) -> (SettingsData, Vec<&'static str>) {
        SettingsData::from_value_lenient(&self.settings)
    }

    /// The decoded settings value; malformed fields read as absent.
    pub fn data(&self) -> SettingsData {
        self.decode().0
    }

    pub fn resolved(&self) -> ResolvedSettings {
        self.data().resolve()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = organization_settings)]
pub struct NewOrganizationSettings {
    pub organization_id: Uuid,
    pub settings: serde_json::Value,
}

impl NewOrganizationSettings {
    /// A settings row holding every default explicitly.
    pub fn with_defaults(organization_id: Uuid) -> Self {
        let d = ResolvedSettings::default();
        let data = SettingsData {
            deployment_logs_cleanup_enabled: Some(d.deployment_logs_cleanup_enabled),
            deployment_logs_retention_days: Some(d.deployment_logs_retention_days),
            audit_logs_cleanup_enabled: Some(d.audit_logs_cleanup_enabled),
            audit_logs_retention_days: Some(d.audit_logs_retention_days),
            extension_logs_cleanup_enabled: Some(d.extension_logs_cleanup_enabled),
            extension_logs_retention_days: Some(d.extension_logs_retention_days),
            container_auto_prune_dangling_images: Some(d.container_auto_prune_dangling_images),
            container_auto_prune_build_cache: Some(d.container_auto_prune_build_cache),
        };
        Self {
            organization_id,
            settings: data.to_value(),
        }
    }
}
