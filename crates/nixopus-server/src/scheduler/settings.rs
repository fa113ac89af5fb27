/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Organization settings resolution.
//!
//! Resolution never fails: a missing row is created with defaults and a
//! storage error degrades to [`ResolvedSettings::default`].

use crate::dal::{DalError, DAL};
use async_trait::async_trait;
use nixopus_models::models::{OrganizationSettings, ResolvedSettings, SettingsData};
use nixopus_utils::logging::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, organization_id: Uuid) -> Result<Option<SettingsData>, DalError>;
    async fn insert_default(&self, organization_id: Uuid) -> Result<(), DalError>;
    async fn merge(
        &self,
        organization_id: Uuid,
        patch: SettingsData,
    ) -> Result<SettingsData, DalError>;
    async fn list(&self) -> Result<Vec<(Uuid, SettingsData)>, DalError>;
}

/// Decodes a stored row, logging any fields that had to be skipped.
fn decoded(row: &OrganizationSettings) -> SettingsData {
    let (data, skipped) = row.decode();
    if !skipped.is_empty() {
        warn!(
            organization_id = %row.organization_id,
            fields = ?skipped,
            "Ignoring malformed organization settings fields"
        );
    }
    data
}

#[async_trait]
impl SettingsStore for DAL {
    async fn get(&self, organization_id: Uuid) -> Result<Option<SettingsData>, DalError> {
        self.run_blocking(move |dal| {
            Ok(dal
                .organization_settings()
                .get(organization_id)?
                .map(|row| decoded(&row)))
        })
        .await
    }

    async fn insert_default(&self, organization_id: Uuid) -> Result<(), DalError> {
        self.run_blocking(move |dal| {
            dal.organization_settings().insert_default(organization_id)?;
            Ok(())
        })
        .await
    }

    async fn merge(
        &self,
        organization_id: Uuid,
        patch: SettingsData,
    ) -> Result<SettingsData, DalError> {
        self.run_blocking(move |dal| {
            let merged = dal
                .organization_settings()
                .merge(organization_id, &patch)?;
            Ok(decoded(&merged))
        })
        .await
    }

    async fn list(&self) -> Result<Vec<(Uuid, SettingsData)>, DalError> {
        self.run_blocking(|dal| {
            Ok(dal
                .organization_settings()
                .list()?
                .into_iter()
                .map(|row| (row.organization_id, decoded(&row)))
                .collect())
        })
        .await
    }
}

pub struct SettingsResolver {
    store: Arc<dyn SettingsStore>,
}

impl SettingsResolver {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    /// Returns the organization's settings with defaults applied.
    pub async fn resolve(&self, organization_id: Uuid) -> ResolvedSettings {
        match self.fetch_or_create(organization_id).await {
            Ok(Some(data)) => data.resolve(),
            Ok(None) => ResolvedSettings::default(),
            Err(e) => {
                warn!(
                    org_id = %organization_id,
                    "Failed to load organization settings, using defaults: {}",
                    e
                );
                ResolvedSettings::default()
            }
        }
    }

    async fn fetch_or_create(&self, organization_id: Uuid) -> Result<Option<SettingsData>, DalError> {
        if let Some(data) = self.store.get(organization_id).await? {
            return Ok(Some(data));
        }
        self.store.insert_default(organization_id).await?;
        self.store.get(organization_id).await
    }

    /// Merges the fields present in `patch` into the stored record.
    pub async fn update(
        &self,
        organization_id: Uuid,
        patch: SettingsData,
    ) -> Result<ResolvedSettings, DalError> {
        Ok(self.store.merge(organization_id, patch).await?.resolve())
    }

    /// Every stored organization with its resolved settings.
    pub async fn list_all(&self) -> Result<Vec<(Uuid, ResolvedSettings)>, DalError> {
        Ok(self
            .store
            .list()
            .await?
            .into_iter()
            .map(|(id, data)| (id, data.resolve()))
            .collect())
    }
}
