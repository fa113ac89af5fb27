/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Data Access Layer for organization settings.
//!
//! Rows are created lazily: readers insert a defaults record on miss with
//! `ON CONFLICT DO NOTHING`, so concurrent first reads converge on one row.

use crate::dal::{DalError, DAL};
use chrono::Utc;
use diesel::prelude::*;
use nixopus_models::models::{NewOrganizationSettings, OrganizationSettings, SettingsData};
use nixopus_models::schema::organization_settings;
use uuid::Uuid;

/// Data Access Layer for OrganizationSettings operations.
pub struct OrganizationSettingsDAL<'a> {
    /// Reference to the main DAL instance.
    pub dal: &'a DAL,
}

impl OrganizationSettingsDAL<'_> {
    /// Retrieves the settings row for an organization.
    pub fn get(&self, organization_id: Uuid) -> Result<Option<OrganizationSettings>, DalError> {
        let conn = &mut self.dal.conn()?;
        Ok(organization_settings::table
            .filter(organization_settings::organization_id.eq(organization_id))
            .first(conn)
            .optional()?)
    }

    /// Inserts a defaults row unless one already exists.
    ///
    /// # Returns
    ///
    /// The number of rows inserted (0 when the row was already present).
    pub fn insert_default(&self, organization_id: Uuid) -> Result<usize, DalError> {
        let conn = &mut self.dal.conn()?;
        Ok(diesel::insert_into(organization_settings::table)
            .values(&NewOrganizationSettings::with_defaults(organization_id))
            .on_conflict(organization_settings::organization_id)
            .do_nothing()
            .execute(conn)?)
    }

    /// Lists every settings row.
    pub fn list(&self) -> Result<Vec<OrganizationSettings>, DalError> {
        let conn = &mut self.dal.conn()?;
        Ok(organization_settings::table
            .order(organization_settings::created_at.asc())
            .load(conn)?)
    }

    /// Merges `patch` into the stored record, creating it first if needed.
    ///
    /// Only fields present in the patch are overwritten. Stored fields that
    /// fail to parse are dropped; the rest are written back unchanged.
    pub fn merge(
        &self,
        organization_id: Uuid,
        patch: &SettingsData,
    ) -> Result<OrganizationSettings, DalError> {
        let conn = &mut self.dal.conn()?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::insert_into(organization_settings::table)
                .values(&NewOrganizationSettings::with_defaults(organization_id))
                .on_conflict(organization_settings::organization_id)
                .do_nothing()
                .execute(conn)?;

            let current: OrganizationSettings = organization_settings::table
                .filter(organization_settings::organization_id.eq(organization_id))
                .for_update()
                .first(conn)?;

            let mut data = current.data();
            data.merge(patch);

            diesel::update(organization_settings::table.find(current.id))
                .set((
                    organization_settings::settings.eq(data.to_value()),
                    organization_settings::updated_at.eq(Utc::now()),
                ))
                .get_result(conn)
        })
        .map_err(DalError::from)
    }
}
