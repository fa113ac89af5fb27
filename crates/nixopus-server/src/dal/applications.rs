/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Data Access Layer for organizations and applications.
//!
//! Both tables are owned by collaborators. The control plane creates rows
//! only from fixtures and tooling; everything else here is a lookup.

use crate::dal::{DalError, DAL};
use diesel::prelude::*;
use nixopus_models::models::{Application, NewApplication, NewOrganization, Organization};
use nixopus_models::schema::{applications, organizations};
use uuid::Uuid;

pub struct OrganizationsDAL<'a> {
    pub dal: &'a DAL,
}

impl OrganizationsDAL<'_> {
    pub fn create(&self, new_org: &NewOrganization) -> Result<Organization, DalError> {
        let conn = &mut self.dal.conn()?;
        Ok(diesel::insert_into(organizations::table)
            .values(new_org)
            .get_result(conn)?)
    }

    pub fn get(&self, id: Uuid) -> Result<Option<Organization>, DalError> {
        let conn = &mut self.dal.conn()?;
        Ok(organizations::table
            .filter(organizations::id.eq(id))
            .first(conn)
            .optional()?)
    }
}

pub struct ApplicationsDAL<'a> {
    pub dal: &'a DAL,
}

impl ApplicationsDAL<'_> {
    pub fn create(&self, new_app: &NewApplication) -> Result<Application, DalError> {
        let conn = &mut self.dal.conn()?;
        Ok(diesel::insert_into(applications::table)
            .values(new_app)
            .get_result(conn)?)
    }

    /// Looks up an application within an organization.
    ///
    /// Returns `None` when the application does not exist or belongs to a
    /// different organization.
    pub fn get_in_organization(
        &self,
        organization_id: Uuid,
        application_id: Uuid,
    ) -> Result<Option<Application>, DalError> {
        let conn = &mut self.dal.conn()?;
        Ok(applications::table
            .filter(applications::id.eq(application_id))
            .filter(applications::organization_id.eq(organization_id))
            .first(conn)
            .optional()?)
    }
}
