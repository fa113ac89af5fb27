/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Data Access Layer for the append-only telemetry tables.
//!
//! Retention sweeps are the only deleters. Inserts exist for fixtures and
//! tooling.

use crate::dal::{DalError, DAL};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use nixopus_models::models::{NewApplicationLog, NewAuditLog, NewExtensionLog};
use nixopus_models::schema::{application_logs, applications, audit_logs, extension_logs};
use uuid::Uuid;

pub struct TelemetryLogsDAL<'a> {
    pub dal: &'a DAL,
}

impl TelemetryLogsDAL<'_> {
    /// Deletes application logs of the organization's applications created before `cutoff`.
    pub fn delete_application_logs_before(
        &self,
        organization_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, DalError> {
        let conn = &mut self.dal.conn()?;
        let org_apps = applications::table
            .filter(applications::organization_id.eq(organization_id))
            .select(applications::id);
        Ok(diesel::delete(
            application_logs::table
                .filter(application_logs::application_id.eq_any(org_apps))
                .filter(application_logs::created_at.lt(cutoff)),
        )
        .execute(conn)?)
    }

    /// Deletes the organization's audit logs created before `cutoff`.
    pub fn delete_audit_logs_before(
        &self,
        organization_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, DalError> {
        let conn = &mut self.dal.conn()?;
        Ok(diesel::delete(
            audit_logs::table
                .filter(audit_logs::organization_id.eq(organization_id))
                .filter(audit_logs::created_at.lt(cutoff)),
        )
        .execute(conn)?)
    }

    /// Deletes extension logs created before `cutoff`, across the whole system.
    pub fn delete_extension_logs_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DalError> {
        let conn = &mut self.dal.conn()?;
        Ok(
            diesel::delete(extension_logs::table.filter(extension_logs::created_at.lt(cutoff)))
                .execute(conn)?,
        )
    }

    pub fn insert_application_log(&self, log: &NewApplicationLog) -> Result<usize, DalError> {
        let conn = &mut self.dal.conn()?;
        Ok(diesel::insert_into(application_logs::table)
            .values(log)
            .execute(conn)?)
    }

    pub fn insert_audit_log(&self, log: &NewAuditLog) -> Result<usize, DalError> {
        let conn = &mut self.dal.conn()?;
        Ok(diesel::insert_into(audit_logs::table)
            .values(log)
            .execute(conn)?)
    }

    pub fn insert_extension_log(&self, log: &NewExtensionLog) -> Result<usize, DalError> {
        let conn = &mut self.dal.conn()?;
        Ok(diesel::insert_into(extension_logs::table)
            .values(log)
            .execute(conn)?)
    }

    pub fn count_audit_logs(&self, organization_id: Uuid) -> Result<i64, DalError> {
        let conn = &mut self.dal.conn()?;
        Ok(audit_logs::table
            .filter(audit_logs::organization_id.eq(organization_id))
            .count()
            .get_result(conn)?)
    }

    pub fn count_application_logs(&self, application_id: Uuid) -> Result<i64, DalError> {
        let conn = &mut self.dal.conn()?;
        Ok(application_logs::table
            .filter(application_logs::application_id.eq(application_id))
            .count()
            .get_result(conn)?)
    }

    pub fn count_extension_logs(&self) -> Result<i64, DalError> {
        let conn = &mut self.dal.conn()?;
        Ok(extension_logs::table.count().get_result(conn)?)
    }
}
