/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Data Access Layer for HealthCheck operations.
//!
//! Besides CRUD for the control API, this module owns the probe bookkeeping
//! transaction: the result insert and the counter update happen under a row
//! lock so concurrent writers never interleave on one check.

use crate::dal::{DalError, DAL};
use crate::healthcheck::probe::ProbeOutcome;
use crate::healthcheck::state::{apply_outcome, Counters, Thresholds};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use nixopus_models::models::{
    HealthCheck, HealthCheckChangeset, HealthCheckResult, NewHealthCheck, NewHealthCheckResult,
};
use nixopus_models::schema::{applications, health_check_results, health_checks};
use uuid::Uuid;

/// An enabled check together with its application's domain.
#[derive(Debug, Clone)]
pub struct DueCandidate {
    pub check: HealthCheck,
    pub domain: Option<String>,
}

/// What a single probe did to the stored state.
#[derive(Debug, Clone)]
pub struct ProbeRecord {
    pub before: HealthCheck,
    pub after: HealthCheck,
    pub result: HealthCheckResult,
}

/// Data Access Layer for HealthCheck operations.
pub struct HealthChecksDAL<'a> {
    /// Reference to the main DAL instance.
    pub dal: &'a DAL,
}

impl HealthChecksDAL<'_> {
    /// Creates a new health check.
    ///
    /// A second check for the same application fails with a unique violation.
    pub fn create(&self, new_check: &NewHealthCheck) -> Result<HealthCheck, DalError> {
        let conn = &mut self.dal.conn()?;
        Ok(diesel::insert_into(health_checks::table)
            .values(new_check)
            .get_result(conn)?)
    }

    pub fn get(&self, id: Uuid) -> Result<Option<HealthCheck>, DalError> {
        let conn = &mut self.dal.conn()?;
        Ok(health_checks::table
            .find(id)
            .first(conn)
            .optional()?)
    }

    /// Retrieves the check of an application within an organization.
    pub fn get_by_application(
        &self,
        organization_id: Uuid,
        application_id: Uuid,
    ) -> Result<Option<HealthCheck>, DalError> {
        let conn = &mut self.dal.conn()?;
        Ok(health_checks::table
            .filter(health_checks::application_id.eq(application_id))
            .filter(health_checks::organization_id.eq(organization_id))
            .first(conn)
            .optional()?)
    }

    /// Applies a partial update. Counters and `last_checked_at` are never touched.
    pub fn update(
        &self,
        organization_id: Uuid,
        application_id: Uuid,
        changes: &HealthCheckChangeset,
    ) -> Result<Option<HealthCheck>, DalError> {
        let conn = &mut self.dal.conn()?;
        let mut changes = changes.clone();
        changes.updated_at = Some(Utc::now());
        Ok(diesel::update(
            health_checks::table
                .filter(health_checks::application_id.eq(application_id))
                .filter(health_checks::organization_id.eq(organization_id)),
        )
        .set(&changes)
        .get_result(conn)
        .optional()?)
    }

    /// Flips the enabled flag, preserving counters and `last_checked_at`.
    pub fn set_enabled(
        &self,
        organization_id: Uuid,
        application_id: Uuid,
        enabled: bool,
    ) -> Result<Option<HealthCheck>, DalError> {
        let conn = &mut self.dal.conn()?;
        Ok(diesel::update(
            health_checks::table
                .filter(health_checks::application_id.eq(application_id))
                .filter(health_checks::organization_id.eq(organization_id)),
        )
        .set((
            health_checks::enabled.eq(enabled),
            health_checks::updated_at.eq(Utc::now()),
        ))
        .get_result(conn)
        .optional()?)
    }

    /// Deletes the check of an application. Results go with it (cascade).
    ///
    /// # Returns
    ///
    /// The number of deleted checks; 0 when there was nothing to delete.
    pub fn delete(&self, organization_id: Uuid, application_id: Uuid) -> Result<usize, DalError> {
        let conn = &mut self.dal.conn()?;
        Ok(diesel::delete(
            health_checks::table
                .filter(health_checks::application_id.eq(application_id))
                .filter(health_checks::organization_id.eq(organization_id)),
        )
        .execute(conn)?)
    }

    /// Lists every enabled check joined with its application's domain.
    pub fn list_enabled_with_domain(&self) -> Result<Vec<DueCandidate>, DalError> {
        let conn = &mut self.dal.conn()?;
        let rows: Vec<(HealthCheck, Option<String>)> = health_checks::table
            .inner_join(applications::table)
            .filter(health_checks::enabled.eq(true))
            .select((HealthCheck::as_select(), applications::domain))
            .load(conn)?;
        Ok(rows
            .into_iter()
            .map(|(check, domain)| DueCandidate { check, domain })
            .collect())
    }

    /// Persists one probe outcome.
    ///
    /// Inside a single transaction with the check row locked: appends the
    /// result (with `checked_at` clamped to never precede the previous probe),
    /// updates the streak counters, and stamps `last_checked_at`.
    pub fn record_probe(
        &self,
        health_check_id: Uuid,
        outcome: &ProbeOutcome,
        now: DateTime<Utc>,
    ) -> Result<ProbeRecord, DalError> {
        let conn = &mut self.dal.conn()?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let before: HealthCheck = health_checks::table
                .find(health_check_id)
                .for_update()
                .first(conn)?;

            let checked_at = match before.last_checked_at {
                Some(last) if last > now => last,
                _ => now,
            };

            let result: HealthCheckResult = diesel::insert_into(health_check_results::table)
                .values(&NewHealthCheckResult::new(
                    before.id,
                    outcome.status,
                    outcome.status_code,
                    outcome.response_time_ms,
                    outcome.error_message.clone(),
                    checked_at,
                ))
                .get_result(conn)?;

            let counters = apply_outcome(
                Counters::of(&before),
                Thresholds::of(&before),
                outcome.status,
            );

            let after: HealthCheck = diesel::update(health_checks::table.find(before.id))
                .set((
                    health_checks::consecutive_fails.eq(counters.consecutive_fails),
                    health_checks::consecutive_successes.eq(counters.consecutive_successes),
                    health_checks::last_checked_at.eq(Some(checked_at)),
                ))
                .get_result(conn)?;

            Ok(ProbeRecord {
                before,
                after,
                result,
            })
        })
        .map_err(DalError::from)
    }
}
