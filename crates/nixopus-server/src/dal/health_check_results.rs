/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Data Access Layer for HealthCheckResult operations.
//!
//! Results are append-only. Rows are inserted by
//! [`HealthChecksDAL::record_probe`](super::HealthChecksDAL::record_probe) and
//! deleted by the retention sweep.

use crate::dal::{DalError, DAL};
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use nixopus_models::models::{HealthCheckResult, HealthCheckStats};
use nixopus_models::schema::{health_check_results, health_checks};
use uuid::Uuid;

pub struct HealthCheckResultsDAL<'a> {
    pub dal: &'a DAL,
}

impl HealthCheckResultsDAL<'_> {
    /// Lists results newest-first within an optional time window.
    ///
    /// # Arguments
    ///
    /// * `health_check_id` - The check whose results to list.
    /// * `limit` - Maximum number of rows.
    /// * `start_time` / `end_time` - Inclusive bounds on `checked_at`.
    pub fn list(
        &self,
        health_check_id: Uuid,
        limit: i64,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<HealthCheckResult>, DalError> {
        let conn = &mut self.dal.conn()?;
        let mut query = health_check_results::table
            .filter(health_check_results::health_check_id.eq(health_check_id))
            .into_boxed();
        if let Some(start) = start_time {
            query = query.filter(health_check_results::checked_at.ge(start));
        }
        if let Some(end) = end_time {
            query = query.filter(health_check_results::checked_at.le(end));
        }
        Ok(query
            .order((
                health_check_results::checked_at.desc(),
                health_check_results::id.desc(),
            ))
            .limit(limit)
            .load(conn)?)
    }

    /// Aggregates results checked at or after `since`.
    pub fn stats_since(
        &self,
        health_check_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<HealthCheckStats, DalError> {
        let conn = &mut self.dal.conn()?;
        let results: Vec<HealthCheckResult> = health_check_results::table
            .filter(health_check_results::health_check_id.eq(health_check_id))
            .filter(health_check_results::checked_at.ge(since))
            .load(conn)?;
        Ok(HealthCheckStats::from_results(&results))
    }

    pub fn count(&self, health_check_id: Uuid) -> Result<i64, DalError> {
        let conn = &mut self.dal.conn()?;
        Ok(health_check_results::table
            .filter(health_check_results::health_check_id.eq(health_check_id))
            .count()
            .get_result(conn)?)
    }

    /// Deletes, for every check of the organization, the results older than
    /// that check's own `retention_days`.
    pub fn delete_expired_for_organization(
        &self,
        organization_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<usize, DalError> {
        let conn = &mut self.dal.conn()?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let checks: Vec<(Uuid, i32)> = health_checks::table
                .filter(health_checks::organization_id.eq(organization_id))
                .select((health_checks::id, health_checks::retention_days))
                .load(conn)?;

            let mut deleted = 0;
            for (check_id, retention_days) in checks {
                let cutoff = now - Duration::days(i64::from(retention_days.max(1)));
                deleted += diesel::delete(
                    health_check_results::table
                        .filter(health_check_results::health_check_id.eq(check_id))
                        .filter(health_check_results::checked_at.lt(cutoff)),
                )
                .execute(conn)?;
            }
            Ok(deleted)
        })
        .map_err(DalError::from)
    }
}
