/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Data Access Layer.
//!
//! `DAL` hands out one small accessor per table family
//! (`dal.health_checks()`, `dal.organization_settings()`, ...). Accessor
//! methods are synchronous; async callers go through [`DAL::run_blocking`],
//! which moves the work onto tokio's blocking pool.

use crate::db::ConnectionPool;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::PgConnection;

mod applications;
mod health_check_results;
mod health_checks;
mod organization_settings;
mod telemetry_logs;

pub use applications::{ApplicationsDAL, OrganizationsDAL};
pub use health_check_results::HealthCheckResultsDAL;
pub use health_checks::{DueCandidate, HealthChecksDAL, ProbeRecord};
pub use organization_settings::OrganizationSettingsDAL;
pub use telemetry_logs::TelemetryLogsDAL;

/// Errors surfaced by DAL operations.
#[derive(Debug, thiserror::Error)]
pub enum DalError {
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("query failed: {0}")]
    Query(#[from] diesel::result::Error),
    #[error("blocking task failed: {0}")]
    Join(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The main Data Access Layer struct.
#[derive(Clone)]
pub struct DAL {
    /// A connection pool for PostgreSQL database connections.
    pub pool: ConnectionPool,
}

impl DAL {
    /// Creates a new DAL instance with the given connection pool.
    pub fn new(pool: ConnectionPool) -> Self {
        DAL { pool }
    }

    pub(crate) fn conn(
        &self,
    ) -> Result<PooledConnection<ConnectionManager<PgConnection>>, DalError> {
        Ok(self.pool.get()?)
    }

    /// Runs a synchronous DAL closure on the blocking pool.
    pub async fn run_blocking<T, F>(&self, f: F) -> Result<T, DalError>
    where
        F: FnOnce(&DAL) -> Result<T, DalError> + Send + 'static,
        T: Send + 'static,
    {
        let dal = self.clone();
        tokio::task::spawn_blocking(move || f(&dal))
            .await
            .map_err(|e| DalError::Join(e.to_string()))?
    }

    pub fn organizations(&self) -> OrganizationsDAL {
        OrganizationsDAL { dal: self }
    }

    pub fn applications(&self) -> ApplicationsDAL {
        ApplicationsDAL { dal: self }
    }

    pub fn organization_settings(&self) -> OrganizationSettingsDAL {
        OrganizationSettingsDAL { dal: self }
    }

    pub fn health_checks(&self) -> HealthChecksDAL {
        HealthChecksDAL { dal: self }
    }

    pub fn health_check_results(&self) -> HealthCheckResultsDAL {
        HealthCheckResultsDAL { dal: self }
    }

    pub fn telemetry_logs(&self) -> TelemetryLogsDAL {
        TelemetryLogsDAL { dal: self }
    }
}
