/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Retention jobs: delete telemetry rows older than the configured window.

use super::{Job, JobContext, JobError};
use crate::dal::{DalError, DAL};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use nixopus_models::models::{ResolvedSettings, DEFAULT_RETENTION_DAYS};
use nixopus_utils::logging::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

/// Minimum spacing between two extension-log sweeps in this process.
pub const EXTENSION_SWEEP_GATE: Duration = Duration::from_secs(60);

#[async_trait]
pub trait RetentionStore: Send + Sync {
    async fn delete_application_logs_before(
        &self,
        organization_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DalError>;

    async fn delete_audit_logs_before(
        &self,
        organization_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DalError>;

    async fn delete_extension_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DalError>;

    /// Applies each health check's own retention window.
    async fn delete_expired_health_check_results(
        &self,
        organization_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, DalError>;

    /// Largest extension-log retention across all organizations, if any
    /// organization has settings.
    async fn max_extension_retention_days(&self) -> Result<Option<i32>, DalError>;
}

#[async_trait]
impl RetentionStore for DAL {
    async fn delete_application_logs_before(
        &self,
        organization_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DalError> {
        self.run_blocking(move |dal| {
            Ok(dal
                .telemetry_logs()
                .delete_application_logs_before(organization_id, cutoff)? as u64)
        })
        .await
    }

    async fn delete_audit_logs_before(
        &self,
        organization_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DalError> {
        self.run_blocking(move |dal| {
            Ok(dal
                .telemetry_logs()
                .delete_audit_logs_before(organization_id, cutoff)? as u64)
        })
        .await
    }

    async fn delete_extension_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DalError> {
        self.run_blocking(move |dal| {
            Ok(dal.telemetry_logs().delete_extension_logs_before(cutoff)? as u64)
        })
        .await
    }

    async fn delete_expired_health_check_results(
        &self,
        organization_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, DalError> {
        self.run_blocking(move |dal| {
            Ok(dal
                .health_check_results()
                .delete_expired_for_organization(organization_id, now)? as u64)
        })
        .await
    }

    async fn max_extension_retention_days(&self) -> Result<Option<i32>, DalError> {
        self.run_blocking(|dal| {
            Ok(dal
                .organization_settings()
                .list()?
                .iter()
                .map(|row| row.resolved().extension_logs_retention_days)
                .max())
        })
        .await
    }
}

pub fn cutoff(now: DateTime<Utc>, retention_days: i32) -> DateTime<Utc> {
    now - ChronoDuration::days(i64::from(retention_days.max(1)))
}

pub struct DeploymentLogsCleanup {
    store: Arc<dyn RetentionStore>,
}

impl DeploymentLogsCleanup {
    pub fn new(store: Arc<dyn RetentionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Job for DeploymentLogsCleanup {
    fn name(&self) -> &'static str {
        "deployment_logs_cleanup"
    }

    fn is_enabled(&self, settings: &ResolvedSettings) -> bool {
        settings.deployment_logs_cleanup_enabled
    }

    fn retention_days(&self, settings: &ResolvedSettings) -> i32 {
        settings.deployment_logs_retention_days
    }

    async fn run(&self, ctx: &JobContext, organization_id: Uuid) -> Result<u64, JobError> {
        ctx.ensure_active()?;
        let cutoff = cutoff(ctx.now, self.retention_days(&ctx.settings));
        let deleted = self
            .store
            .delete_application_logs_before(organization_id, cutoff)
            .await?;
        info!(org_id = %organization_id, %cutoff, "Deleted {} deployment logs", deleted);
        Ok(deleted)
    }
}

pub struct AuditLogsCleanup {
    store: Arc<dyn RetentionStore>,
}

impl AuditLogsCleanup {
    pub fn new(store: Arc<dyn RetentionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Job for AuditLogsCleanup {
    fn name(&self) -> &'static str {
        "audit_logs_cleanup"
    }

    fn is_enabled(&self, settings: &ResolvedSettings) -> bool {
        settings.audit_logs_cleanup_enabled
    }

    fn retention_days(&self, settings: &ResolvedSettings) -> i32 {
        settings.audit_logs_retention_days
    }

    async fn run(&self, ctx: &JobContext, organization_id: Uuid) -> Result<u64, JobError> {
        ctx.ensure_active()?;
        let cutoff = cutoff(ctx.now, self.retention_days(&ctx.settings));
        let deleted = self
            .store
            .delete_audit_logs_before(organization_id, cutoff)
            .await?;
        info!(org_id = %organization_id, %cutoff, "Deleted {} audit logs", deleted);
        Ok(deleted)
    }
}

/// System-wide extension-log cleanup.
///
/// Invoked once per organization like every job, but acts at most once per
/// [`EXTENSION_SWEEP_GATE`]. The gate lives in this process only.
pub struct ExtensionLogsCleanup {
    store: Arc<dyn RetentionStore>,
    last_started: Mutex<Option<Instant>>,
}

impl ExtensionLogsCleanup {
    pub fn new(store: Arc<dyn RetentionStore>) -> Self {
        Self {
            store,
            last_started: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Job for ExtensionLogsCleanup {
    fn name(&self) -> &'static str {
        "extension_logs_cleanup"
    }

    fn is_enabled(&self, settings: &ResolvedSettings) -> bool {
        settings.extension_logs_cleanup_enabled
    }

    fn retention_days(&self, settings: &ResolvedSettings) -> i32 {
        settings.extension_logs_retention_days
    }

    async fn run(&self, ctx: &JobContext, _organization_id: Uuid) -> Result<u64, JobError> {
        ctx.ensure_active()?;
        let mut last_started = self.last_started.lock().await;
        if let Some(at) = *last_started {
            if at.elapsed() < EXTENSION_SWEEP_GATE {
                debug!("Extension log cleanup ran {:?} ago, skipping", at.elapsed());
                return Ok(0);
            }
        }
        *last_started = Some(Instant::now());

        let retention_days = self
            .store
            .max_extension_retention_days()
            .await?
            .unwrap_or(DEFAULT_RETENTION_DAYS);
        let cutoff = cutoff(ctx.now, retention_days);
        let deleted = self.store.delete_extension_logs_before(cutoff).await?;
        info!(retention_days, %cutoff, "Deleted {} extension logs", deleted);
        Ok(deleted)
    }
}

/// Per-check retention of health-check results.
pub struct HealthCheckResultsCleanup {
    store: Arc<dyn RetentionStore>,
}

impl HealthCheckResultsCleanup {
    pub fn new(store: Arc<dyn RetentionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Job for HealthCheckResultsCleanup {
    fn name(&self) -> &'static str {
        "healthcheck_results_cleanup"
    }

    fn is_enabled(&self, _settings: &ResolvedSettings) -> bool {
        true
    }

    async fn run(&self, ctx: &JobContext, organization_id: Uuid) -> Result<u64, JobError> {
        ctx.ensure_active()?;
        let deleted = self
            .store
            .delete_expired_health_check_results(organization_id, ctx.now)
            .await?;
        if deleted > 0 {
            info!(org_id = %organization_id, "Deleted {} health check results", deleted);
        }
        Ok(deleted)
    }
}
