/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Maintenance Scheduler
//!
//! Runs registered [`Job`]s for every organization on a cron schedule.
//!
//! A sweep fetches all organization settings (bounded by the query timeout),
//! then walks organizations in order and, within each, the jobs in
//! registration order. Each invocation runs under the job timeout with panic
//! recovery; a failure is logged and recorded and the sweep moves on.
//! Sweeps are serialized: a cron tick and a [`Scheduler::run_now`] call never
//! overlap.

pub mod docker;
pub mod retention;
pub mod settings;

use crate::dal::DalError;
use crate::docker::DockerError;
use crate::metrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use croner::Cron;
use futures::FutureExt;
use nixopus_models::models::{ResolvedSettings, DEFAULT_RETENTION_DAYS};
use nixopus_utils::config::Scheduler as SchedulerSettings;
use nixopus_utils::logging::prelude::*;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use self::docker::{DockerProvider, PruneBuildCache, PruneDanglingImages};
pub use self::retention::{
    AuditLogsCleanup, DeploymentLogsCleanup, ExtensionLogsCleanup, HealthCheckResultsCleanup,
    RetentionStore,
};
pub use self::settings::{SettingsResolver, SettingsStore};

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Store(#[from] DalError),
    #[error(transparent)]
    Docker(#[from] DockerError),
    #[error("job timed out after {0:?}")]
    Timeout(Duration),
    #[error("job panicked: {0}")]
    Panicked(String),
    #[error("job cancelled")]
    Cancelled,
}

impl JobError {
    /// Label used for the job-runs metric.
    pub fn result_label(&self) -> &'static str {
        match self {
            JobError::Timeout(_) => "timeout",
            JobError::Panicked(_) => "panic",
            JobError::Cancelled => "cancelled",
            JobError::Store(_) | JobError::Docker(_) => "failure",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid cron expression {expression:?}: {reason}")]
    InvalidCron { expression: String, reason: String },
    #[error("timed out fetching organization settings after {0:?}")]
    QueryTimeout(Duration),
    #[error(transparent)]
    Store(#[from] DalError),
    #[error("scheduler is shutting down")]
    ShuttingDown,
}

/// Per-invocation context handed to a job.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Shared by every invocation within one sweep
    pub sweep_id: Uuid,
    pub settings: ResolvedSettings,
    /// Fires when the invocation times out or the scheduler shuts down
    pub cancel: CancellationToken,
    /// Reference time for retention cutoffs
    pub now: DateTime<Utc>,
}

impl JobContext {
    pub fn new(settings: ResolvedSettings) -> Self {
        Self {
            sweep_id: Uuid::new_v4(),
            settings,
            cancel: CancellationToken::new(),
            now: Utc::now(),
        }
    }

    pub fn ensure_active(&self) -> Result<(), JobError> {
        if self.cancel.is_cancelled() {
            Err(JobError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A maintenance job. Returns the number of affected units (rows deleted,
/// bytes reclaimed) on success.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_enabled(&self, settings: &ResolvedSettings) -> bool;

    /// Retention window in days. Jobs without one report the default.
    fn retention_days(&self, _settings: &ResolvedSettings) -> i32 {
        DEFAULT_RETENTION_DAYS
    }

    async fn run(&self, ctx: &JobContext, organization_id: Uuid) -> Result<u64, JobError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub organization_id: Uuid,
    pub job_name: &'static str,
    pub success: bool,
    pub affected: u64,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub sweep_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub organizations: usize,
    pub outcomes: Vec<JobOutcome>,
}

impl SweepReport {
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.success).count()
    }

    pub fn outcomes_for<'a>(&'a self, job_name: &'a str) -> impl Iterator<Item = &'a JobOutcome> + 'a {
        self.outcomes.iter().filter(move |o| o.job_name == job_name)
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub cron: String,
    pub job_timeout: Duration,
    pub query_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cron: "0 2 * * *".to_string(),
            job_timeout: Duration::from_secs(300),
            query_timeout: Duration::from_secs(30),
        }
    }
}

impl SchedulerConfig {
    pub fn from_settings(settings: &SchedulerSettings) -> Self {
        Self {
            cron: settings.cron.clone(),
            job_timeout: Duration::from_secs(settings.job_timeout_seconds.max(1)),
            query_timeout: Duration::from_secs(settings.query_timeout_seconds.max(1)),
        }
    }
}

pub fn parse_cron(expression: &str) -> Result<Cron, SchedulerError> {
    Cron::new(expression)
        .parse()
        .map_err(|e| SchedulerError::InvalidCron {
            expression: expression.to_string(),
            reason: e.to_string(),
        })
}

/// The standard job set, in execution order.
pub fn default_jobs(store: Arc<dyn RetentionStore>, docker: DockerProvider) -> Vec<Arc<dyn Job>> {
    vec![
        Arc::new(DeploymentLogsCleanup::new(store.clone())),
        Arc::new(AuditLogsCleanup::new(store.clone())),
        Arc::new(ExtensionLogsCleanup::new(store.clone())),
        Arc::new(HealthCheckResultsCleanup::new(store)),
        Arc::new(PruneDanglingImages::new(docker.clone())),
        Arc::new(PruneBuildCache::new(docker)),
    ]
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

pub struct Scheduler {
    jobs: Vec<Arc<dyn Job>>,
    settings: Arc<SettingsResolver>,
    config: SchedulerConfig,
    sweep_lock: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(settings: Arc<SettingsResolver>, config: SchedulerConfig) -> Self {
        Self {
            jobs: Vec::new(),
            settings,
            config,
            sweep_lock: tokio::sync::Mutex::new(()),
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn register(&mut self, job: Arc<dyn Job>) {
        debug!("Registered maintenance job {}", job.name());
        self.jobs.push(job);
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|j| j.name()).collect()
    }

    /// Starts the cron loop. Fails if the expression does not parse.
    pub fn start(self: &Arc<Self>) -> Result<(), SchedulerError> {
        let cron = parse_cron(&self.config.cron)?;
        info!(
            "Starting maintenance scheduler (cron: {}, {} jobs)",
            self.config.cron,
            self.jobs.len()
        );

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next = match cron.find_next_occurrence(&now, false) {
                    Ok(next) => next,
                    Err(e) => {
                        error!("No upcoming cron occurrence, scheduler stopping: {}", e);
                        break;
                    }
                };
                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                debug!("Next maintenance sweep at {}", next);

                tokio::select! {
                    _ = scheduler.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }

                if let Err(e) = scheduler.sweep().await {
                    error!("Maintenance sweep failed: {}", e);
                }
            }
            debug!("Maintenance scheduler loop exited");
        });

        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }
        Ok(())
    }

    /// Runs a sweep immediately, waiting for any sweep in progress.
    pub async fn run_now(&self) -> Result<SweepReport, SchedulerError> {
        if self.shutdown.is_cancelled() {
            return Err(SchedulerError::ShuttingDown);
        }
        self.sweep().await
    }

    /// Stops the cron loop and waits for an in-flight sweep to drain.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.task.lock().ok().and_then(|mut t| t.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Scheduler loop ended abnormally: {}", e);
            }
        }
        drop(self.sweep_lock.lock().await);
        info!("Maintenance scheduler stopped");
    }

    async fn sweep(&self) -> Result<SweepReport, SchedulerError> {
        let _guard = self.sweep_lock.lock().await;
        let report_started = Utc::now();
        let sweep_id = Uuid::new_v4();
        let started = Instant::now();

        let organizations =
            tokio::time::timeout(self.config.query_timeout, self.settings.list_all())
                .await
                .map_err(|_| SchedulerError::QueryTimeout(self.config.query_timeout))??;

        let mut report = SweepReport {
            sweep_id,
            started_at: report_started,
            organizations: organizations.len(),
            outcomes: Vec::new(),
        };

        'orgs: for (organization_id, settings) in organizations {
            for job in &self.jobs {
                if self.shutdown.is_cancelled() {
                    info!(%sweep_id, "Shutdown requested, ending sweep early");
                    break 'orgs;
                }
                if !job.is_enabled(&settings) {
                    continue;
                }
                let outcome = self
                    .run_job(job.as_ref(), sweep_id, organization_id, settings)
                    .await;
                report.outcomes.push(outcome);
            }
        }

        info!(
            %sweep_id,
            organizations = report.organizations,
            jobs_run = report.outcomes.len(),
            failures = report.failures(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Maintenance sweep finished"
        );
        Ok(report)
    }

    async fn run_job(
        &self,
        job: &dyn Job,
        sweep_id: Uuid,
        organization_id: Uuid,
        settings: ResolvedSettings,
    ) -> JobOutcome {
        let ctx = JobContext {
            sweep_id,
            settings,
            cancel: self.shutdown.child_token(),
            now: Utc::now(),
        };
        let started = Instant::now();

        let guarded = AssertUnwindSafe(job.run(&ctx, organization_id)).catch_unwind();
        let result = match tokio::time::timeout(self.config.job_timeout, guarded).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(JobError::Panicked(panic_message(panic))),
            Err(_) => {
                ctx.cancel.cancel();
                Err(JobError::Timeout(self.config.job_timeout))
            }
        };

        let duration = started.elapsed();
        let duration_ms = duration.as_millis() as u64;
        let job_name = job.name();

        match result {
            Ok(affected) => {
                metrics::record_job_run(job_name, "success", duration.as_secs_f64());
                info!(
                    job_name,
                    org_id = %organization_id,
                    success = true,
                    duration_ms,
                    affected,
                    "Job completed"
                );
                JobOutcome {
                    organization_id,
                    job_name,
                    success: true,
                    affected,
                    duration_ms,
                    error: None,
                }
            }
            Err(e) => {
                metrics::record_job_run(job_name, e.result_label(), duration.as_secs_f64());
                error!(
                    job_name,
                    org_id = %organization_id,
                    success = false,
                    duration_ms,
                    error = %e,
                    "Job failed"
                );
                JobOutcome {
                    organization_id,
                    job_name,
                    success: false,
                    affected: 0,
                    duration_ms,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
