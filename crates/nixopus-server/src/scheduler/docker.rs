/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Docker pruning jobs.
//!
//! Docker state is host-global, so each job acts for the first organization
//! of a sweep whose settings enable it and is a no-op for the rest of that
//! sweep.

use super::{Job, JobContext, JobError};
use crate::docker::{self, DockerError, DockerManager, PruneReport};
use async_trait::async_trait;
use nixopus_models::models::ResolvedSettings;
use nixopus_utils::logging::prelude::*;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Source of the Docker handle, resolved on every run.
pub type DockerProvider =
    Arc<dyn Fn() -> Result<Arc<dyn DockerManager>, DockerError> + Send + Sync>;

/// Uses the process default installed with [`docker::install_default`].
pub fn process_default() -> DockerProvider {
    Arc::new(docker::default_manager)
}

/// Remembers which sweep already performed the action.
#[derive(Default)]
struct SweepOnce {
    last_sweep: Mutex<Option<Uuid>>,
}

impl SweepOnce {
    /// True the first time it is called for a sweep.
    async fn claim(&self, sweep_id: Uuid) -> bool {
        let mut last = self.last_sweep.lock().await;
        if *last == Some(sweep_id) {
            return false;
        }
        *last = Some(sweep_id);
        true
    }
}

fn reclaimed(report: &PruneReport) -> u64 {
    report.reclaimed_bytes.unwrap_or(0)
}

pub struct PruneDanglingImages {
    docker: DockerProvider,
    once: SweepOnce,
}

impl PruneDanglingImages {
    pub fn new(docker: DockerProvider) -> Self {
        Self {
            docker,
            once: SweepOnce::default(),
        }
    }
}

#[async_trait]
impl Job for PruneDanglingImages {
    fn name(&self) -> &'static str {
        "docker_image_prune"
    }

    fn is_enabled(&self, settings: &ResolvedSettings) -> bool {
        settings.container_auto_prune_dangling_images
    }

    async fn run(&self, ctx: &JobContext, organization_id: Uuid) -> Result<u64, JobError> {
        ctx.ensure_active()?;
        if !self.once.claim(ctx.sweep_id).await {
            debug!(org_id = %organization_id, "Dangling images already pruned this sweep");
            return Ok(0);
        }
        let manager = (self.docker)()?;
        let report = manager.prune_dangling_images().await?;
        info!(reclaimed = ?report.reclaimed, "Pruned dangling images");
        Ok(reclaimed(&report))
    }
}

pub struct PruneBuildCache {
    docker: DockerProvider,
    once: SweepOnce,
}

impl PruneBuildCache {
    pub fn new(docker: DockerProvider) -> Self {
        Self {
            docker,
            once: SweepOnce::default(),
        }
    }
}

#[async_trait]
impl Job for PruneBuildCache {
    fn name(&self) -> &'static str {
        "docker_build_cache_prune"
    }

    fn is_enabled(&self, settings: &ResolvedSettings) -> bool {
        settings.container_auto_prune_build_cache
    }

    async fn run(&self, ctx: &JobContext, organization_id: Uuid) -> Result<u64, JobError> {
        ctx.ensure_active()?;
        if !self.once.claim(ctx.sweep_id).await {
            debug!(org_id = %organization_id, "Build cache already pruned this sweep");
            return Ok(0);
        }
        let manager = (self.docker)()?;
        let report = manager.prune_build_cache().await?;
        info!(reclaimed = ?report.reclaimed, "Pruned build cache");
        Ok(reclaimed(&report))
    }
}

#[cfg(test)]
mod tests {
    use super::super::settings::tests::MemorySettings;
    use super::super::{Scheduler, SchedulerConfig, SettingsResolver};
    use super::*;
    use nixopus_models::models::SettingsData;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingDocker {
        images: AtomicUsize,
        cache: AtomicUsize,
    }

    #[async_trait]
    impl DockerManager for CountingDocker {
        async fn prune_dangling_images(&self) -> Result<PruneReport, DockerError> {
            self.images.fetch_add(1, Ordering::SeqCst);
            Ok(PruneReport {
                reclaimed: Some("1kB".into()),
                reclaimed_bytes: Some(1000),
            })
        }

        async fn prune_build_cache(&self) -> Result<PruneReport, DockerError> {
            self.cache.fetch_add(1, Ordering::SeqCst);
            Ok(PruneReport::default())
        }
    }

    fn provider(docker: Arc<CountingDocker>) -> DockerProvider {
        Arc::new(move || Ok(docker.clone() as Arc<dyn DockerManager>))
    }

    fn scheduler(orgs: &[(Uuid, SettingsData)], docker: DockerProvider) -> Scheduler {
        let mut scheduler = Scheduler::new(
            Arc::new(SettingsResolver::new(Arc::new(MemorySettings::with_orgs(orgs)))),
            SchedulerConfig::default(),
        );
        scheduler.register(Arc::new(PruneDanglingImages::new(docker.clone())));
        scheduler.register(Arc::new(PruneBuildCache::new(docker)));
        scheduler
    }

    #[tokio::test]
    async fn test_prunes_once_per_sweep() {
        let enabled = SettingsData {
            container_auto_prune_dangling_images: Some(true),
            container_auto_prune_build_cache: Some(true),
            ..Default::default()
        };
        let orgs: Vec<_> = (0..3).map(|_| (Uuid::new_v4(), enabled.clone())).collect();
        let docker = Arc::new(CountingDocker::default());
        let scheduler = scheduler(&orgs, provider(docker.clone()));

        let report = scheduler.run_now().await.unwrap();
        assert_eq!(docker.images.load(Ordering::SeqCst), 1);
        assert_eq!(docker.cache.load(Ordering::SeqCst), 1);
        let image_runs: Vec<u64> = report
            .outcomes_for("docker_image_prune")
            .map(|o| o.affected)
            .collect();
        assert_eq!(image_runs.iter().filter(|a| **a == 1000).count(), 1);

        scheduler.run_now().await.unwrap();
        assert_eq!(docker.images.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_by_default() {
        let orgs = vec![(Uuid::new_v4(), SettingsData::default())];
        let docker = Arc::new(CountingDocker::default());
        let report = scheduler(&orgs, provider(docker.clone()))
            .run_now()
            .await
            .unwrap();
        assert!(report.outcomes.is_empty());
        assert_eq!(docker.images.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_manager_is_job_error() {
        let unavailable: DockerProvider = Arc::new(|| Err(DockerError::Unavailable));
        let job = PruneBuildCache::new(unavailable);
        let ctx = JobContext::new(ResolvedSettings {
            container_auto_prune_build_cache: true,
            ..Default::default()
        });
        let err = job.run(&ctx, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, JobError::Docker(DockerError::Unavailable)));
    }
}
