/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! The health loop.
//!
//! Every tick the engine loads the enabled checks, keeps the due ones, and
//! spawns one probe task per check that is not already being probed. Each
//! task probes, records the outcome in one transaction, and broadcasts the
//! result on `(monitor_health_check, application_id)`.

use crate::dal::{DalError, DueCandidate, ProbeRecord, DAL};
use crate::healthcheck::probe::{ProbeExecutor, ProbeOutcome};
use crate::healthcheck::state::Transition;
use crate::metrics;
use crate::realtime::{BroadcastSink, Topic, TopicKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use nixopus_models::models::applications::base_url_for;
use nixopus_models::models::EffectiveState;
use nixopus_utils::logging::prelude::*;
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

pub const BROADCAST_ACTION: &str = "monitor_health_check";

/// Storage used by the health loop.
#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Enabled checks with their application's domain.
    async fn list_enabled(&self) -> Result<Vec<DueCandidate>, DalError>;

    /// Appends the result and updates counters in one transaction.
    async fn record_probe(
        &self,
        health_check_id: Uuid,
        outcome: ProbeOutcome,
        now: DateTime<Utc>,
    ) -> Result<ProbeRecord, DalError>;
}

#[async_trait]
impl HealthStore for DAL {
    async fn list_enabled(&self) -> Result<Vec<DueCandidate>, DalError> {
        self.run_blocking(|dal| dal.health_checks().list_enabled_with_domain())
            .await
    }

    async fn record_probe(
        &self,
        health_check_id: Uuid,
        outcome: ProbeOutcome,
        now: DateTime<Utc>,
    ) -> Result<ProbeRecord, DalError> {
        self.run_blocking(move |dal| {
            dal.health_checks()
                .record_probe(health_check_id, &outcome, now)
        })
        .await
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub tick: Duration,
    /// 0 disables the cap.
    pub max_concurrent_probes: usize,
    pub default_base_url: String,
}

impl EngineConfig {
    pub fn from_settings(settings: &nixopus_utils::config::HealthCheck) -> Self {
        Self {
            tick: Duration::from_secs(settings.tick_seconds.max(1)),
            max_concurrent_probes: settings.max_concurrent_probes,
            default_base_url: settings.default_base_url.clone(),
        }
    }
}

/// Broadcast payload for one probe result.
#[derive(Debug, Clone, Serialize)]
pub struct HealthBroadcast {
    pub application_id: Uuid,
    pub health_check_id: Uuid,
    pub status: String,
    pub status_code: i32,
    pub response_time_ms: Option<i32>,
    pub error_message: String,
    pub checked_at: DateTime<Utc>,
    pub effective_state: EffectiveState,
    pub consecutive_fails: i32,
    pub transition: Option<Transition>,
}

impl HealthBroadcast {
    pub fn from_record(record: &ProbeRecord) -> Self {
        Self {
            application_id: record.after.application_id,
            health_check_id: record.after.id,
            status: record.result.status.clone(),
            status_code: record.result.status_code,
            response_time_ms: record.result.response_time_ms,
            error_message: record.result.error_message.clone(),
            checked_at: record.result.checked_at,
            effective_state: record.after.effective_state(),
            consecutive_fails: record.after.consecutive_fails,
            transition: Transition::between(&record.before, &record.after),
        }
    }
}

pub struct HealthEngine {
    store: Arc<dyn HealthStore>,
    prober: Arc<dyn ProbeExecutor>,
    sink: OnceCell<Weak<dyn BroadcastSink>>,
    in_flight: Mutex<HashSet<Uuid>>,
    limiter: Option<Arc<Semaphore>>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    config: EngineConfig,
}

/// Clears a check's in-flight mark when its probe task ends, panics included.
struct InFlightGuard {
    engine: Arc<HealthEngine>,
    id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.engine.in_flight.lock() {
            set.remove(&self.id);
        }
    }
}

impl HealthEngine {
    pub fn new(
        store: Arc<dyn HealthStore>,
        prober: Arc<dyn ProbeExecutor>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let limiter = (config.max_concurrent_probes > 0)
            .then(|| Arc::new(Semaphore::new(config.max_concurrent_probes)));
        Arc::new(Self {
            store,
            prober,
            sink: OnceCell::new(),
            in_flight: Mutex::new(HashSet::new()),
            limiter,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            config,
        })
    }

    /// Injects the broadcast capability. Only the first call takes effect.
    pub fn set_broadcaster(&self, sink: &Arc<dyn BroadcastSink>) {
        if self.sink.set(Arc::downgrade(sink)).is_err() {
            warn!("Health engine broadcaster already set; ignoring");
        }
    }

    /// Starts the ticker. The loop ends when `shutdown` is cancelled.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        info!(
            "Starting health loop (tick: {}s, max concurrent probes: {})",
            engine.config.tick.as_secs(),
            engine.config.max_concurrent_probes
        );
        tokio::spawn(async move {
            let mut ticker = interval(engine.config.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = engine.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = engine.run_tick(Utc::now()).await {
                            error!("Failed to load health checks: {}", e);
                        }
                    }
                }
            }
            debug!("Health loop stopped");
        })
    }

    /// Cancels the ticker and waits for in-flight probes to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Spawns probes for every due check that is not already in flight.
    ///
    /// # Returns
    ///
    /// The number of probe tasks spawned.
    pub async fn run_tick(self: &Arc<Self>, now: DateTime<Utc>) -> Result<usize, DalError> {
        let candidates = self.store.list_enabled().await?;
        let mut spawned = 0;

        for candidate in candidates.into_iter().filter(|c| c.check.is_due(now)) {
            let id = candidate.check.id;
            let inserted = match self.in_flight.lock() {
                Ok(mut set) => set.insert(id),
                Err(_) => false,
            };
            if !inserted {
                debug!("Skipping health check {}: previous probe still in flight", id);
                continue;
            }

            let guard = InFlightGuard {
                engine: Arc::clone(self),
                id,
            };
            let engine = Arc::clone(self);
            self.tracker.spawn(async move {
                let _guard = guard;
                let _permit = match &engine.limiter {
                    Some(limiter) => Arc::clone(limiter).acquire_owned().await.ok(),
                    None => None,
                };
                engine.probe_one(candidate).await;
            });
            spawned += 1;
        }

        Ok(spawned)
    }

    /// Probes one check, records it, and broadcasts the result.
    async fn probe_one(&self, candidate: DueCandidate) {
        let check = candidate.check;
        let base_url = base_url_for(candidate.domain.as_deref(), &self.config.default_base_url);

        let started = Instant::now();
        let outcome = match AssertUnwindSafe(self.prober.probe(&check, &base_url))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("Probe for health check {} panicked", check.id);
                ProbeOutcome::error("probe panicked", Some(started.elapsed()))
            }
        };
        metrics::record_probe(outcome.status.as_str(), started.elapsed().as_secs_f64());

        let record = match self
            .store
            .record_probe(check.id, outcome, Utc::now())
            .await
        {
            Ok(record) => record,
            Err(e) => {
                error!("Failed to record probe for health check {}: {}", check.id, e);
                return;
            }
        };

        let payload = HealthBroadcast::from_record(&record);
        if let Some(transition) = payload.transition {
            if transition.is_failure() {
                warn!(
                    application_id = %payload.application_id,
                    health_check_id = %payload.health_check_id,
                    consecutive_fails = payload.consecutive_fails,
                    "Application is down ({} -> {})",
                    transition.from,
                    transition.to
                );
            } else {
                info!(
                    application_id = %payload.application_id,
                    health_check_id = %payload.health_check_id,
                    "Application state changed ({} -> {})",
                    transition.from,
                    transition.to
                );
            }
        }

        self.broadcast(payload).await;
    }

    async fn broadcast(&self, payload: HealthBroadcast) {
        let Some(sink) = self.sink.get().and_then(Weak::upgrade) else {
            return;
        };
        let topic = Topic::new(
            TopicKind::MonitorHealthCheck,
            payload.application_id.to_string(),
        );
        match serde_json::to_value(&payload) {
            Ok(value) => sink.publish(topic, BROADCAST_ACTION, value).await,
            Err(e) => error!("Failed to encode health broadcast: {}", e),
        }
    }
}
