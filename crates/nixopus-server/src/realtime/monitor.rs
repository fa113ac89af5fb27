/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Container Monitor
//!
//! A per-connection ticker that samples the host over SSH and streams the
//! results on the `monitor_application` topic. The session owns its SSH
//! connection; stopping it closes the connection.

use super::hub::Connection;
use super::messages::MonitorRequest;
use super::{Envelope, TopicKind};
use crate::ssh::{RemoteHost, SshConnector, SshError};
use nixopus_utils::logging::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const MIN_INTERVAL_SECONDS: u64 = 1;
pub const MAX_INTERVAL_SECONDS: u64 = 3600;

const DOCKER_PS: &str = "docker ps -a --format '{{json .}}'";
const DOCKER_STATS: &str = "docker stats --no-stream --format '{{json .}}'";
const READ_LOADAVG: &str = "cat /proc/loadavg";
const READ_MEMINFO: &str = "cat /proc/meminfo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorOperation {
    ContainerStatistics,
    SystemStats,
}

impl MonitorOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorOperation::ContainerStatistics => "container_statistics",
            MonitorOperation::SystemStats => "system_stats",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub interval: Duration,
    pub operations: Vec<MonitorOperation>,
}

impl MonitorConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: clamp_interval(interval.as_secs()),
            operations: vec![MonitorOperation::ContainerStatistics],
        }
    }

    /// Overlays the fields present in a client request.
    pub fn apply(&mut self, request: &MonitorRequest) {
        if let Some(seconds) = request.interval_seconds {
            self.interval = clamp_interval(seconds);
        }
        if let Some(operations) = &request.operations {
            if !operations.is_empty() {
                let mut deduped = Vec::with_capacity(operations.len());
                for op in operations {
                    if !deduped.contains(op) {
                        deduped.push(*op);
                    }
                }
                self.operations = deduped;
            }
        }
    }
}

fn clamp_interval(seconds: u64) -> Duration {
    Duration::from_secs(seconds.clamp(MIN_INTERVAL_SECONDS, MAX_INTERVAL_SECONDS))
}

pub struct MonitorHandle {
    cancel: CancellationToken,
    config: watch::Sender<MonitorConfig>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn reconfigure(&self, request: &MonitorRequest) {
        self.config.send_modify(|config| config.apply(request));
    }

    pub fn config(&self) -> MonitorConfig {
        self.config.borrow().clone()
    }

    /// Cancels the ticker and waits for the SSH connection to close.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("Monitor task ended abnormally: {}", e);
        }
    }
}

/// Connects to the host and starts ticking. On connect failure one
/// `ssh_connect` error is sent and no session is created.
pub async fn start(
    connection: Arc<Connection>,
    ssh: &dyn SshConnector,
    config: MonitorConfig,
) -> Option<MonitorHandle> {
    let host = match ssh.connect().await {
        Ok(host) => host,
        Err(e) => {
            warn!(connection_id = %connection.id(), "Monitor SSH connect failed: {}", e);
            let _ = connection
                .send(&Envelope::operation_error("ssh_connect", &e))
                .await;
            return None;
        }
    };

    let cancel = CancellationToken::new();
    let (config_tx, config_rx) = watch::channel(config);
    let task = tokio::spawn(run(connection, host, config_rx, cancel.clone()));
    Some(MonitorHandle {
        cancel,
        config: config_tx,
        task,
    })
}

async fn run(
    connection: Arc<Connection>,
    host: Arc<dyn RemoteHost>,
    mut config_rx: watch::Receiver<MonitorConfig>,
    cancel: CancellationToken,
) {
    let period = config_rx.borrow().interval;
    let mut ticker = interval_at(Instant::now(), period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(connection_id = %connection.id(), ?period, "Container monitor started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = config_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let period = config_rx.borrow_and_update().interval;
                ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            }
            _ = ticker.tick() => {
                let operations = config_rx.borrow().operations.clone();
                for operation in operations {
                    let envelope = match collect(host.as_ref(), operation).await {
                        Ok(data) => Envelope::new(
                            operation.as_str(),
                            data,
                            Some(TopicKind::MonitorApplication),
                        ),
                        Err(e) => Envelope::operation_error(operation.as_str(), e),
                    };
                    let _ = connection.send(&envelope).await;
                }
            }
        }
    }

    host.close().await;
    debug!(connection_id = %connection.id(), "Container monitor stopped");
}

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error(transparent)]
    Ssh(#[from] SshError),
    #[error("unexpected output: {0}")]
    Parse(String),
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
}

async fn collect(
    host: &dyn RemoteHost,
    operation: MonitorOperation,
) -> Result<serde_json::Value, CollectError> {
    match operation {
        MonitorOperation::ContainerStatistics => {
            let ps = host.exec(DOCKER_PS).await?;
            let stats = host.exec(DOCKER_STATS).await?;
            Ok(serde_json::to_value(merge_containers(
                &parse_json_lines::<PsLine>(&ps)?,
                &parse_json_lines::<StatsLine>(&stats)?,
            ))?)
        }
        MonitorOperation::SystemStats => {
            let loadavg = host.exec(READ_LOADAVG).await?;
            let meminfo = host.exec(READ_MEMINFO).await?;
            Ok(serde_json::to_value(SystemStats {
                load_average: parse_loadavg(&loadavg)?,
                memory: parse_meminfo(&meminfo)?,
            })?)
        }
    }
}

/// One line of `docker ps --format '{{json .}}'`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct PsLine {
    #[serde(rename = "ID")]
    id: String,
    names: String,
    image: String,
    state: String,
    status: String,
    ports: String,
    created_at: String,
}

/// One line of `docker stats --no-stream --format '{{json .}}'`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct StatsLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "CPUPerc")]
    cpu_perc: String,
    mem_usage: String,
    mem_perc: String,
    #[serde(rename = "NetIO")]
    net_io: String,
    #[serde(rename = "BlockIO")]
    block_io: String,
    #[serde(rename = "PIDs")]
    pids: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerStatistics {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String,
    pub status: String,
    pub ports: String,
    pub created_at: String,
    pub cpu_percentage: Option<String>,
    pub memory_usage: Option<String>,
    pub memory_percentage: Option<String>,
    pub network_io: Option<String>,
    pub block_io: Option<String>,
    pub pids: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStats {
    pub total_kb: u64,
    pub available_kb: u64,
    pub used_kb: u64,
    pub used_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStats {
    pub load_average: LoadAverage,
    pub memory: MemoryStats,
}

fn parse_json_lines<T>(output: &str) -> Result<Vec<T>, CollectError>
where
    T: for<'de> Deserialize<'de>,
{
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(|e| CollectError::Parse(e.to_string())))
        .collect()
}

/// `docker ps` and `docker stats` may print ids of different lengths.
fn same_container(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && (a.starts_with(b) || b.starts_with(a))
}

/// Joins every listed container with its stats row, if it has one.
fn merge_containers(ps: &[PsLine], stats: &[StatsLine]) -> Vec<ContainerStatistics> {
    let by_id: HashMap<&str, &StatsLine> = stats.iter().map(|s| (s.id.as_str(), s)).collect();

    ps.iter()
        .map(|container| {
            let stat = by_id.get(container.id.as_str()).copied().or_else(|| {
                stats
                    .iter()
                    .find(|s| same_container(&s.id, &container.id))
            });
            ContainerStatistics {
                id: container.id.clone(),
                name: container.names.clone(),
                image: container.image.clone(),
                state: container.state.clone(),
                status: container.status.clone(),
                ports: container.ports.clone(),
                created_at: container.created_at.clone(),
                cpu_percentage: stat.map(|s| s.cpu_perc.clone()),
                memory_usage: stat.map(|s| s.mem_usage.clone()),
                memory_percentage: stat.map(|s| s.mem_perc.clone()),
                network_io: stat.map(|s| s.net_io.clone()),
                block_io: stat.map(|s| s.block_io.clone()),
                pids: stat.map(|s| s.pids.clone()),
            }
        })
        .collect()
}

fn parse_loadavg(output: &str) -> Result<LoadAverage, CollectError> {
    let mut fields = output.split_whitespace().map(str::parse::<f64>);
    let mut next = || {
        fields
            .next()
            .and_then(Result::ok)
            .ok_or_else(|| CollectError::Parse(format!("loadavg: {:?}", output.trim())))
    };
    Ok(LoadAverage {
        one: next()?,
        five: next()?,
        fifteen: next()?,
    })
}

fn parse_meminfo(output: &str) -> Result<MemoryStats, CollectError> {
    let values: HashMap<&str, u64> = output
        .lines()
        .filter_map(|line| {
            let (key, rest) = line.split_once(':')?;
            let value = rest.split_whitespace().next()?.parse().ok()?;
            Some((key.trim(), value))
        })
        .collect();

    let total = *values
        .get("MemTotal")
        .ok_or_else(|| CollectError::Parse("meminfo: missing MemTotal".into()))?;
    let available = values
        .get("MemAvailable")
        .or_else(|| values.get("MemFree"))
        .copied()
        .unwrap_or(0)
        .min(total);
    let used = total - available;
    let used_percentage = if total == 0 {
        0.0
    } else {
        (used as f64 / total as f64 * 10000.0).round() / 100.0
    };

    Ok(MemoryStats {
        total_kb: total,
        available_kb: available,
        used_kb: used,
        used_percentage,
    })
}
