/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Metrics Module
//!
//! Prometheus metrics for the control plane: scheduler job runs, health
//! probes, and WebSocket connections.

use once_cell::sync::Lazy;
use prometheus::{
    CounterVec, Encoder, Histogram, HistogramOpts, HistogramVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Global Prometheus registry for all control-plane metrics
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Scheduler job executions
/// Labels: job, result (success, failure, timeout, panic)
pub static JOB_RUNS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    let opts = Opts::new(
        "nixopus_scheduler_job_runs_total",
        "Total number of scheduler job executions by job and result",
    );
    let counter = CounterVec::new(opts, &["job", "result"])
        .expect("Failed to create job runs counter");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("Failed to register job runs counter");
    counter
});

/// Scheduler job duration histogram
/// Labels: job
pub static JOB_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let opts = HistogramOpts::new(
        "nixopus_scheduler_job_duration_seconds",
        "Scheduler job latency distribution in seconds",
    )
    .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0]);
    let histogram = HistogramVec::new(opts, &["job"])
        .expect("Failed to create job duration histogram");
    REGISTRY
        .register(Box::new(histogram.clone()))
        .expect("Failed to register job duration histogram");
    histogram
});

/// Health probe results
/// Labels: status (healthy, unhealthy, error)
pub static PROBES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    let opts = Opts::new(
        "nixopus_healthcheck_probes_total",
        "Total number of health probes by classification",
    );
    let counter =
        CounterVec::new(opts, &["status"]).expect("Failed to create probes counter");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("Failed to register probes counter");
    counter
});

pub static PROBE_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    let opts = HistogramOpts::new(
        "nixopus_healthcheck_probe_duration_seconds",
        "Health probe latency distribution in seconds",
    )
    .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 120.0]);
    let histogram =
        Histogram::with_opts(opts).expect("Failed to create probe duration histogram");
    REGISTRY
        .register(Box::new(histogram.clone()))
        .expect("Failed to register probe duration histogram");
    histogram
});

/// Number of open WebSocket connections
pub static WS_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    let opts = Opts::new("nixopus_ws_connections", "Number of open WebSocket connections");
    let gauge = IntGauge::with_opts(opts).expect("Failed to create ws connections gauge");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("Failed to register ws connections gauge");
    gauge
});

/// Failed WebSocket writes
/// Labels: reason (lock_timeout, write_timeout, write_error, ...)
pub static WS_WRITE_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    let opts = Opts::new(
        "nixopus_ws_write_failures_total",
        "Total number of failed WebSocket writes by reason",
    );
    let counter = CounterVec::new(opts, &["reason"])
        .expect("Failed to create ws write failures counter");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("Failed to register ws write failures counter");
    counter
});

/// Records one scheduler job execution.
pub fn record_job_run(job: &str, result: &str, duration_seconds: f64) {
    JOB_RUNS_TOTAL.with_label_values(&[job, result]).inc();
    JOB_DURATION_SECONDS
        .with_label_values(&[job])
        .observe(duration_seconds);
}

/// Records one health probe.
pub fn record_probe(status: &str, duration_seconds: f64) {
    PROBES_TOTAL.with_label_values(&[status]).inc();
    PROBE_DURATION_SECONDS.observe(duration_seconds);
}

pub fn record_ws_write_failure(reason: &str) {
    WS_WRITE_FAILURES_TOTAL.with_label_values(&[reason]).inc();
}

/// Encodes all registered metrics in Prometheus text format
///
/// # Returns
///
/// Returns a String containing all metrics in Prometheus exposition format
pub fn encode_metrics() -> String {
    // Touch every metric so empty families still appear in the output.
    Lazy::force(&JOB_RUNS_TOTAL);
    Lazy::force(&JOB_DURATION_SECONDS);
    Lazy::force(&PROBES_TOTAL);
    Lazy::force(&PROBE_DURATION_SECONDS);
    Lazy::force(&WS_CONNECTIONS);
    Lazy::force(&WS_WRITE_FAILURES_TOTAL);

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_metrics_are_exported() {
        record_job_run("audit_logs_cleanup", "success", 0.2);
        record_probe("healthy", 0.05);
        record_ws_write_failure("lock_timeout");
        WS_CONNECTIONS.set(WS_CONNECTIONS.get());

        let text = encode_metrics();
        assert!(text.contains("nixopus_scheduler_job_runs_total"));
        assert!(text.contains("job=\"audit_logs_cleanup\""));
        assert!(text.contains("nixopus_healthcheck_probes_total"));
        assert!(text.contains("nixopus_healthcheck_probe_duration_seconds"));
        assert!(text.contains("nixopus_ws_write_failures_total"));
        assert!(text.contains("nixopus_ws_connections"));
    }
}
