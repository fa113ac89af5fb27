/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Nixopus Telemetry Module
//!
//! Installs the global `tracing` subscriber and, when enabled, an OpenTelemetry
//! OTLP exporter for distributed traces.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use nixopus_utils::{telemetry, Settings};
//!
//! let settings = Settings::new(None)?;
//! telemetry::init(&settings.telemetry, &settings.log)?;
//! tracing::info!("Application started");
//! ```

use crate::config::{Log, Telemetry};
use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::Sampler;
use opentelemetry_sdk::{runtime, Resource};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Error type for telemetry initialization
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to create OTLP exporter
    #[error("OTLP exporter error: {0}")]
    Exporter(String),
    /// Failed to set global subscriber
    #[error("Subscriber error: {0}")]
    Subscriber(String),
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Builds the console layer in the configured format.
fn fmt_layer(format: &str) -> BoxedLayer {
    if format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    }
}

/// Maps a sampling rate onto an OpenTelemetry sampler.
fn sampler_for(rate: f64) -> Sampler {
    if rate >= 1.0 {
        Sampler::AlwaysOn
    } else if rate <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(rate)
    }
}

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over `log.level` when set. If telemetry is
/// disabled only the console subscriber is installed.
pub fn init(telemetry: &Telemetry, log: &Log) -> Result<(), TelemetryError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));

    let mut layers: Vec<BoxedLayer> = vec![env_filter.boxed(), fmt_layer(&log.format)];

    if telemetry.enabled {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&telemetry.otlp_endpoint)
            .build()
            .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

        let tracer_provider = opentelemetry_sdk::trace::TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_sampler(sampler_for(telemetry.sampling_rate))
            .with_resource(Resource::new(vec![
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                    telemetry.service_name.clone(),
                ),
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                    env!("CARGO_PKG_VERSION"),
                ),
            ]))
            .build();

        let tracer = tracer_provider.tracer(telemetry.service_name.clone());
        opentelemetry::global::set_tracer_provider(tracer_provider);
        layers.push(tracing_opentelemetry::layer().with_tracer(tracer).boxed());
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| TelemetryError::Subscriber(e.to_string()))
}

/// Shutdown OpenTelemetry, flushing any pending traces.
pub fn shutdown() {
    opentelemetry::global::shutdown_tracer_provider();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampler_bounds() {
        assert!(matches!(sampler_for(1.5), Sampler::AlwaysOn));
        assert!(matches!(sampler_for(-0.5), Sampler::AlwaysOff));
        assert!(matches!(sampler_for(0.25), Sampler::TraceIdRatioBased(_)));
    }
}
