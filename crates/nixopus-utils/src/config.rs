/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Nixopus Config Module
//! This module provides the configuration framework shared by the control-plane crates.
//!
//! # Variable Naming Convention
//!
//! - Struct fields use snake_case (e.g., `database`, `tick_seconds`)
//! - Environment variables use SCREAMING_SNAKE_CASE and are prefixed with "NIXOPUS__"
//!   (e.g., `NIXOPUS__DATABASE__URL`)
//! - Configuration file keys use snake_case (e.g., `database.url`, `healthcheck.tick_seconds`)
//!
//! # Configuration Overriding
//!
//! Values are loaded in the following order (later sources take precedence):
//!
//! 1. Default values from the embedded `default.toml` file
//! 2. Values from an optional external configuration file (if provided)
//! 3. `NIXOPUS__`-prefixed environment variables
//! 4. The short operational variables listed below
//!
//! # Operational Environment Variables
//!
//! These un-prefixed variables are honoured for compatibility with existing deployments:
//!
//! - `SCHEDULER_CRON`: cron expression for the maintenance sweep (default "0 2 * * *")
//! - `SCHEDULER_JOB_TIMEOUT_SEC`: per-job timeout (default 300)
//! - `SCHEDULER_QUERY_TIMEOUT_SEC`: timeout for the organization settings fetch (default 30)
//! - `HEALTHCHECK_TICK_SEC`: health loop period (default 10)
//! - `DOCKER_HOST`: Docker daemon socket used by maintenance jobs

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

// Include the default settings file as a string constant
const DEFAULT_SETTINGS: &str = include_str!("../default.toml");

/// Un-prefixed environment variables and the configuration keys they override.
const OPERATIONAL_ENV_OVERRIDES: &[(&str, &str)] = &[
    ("SCHEDULER_CRON", "scheduler.cron"),
    ("SCHEDULER_JOB_TIMEOUT_SEC", "scheduler.job_timeout_seconds"),
    ("SCHEDULER_QUERY_TIMEOUT_SEC", "scheduler.query_timeout_seconds"),
    ("HEALTHCHECK_TICK_SEC", "healthcheck.tick_seconds"),
    ("DOCKER_HOST", "docker.host"),
];

/// Represents the main settings structure for the application
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Database configuration
    pub database: Database,
    /// Logging configuration
    pub log: Log,
    /// HTTP server configuration
    pub server: Server,
    /// Maintenance scheduler configuration
    pub scheduler: Scheduler,
    /// Health-check loop configuration
    pub healthcheck: HealthCheck,
    /// WebSocket hub configuration
    pub realtime: Realtime,
    /// SSH target used by container monitoring and terminals
    pub ssh: Ssh,
    /// Docker daemon configuration
    pub docker: Docker,
    /// Telemetry configuration
    pub telemetry: Telemetry,
}

/// Represents the database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Database {
    /// Database connection URL
    pub url: String,
    /// Maximum number of pooled connections
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

fn default_pool_size() -> u32 {
    10
}

/// Represents the logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Log {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,
    /// Log format: "text" for human-readable, "json" for structured JSON
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_format() -> String {
    "text".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct Server {
    /// Address the HTTP/WebSocket listener binds to
    pub bind_address: String,
}

/// Cron driver knobs.
#[derive(Debug, Deserialize, Clone)]
pub struct Scheduler {
    /// Five-field cron expression, evaluated in UTC
    pub cron: String,
    /// Upper bound for a single job invocation
    pub job_timeout_seconds: u64,
    /// Upper bound for fetching organization settings at the start of a sweep
    pub query_timeout_seconds: u64,
}

/// Health loop knobs.
#[derive(Debug, Deserialize, Clone)]
pub struct HealthCheck {
    /// Ticker period in seconds
    pub tick_seconds: u64,
    /// Maximum probes in flight at once (0 disables the cap)
    pub max_concurrent_probes: usize,
    /// Base URL for relative endpoints when an application has no domain
    pub default_base_url: String,
    /// Whether probes follow HTTP redirects
    #[serde(default)]
    pub follow_redirects: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Realtime {
    /// Time allowed to acquire a connection's write lock
    pub lock_timeout_ms: u64,
    /// Write deadline for a single frame
    pub write_timeout_ms: u64,
    /// Default container monitor period
    pub monitor_interval_seconds: u64,
    /// Terminal output flush period
    pub terminal_flush_ms: u64,
    /// Terminal output buffer bound
    pub terminal_buffer_bytes: usize,
}

/// SSH target configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct Ssh {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Password authentication (used when no private key is configured)
    pub password: Option<String>,
    /// Path to a private key for public-key authentication
    pub private_key_path: Option<String>,
    pub passphrase: Option<String>,
    #[serde(default = "default_ssh_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

fn default_ssh_connect_timeout() -> u64 {
    10
}

/// Docker daemon configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct Docker {
    /// Daemon address passed to the docker CLI as DOCKER_HOST
    pub host: String,
}

/// Represents the telemetry (OpenTelemetry) configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Telemetry {
    /// Whether OTLP trace export is enabled
    #[serde(default)]
    pub enabled: bool,
    /// OTLP endpoint for trace export (gRPC)
    #[serde(default = "default_otlp_endpoint")]
    pub otlp_endpoint: String,
    /// Service name for traces
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Sampling rate (0.0 to 1.0)
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,
}

fn default_otlp_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "nixopus-server".to_string()
}

fn default_sampling_rate() -> f64 {
    0.1
}

impl Settings {
    /// Creates a new `Settings` instance
    ///
    /// # Arguments
    ///
    /// * `file` - An optional path to a configuration file
    ///
    /// # Returns
    ///
    /// Returns a `Result` containing the `Settings` instance or a `ConfigError`
    pub fn new(file: Option<String>) -> Result<Self, ConfigError> {
        // Start with default settings from the embedded TOML file
        let mut s = Config::builder()
            .add_source(File::from_str(DEFAULT_SETTINGS, config::FileFormat::Toml));

        if let Some(path) = file {
            s = s.add_source(File::with_name(path.as_str()));
        }

        s = s.add_source(Environment::with_prefix("NIXOPUS").separator("__"));

        for (var, key) in OPERATIONAL_ENV_OVERRIDES {
            if let Ok(value) = std::env::var(var) {
                if !value.trim().is_empty() {
                    s = s.set_override(*key, value)?;
                }
            }
        }

        s.build()?.try_deserialize()
    }
}
