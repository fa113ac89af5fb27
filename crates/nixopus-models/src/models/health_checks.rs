/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Health-check definitions and their derived state.
//!
//! A [`HealthCheck`] is one-to-one with an application. Besides the probe
//! definition it carries the failure and success streak counters that drive
//! the effective state (see [`effective_state`]).

use crate::schema::health_checks;
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

// =============================================================================
// Defaults and validation messages
// =============================================================================

pub const DEFAULT_ENDPOINT: &str = "/";
pub const DEFAULT_METHOD: &str = "GET";
pub const DEFAULT_TIMEOUT_SECONDS: i32 = 30;
pub const DEFAULT_INTERVAL_SECONDS: i32 = 60;
pub const DEFAULT_FAILURE_THRESHOLD: i32 = 3;
pub const DEFAULT_SUCCESS_THRESHOLD: i32 = 1;
pub const DEFAULT_RETENTION_DAYS: i32 = 30;
pub const DEFAULT_EXPECTED_STATUS: i32 = 200;

pub const MSG_INVALID_ENDPOINT: &str =
    "endpoint must be a path starting with / or an absolute http(s) URL";
pub const MSG_INVALID_METHOD: &str = "method must be one of GET, POST, HEAD";
pub const MSG_INVALID_TIMEOUT: &str = "timeout_seconds must be between 5 and 120";
pub const MSG_INVALID_INTERVAL: &str = "interval_seconds must be between 30 and 3600";
pub const MSG_INVALID_FAILURE_THRESHOLD: &str = "failure_threshold must be between 1 and 10";
pub const MSG_INVALID_SUCCESS_THRESHOLD: &str = "success_threshold must be between 1 and 10";
pub const MSG_INVALID_RETENTION: &str = "retention_days must be between 1 and 365";
pub const MSG_INVALID_STATUS_CODES: &str =
    "expected_status_codes must contain valid HTTP status codes";

pub fn validate_endpoint(endpoint: &str) -> Result<(), &'static str> {
    let lower = endpoint.to_ascii_lowercase();
    if endpoint.starts_with('/') {
        return Ok(());
    }
    for scheme in ["http://", "https://"] {
        if let Some(rest) = lower.strip_prefix(scheme) {
            if !rest.is_empty() && !rest.starts_with('/') {
                return Ok(());
            }
        }
    }
    Err(MSG_INVALID_ENDPOINT)
}

pub fn validate_timeout(value: i32) -> Result<(), &'static str> {
    in_range(value, 5, 120, MSG_INVALID_TIMEOUT)
}

pub fn validate_interval(value: i32) -> Result<(), &'static str> {
    in_range(value, 30, 3600, MSG_INVALID_INTERVAL)
}

pub fn validate_failure_threshold(value: i32) -> Result<(), &'static str> {
    in_range(value, 1, 10, MSG_INVALID_FAILURE_THRESHOLD)
}

pub fn validate_success_threshold(value: i32) -> Result<(), &'static str> {
    in_range(value, 1, 10, MSG_INVALID_SUCCESS_THRESHOLD)
}

pub fn validate_retention(value: i32) -> Result<(), &'static str> {
    in_range(value, 1, 365, MSG_INVALID_RETENTION)
}

pub fn validate_status_codes(codes: &[i32]) -> Result<(), &'static str> {
    if codes.is_empty() || codes.iter().any(|c| !(100..=599).contains(c)) {
        return Err(MSG_INVALID_STATUS_CODES);
    }
    Ok(())
}

fn in_range(value: i32, min: i32, max: i32, msg: &'static str) -> Result<(), &'static str> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(msg)
    }
}

// =============================================================================
// Enumerations
// =============================================================================

/// HTTP method a probe is issued with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeMethod {
    Get,
    Post,
    Head,
}

impl ProbeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeMethod::Get => "GET",
            ProbeMethod::Post => "POST",
            ProbeMethod::Head => "HEAD",
        }
    }
}

impl FromStr for ProbeMethod {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(ProbeMethod::Get),
            "POST" => Ok(ProbeMethod::Post),
            "HEAD" => Ok(ProbeMethod::Head),
            _ => Err(MSG_INVALID_METHOD),
        }
    }
}

impl fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Error,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Error => "error",
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl FromStr for HealthStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(HealthStatus::Healthy),
            "unhealthy" => Ok(HealthStatus::Unhealthy),
            "error" => Ok(HealthStatus::Error),
            other => Err(format!("unknown health status: {}", other)),
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived availability of a checked application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EffectiveState {
    Up,
    Down,
    Unknown,
}

impl EffectiveState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectiveState::Up => "up",
            EffectiveState::Down => "down",
            EffectiveState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EffectiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `unknown` until the first probe, then `down` iff the failure streak has
/// reached the threshold.
pub fn effective_state(
    last_checked_at: Option<DateTime<Utc>>,
    consecutive_fails: i32,
    failure_threshold: i32,
) -> EffectiveState {
    match last_checked_at {
        None => EffectiveState::Unknown,
        Some(_) if consecutive_fails >= failure_threshold => EffectiveState::Down,
        Some(_) => EffectiveState::Up,
    }
}

// =============================================================================
// Rows
// =============================================================================

/// A health-check row from the database.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = health_checks)]
pub struct HealthCheck {
    pub id: Uuid,
    pub application_id: Uuid,
    pub organization_id: Uuid,
    pub enabled: bool,
    /// Path relative to the application base URL, or an absolute URL.
    pub endpoint: String,
    pub method: String,
    pub expected_status_codes: Vec<i32>,
    pub timeout_seconds: i32,
    pub interval_seconds: i32,
    pub failure_threshold: i32,
    pub success_threshold: i32,
    /// JSON object of header name to value.
    pub headers: serde_json::Value,
    pub body: Option<String>,
    pub retention_days: i32,
    pub consecutive_fails: i32,
    pub consecutive_successes: i32,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HealthCheck {
    pub fn effective_state(&self) -> EffectiveState {
        effective_state(
            self.last_checked_at,
            self.consecutive_fails,
            self.failure_threshold,
        )
    }

    /// Never-probed checks are always due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_checked_at {
            None => true,
            Some(last) => now >= last + Duration::seconds(i64::from(self.interval_seconds)),
        }
    }

    /// Stored method, falling back to GET for values the database check should have rejected.
    pub fn probe_method(&self) -> ProbeMethod {
        self.method.parse().unwrap_or(ProbeMethod::Get)
    }

    /// Headers as string pairs; non-string values are skipped.
    pub fn header_map(&self) -> HashMap<String, String> {
        self.headers
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn expects(&self, status_code: i32) -> bool {
        self.expected_status_codes.contains(&status_code)
    }
}

/// A new health check to be inserted.
#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = health_checks)]
pub struct NewHealthCheck {
    pub application_id: Uuid,
    pub organization_id: Uuid,
    pub enabled: bool,
    pub endpoint: String,
    pub method: String,
    pub expected_status_codes: Vec<i32>,
    pub timeout_seconds: i32,
    pub interval_seconds: i32,
    pub failure_threshold: i32,
    pub success_threshold: i32,
    pub headers: serde_json::Value,
    pub body: Option<String>,
    pub retention_days: i32,
}

impl NewHealthCheck {
    /// A check with every default applied.
    pub fn with_defaults(application_id: Uuid, organization_id: Uuid) -> Self {
        Self {
            application_id,
            organization_id,
            enabled: true,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            method: DEFAULT_METHOD.to_string(),
            expected_status_codes: vec![DEFAULT_EXPECTED_STATUS],
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            headers: serde_json::json!({}),
            body: None,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }

    /// Checks every field against its allowed range.
    pub fn validate(&self) -> Result<(), &'static str> {
        validate_endpoint(&self.endpoint)?;
        self.method.parse::<ProbeMethod>()?;
        validate_timeout(self.timeout_seconds)?;
        validate_interval(self.interval_seconds)?;
        validate_failure_threshold(self.failure_threshold)?;
        validate_success_threshold(self.success_threshold)?;
        validate_retention(self.retention_days)?;
        validate_status_codes(&self.expected_status_codes)
    }
}

/// Partial update of a health-check definition. `None` fields are left as stored.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = health_checks)]
pub struct HealthCheckChangeset {
    pub enabled: Option<bool>,
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub expected_status_codes: Option<Vec<i32>>,
    pub timeout_seconds: Option<i32>,
    pub interval_seconds: Option<i32>,
    pub failure_threshold: Option<i32>,
    pub success_threshold: Option<i32>,
    pub headers: Option<serde_json::Value>,
    pub body: Option<String>,
    pub retention_days: Option<i32>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl HealthCheckChangeset {
    /// Validates only the fields that are present.
    pub fn validate(&self) -> Result<(), &'static str> {
        if let Some(endpoint) = &self.endpoint {
            validate_endpoint(endpoint)?;
        }
        if let Some(method) = &self.method {
            method.parse::<ProbeMethod>()?;
        }
        if let Some(v) = self.timeout_seconds {
            validate_timeout(v)?;
        }
        if let Some(v) = self.interval_seconds {
            validate_interval(v)?;
        }
        if let Some(v) = self.failure_threshold {
            validate_failure_threshold(v)?;
        }
        if let Some(v) = self.success_threshold {
            validate_success_threshold(v)?;
        }
        if let Some(v) = self.retention_days {
            validate_retention(v)?;
        }
        if let Some(codes) = &self.expected_status_codes {
            validate_status_codes(codes)?;
        }
        Ok(())
    }
}
