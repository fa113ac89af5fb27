/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Append-only probe results.

use crate::models::health_checks::HealthStatus;
use crate::schema::health_check_results;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = health_check_results)]
pub struct HealthCheckResult {
    pub id: Uuid,
    pub health_check_id: Uuid,
    /// One of `healthy`, `unhealthy`, `error`.
    pub status: String,
    /// Zero when no HTTP response was received.
    pub status_code: i32,
    pub response_time_ms: Option<i32>,
    /// Empty when the probe passed.
    pub error_message: String,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = health_check_results)]
pub struct NewHealthCheckResult {
    pub health_check_id: Uuid,
    pub status: String,
    pub status_code: i32,
    pub response_time_ms: Option<i32>,
    pub error_message: String,
    pub checked_at: DateTime<Utc>,
}

impl NewHealthCheckResult {
    pub fn new(
        health_check_id: Uuid,
        status: HealthStatus,
        status_code: i32,
        response_time_ms: Option<i32>,
        error_message: String,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            health_check_id,
            status: status.as_str().to_string(),
            status_code,
            response_time_ms,
            error_message,
            checked_at,
        }
    }
}

/// Aggregate over a window of results.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct HealthCheckStats {
    pub total_checks: i64,
    pub successful_checks: i64,
    pub failed_checks: i64,
    pub uptime_percentage: f64,
    pub avg_response_time_ms: f64,
}

impl HealthCheckStats {
    /// Folds a set of results. Only results with a recorded latency contribute
    /// to the average.
    pub fn from_results(results: &[HealthCheckResult]) -> Self {
        let total = results.len() as i64;
        let successful = results
            .iter()
            .filter(|r| r.status == HealthStatus::Healthy.as_str())
            .count() as i64;
        let latencies: Vec<i64> = results
            .iter()
            .filter_map(|r| r.response_time_ms.map(i64::from))
            .collect();
        let avg = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<i64>() as f64 / latencies.len() as f64
        };
        let uptime = if total == 0 {
            0.0
        } else {
            successful as f64 * 100.0 / total as f64
        };
        Self {
            total_checks: total,
            successful_checks: successful,
            failed_checks: total - successful,
            uptime_percentage: uptime,
            avg_response_time_ms: avg,
        }
    }
}
