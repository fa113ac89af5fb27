/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Health-check API endpoints.
//!
//! One check per application. Every route is scoped to the calling
//! organization; applications of other organizations look missing.

use crate::api::v1::error::{
    success, ApiError, ApiResponse, ErrorBody, MSG_INVALID_APPLICATION_ID, MSG_INVALID_LIMIT,
    MSG_INVALID_PERIOD, MSG_INVALID_TIME_RANGE,
};
use crate::api::v1::middleware::OrganizationId;
use crate::api::AppState;
use crate::dal::DAL;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use nixopus_models::models::{
    EffectiveState, HealthCheck, HealthCheckChangeset, HealthCheckResult, HealthCheckStats,
    NewHealthCheck, ProbeMethod,
};
use nixopus_utils::logging::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

pub const DEFAULT_RESULTS_LIMIT: i64 = 100;
pub const MAX_RESULTS_LIMIT: i64 = 1000;
pub const DEFAULT_STATS_PERIOD: &str = "24h";

const MSG_APPLICATION_NOT_FOUND: &str = "application not found";
const MSG_HEALTH_CHECK_NOT_FOUND: &str = "health check not found";
const MSG_INVALID_BODY: &str = "invalid request body";
const MSG_INVALID_QUERY: &str = "invalid query parameters";

pub fn routes() -> Router<AppState> {
    info!("Setting up health check routes");
    Router::new()
        .route(
            "/healthcheck",
            get(get_health_check)
                .post(create_health_check)
                .put(update_health_check)
                .delete(delete_health_check),
        )
        .route("/healthcheck/toggle", post(toggle_health_check))
        .route("/healthcheck/results", get(list_health_check_results))
        .route("/healthcheck/stats", get(get_health_check_stats))
}

/// A stored check plus its derived state.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthCheckView {
    #[serde(flatten)]
    pub check: HealthCheck,
    pub effective_state: EffectiveState,
}

impl From<HealthCheck> for HealthCheckView {
    fn from(check: HealthCheck) -> Self {
        let effective_state = check.effective_state();
        Self {
            check,
            effective_state,
        }
    }
}

/// Request body for creating a check. Omitted fields take their defaults.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CreateHealthCheckRequest {
    pub application_id: String,
    pub enabled: Option<bool>,
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub expected_status_codes: Option<Vec<i32>>,
    pub timeout_seconds: Option<i32>,
    pub interval_seconds: Option<i32>,
    pub failure_threshold: Option<i32>,
    pub success_threshold: Option<i32>,
    pub headers: Option<HashMap<String, String>>,
    pub body: Option<String>,
    pub retention_days: Option<i32>,
}

impl CreateHealthCheckRequest {
    fn into_new(
        self,
        application_id: Uuid,
        organization_id: Uuid,
    ) -> Result<NewHealthCheck, ApiError> {
        let mut new = NewHealthCheck::with_defaults(application_id, organization_id);
        if let Some(enabled) = self.enabled {
            new.enabled = enabled;
        }
        if let Some(endpoint) = self.endpoint {
            new.endpoint = endpoint;
        }
        if let Some(method) = self.method {
            new.method = normalize_method(&method)?;
        }
        if let Some(codes) = self.expected_status_codes {
            new.expected_status_codes = codes;
        }
        if let Some(v) = self.timeout_seconds {
            new.timeout_seconds = v;
        }
        if let Some(v) = self.interval_seconds {
            new.interval_seconds = v;
        }
        if let Some(v) = self.failure_threshold {
            new.failure_threshold = v;
        }
        if let Some(v) = self.success_threshold {
            new.success_threshold = v;
        }
        if let Some(headers) = self.headers {
            new.headers = headers_value(headers);
        }
        new.body = self.body;
        if let Some(v) = self.retention_days {
            new.retention_days = v;
        }
        new.validate().map_err(ApiError::validation)?;
        Ok(new)
    }
}

/// Request body for updating a check. Only present fields are validated and written.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateHealthCheckRequest {
    pub application_id: String,
    pub enabled: Option<bool>,
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub expected_status_codes: Option<Vec<i32>>,
    pub timeout_seconds: Option<i32>,
    pub interval_seconds: Option<i32>,
    pub failure_threshold: Option<i32>,
    pub success_threshold: Option<i32>,
    pub headers: Option<HashMap<String, String>>,
    pub body: Option<String>,
    pub retention_days: Option<i32>,
}

impl UpdateHealthCheckRequest {
    fn into_changeset(self) -> Result<HealthCheckChangeset, ApiError> {
        let changes = HealthCheckChangeset {
            enabled: self.enabled,
            endpoint: self.endpoint,
            method: self.method.as_deref().map(normalize_method).transpose()?,
            expected_status_codes: self.expected_status_codes,
            timeout_seconds: self.timeout_seconds,
            interval_seconds: self.interval_seconds,
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            headers: self.headers.map(headers_value),
            body: self.body,
            retention_days: self.retention_days,
            updated_at: None,
        };
        changes.validate().map_err(ApiError::validation)?;
        Ok(changes)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ToggleHealthCheckRequest {
    pub application_id: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ApplicationQuery {
    /// Application the check belongs to.
    pub application_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ResultsQuery {
    pub application_id: Option<String>,
    /// 1 to 1000, default 100.
    pub limit: Option<i64>,
    /// RFC 3339 lower bound on `checked_at`.
    pub start_time: Option<String>,
    /// RFC 3339 upper bound on `checked_at`.
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatsQuery {
    pub application_id: Option<String>,
    /// `<n>m`, `<n>h` or `<n>d`, default `24h`.
    pub period: Option<String>,
}

fn normalize_method(method: &str) -> Result<String, ApiError> {
    method
        .parse::<ProbeMethod>()
        .map(|m| m.as_str().to_string())
        .map_err(ApiError::validation)
}

fn headers_value(headers: HashMap<String, String>) -> serde_json::Value {
    serde_json::Value::Object(
        headers
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect(),
    )
}

fn parse_application_id(raw: Option<&str>) -> Result<Uuid, ApiError> {
    raw.and_then(|s| Uuid::parse_str(s.trim()).ok())
        .ok_or_else(|| ApiError::validation(MSG_INVALID_APPLICATION_ID))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|e| {
            debug!("Rejected request body: {}", e);
            ApiError::validation(MSG_INVALID_BODY)
        })
}

fn query<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    params.map(|Query(inner)| inner).map_err(|e| {
        debug!("Rejected query string: {}", e);
        ApiError::validation(MSG_INVALID_QUERY)
    })
}

fn parse_limit(limit: Option<i64>) -> Result<i64, ApiError> {
    match limit {
        None => Ok(DEFAULT_RESULTS_LIMIT),
        Some(n) if (1..=MAX_RESULTS_LIMIT).contains(&n) => Ok(n),
        Some(_) => Err(ApiError::validation(MSG_INVALID_LIMIT)),
    }
}

fn parse_time(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, ApiError> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| ApiError::validation(MSG_INVALID_TIME_RANGE))
    })
    .transpose()
}

/// Parses `<n>m`, `<n>h` or `<n>d` with `n > 0`.
pub fn parse_period(period: &str) -> Option<Duration> {
    let period = period.trim();
    let unit = period.chars().last()?;
    let amount: i64 = period[..period.len() - unit.len_utf8()].parse().ok()?;
    if amount <= 0 {
        return None;
    }
    match unit {
        'm' => Duration::try_minutes(amount),
        'h' => Duration::try_hours(amount),
        'd' => Duration::try_days(amount),
        _ => None,
    }
}

/// Resolves the check of an application, 404 when there is none.
async fn require_check(
    dal: &DAL,
    organization_id: Uuid,
    application_id: Uuid,
) -> Result<HealthCheck, ApiError> {
    dal.run_blocking(move |dal| {
        dal.health_checks()
            .get_by_application(organization_id, application_id)
    })
    .await?
    .ok_or_else(|| ApiError::NotFound(MSG_HEALTH_CHECK_NOT_FOUND.into()))
}

/// Creates the health check of an application.
#[utoipa::path(
    post,
    path = "/api/v1/healthcheck",
    tag = "healthcheck",
    request_body = CreateHealthCheckRequest,
    responses(
        (status = 200, description = "Health check created", body = ApiResponse<HealthCheckView>),
        (status = 400, description = "Validation failed", body = ErrorBody),
        (status = 404, description = "Application not found", body = ErrorBody),
        (status = 409, description = "The application already has a health check", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody),
    )
)]
pub async fn create_health_check(
    State(dal): State<DAL>,
    OrganizationId(organization_id): OrganizationId,
    payload: Result<Json<CreateHealthCheckRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<HealthCheckView>>, ApiError> {
    let request = body(payload)?;
    let application_id = parse_application_id(Some(request.application_id.as_str()))?;
    let new_check = request.into_new(application_id, organization_id)?;

    let created = dal
        .run_blocking(move |dal| {
            if dal
                .applications()
                .get_in_organization(organization_id, application_id)?
                .is_none()
            {
                return Ok(None);
            }
            dal.health_checks().create(&new_check).map(Some)
        })
        .await?
        .ok_or_else(|| ApiError::NotFound(MSG_APPLICATION_NOT_FOUND.into()))?;

    info!(
        "Created health check {} for application {}",
        created.id, application_id
    );
    Ok(success("health check created", created.into()))
}

/// Updates the health check of an application.
#[utoipa::path(
    put,
    path = "/api/v1/healthcheck",
    tag = "healthcheck",
    request_body = UpdateHealthCheckRequest,
    responses(
        (status = 200, description = "Health check updated", body = ApiResponse<HealthCheckView>),
        (status = 400, description = "Validation failed", body = ErrorBody),
        (status = 404, description = "Health check not found", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody),
    )
)]
pub async fn update_health_check(
    State(dal): State<DAL>,
    OrganizationId(organization_id): OrganizationId,
    payload: Result<Json<UpdateHealthCheckRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<HealthCheckView>>, ApiError> {
    let request = body(payload)?;
    let application_id = parse_application_id(Some(request.application_id.as_str()))?;
    let changes = request.into_changeset()?;

    let updated = dal
        .run_blocking(move |dal| {
            dal.health_checks()
                .update(organization_id, application_id, &changes)
        })
        .await?
        .ok_or_else(|| ApiError::NotFound(MSG_HEALTH_CHECK_NOT_FOUND.into()))?;

    info!("Updated health check {}", updated.id);
    Ok(success("health check updated", updated.into()))
}

/// Deletes the health check of an application and its results.
///
/// Deleting a check that does not exist succeeds.
#[utoipa::path(
    delete,
    path = "/api/v1/healthcheck",
    tag = "healthcheck",
    params(ApplicationQuery),
    responses(
        (status = 200, description = "Health check deleted"),
        (status = 400, description = "Invalid application id", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody),
    )
)]
pub async fn delete_health_check(
    State(dal): State<DAL>,
    OrganizationId(organization_id): OrganizationId,
    params: Result<Query<ApplicationQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let params = query(params)?;
    let application_id = parse_application_id(params.application_id.as_deref())?;

    let deleted = dal
        .run_blocking(move |dal| dal.health_checks().delete(organization_id, application_id))
        .await?;
    if deleted > 0 {
        info!("Deleted health check of application {}", application_id);
    }
    Ok(success("health check deleted", serde_json::Value::Null))
}

/// Enables or disables a check without touching its counters.
#[utoipa::path(
    post,
    path = "/api/v1/healthcheck/toggle",
    tag = "healthcheck",
    request_body = ToggleHealthCheckRequest,
    responses(
        (status = 200, description = "Health check toggled", body = ApiResponse<HealthCheckView>),
        (status = 400, description = "Invalid request", body = ErrorBody),
        (status = 404, description = "Health check not found", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody),
    )
)]
pub async fn toggle_health_check(
    State(dal): State<DAL>,
    OrganizationId(organization_id): OrganizationId,
    payload: Result<Json<ToggleHealthCheckRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<HealthCheckView>>, ApiError> {
    let request = body(payload)?;
    let application_id = parse_application_id(Some(request.application_id.as_str()))?;
    let enabled = request.enabled;

    let toggled = dal
        .run_blocking(move |dal| {
            dal.health_checks()
                .set_enabled(organization_id, application_id, enabled)
        })
        .await?
        .ok_or_else(|| ApiError::NotFound(MSG_HEALTH_CHECK_NOT_FOUND.into()))?;

    info!(
        "Health check {} {}",
        toggled.id,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(success("health check toggled", toggled.into()))
}

/// Returns the check of an application, or null when it has none.
#[utoipa::path(
    get,
    path = "/api/v1/healthcheck",
    tag = "healthcheck",
    params(ApplicationQuery),
    responses(
        (status = 200, description = "The health check, or null", body = ApiResponse<Option<HealthCheckView>>),
        (status = 400, description = "Invalid application id", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody),
    )
)]
pub async fn get_health_check(
    State(dal): State<DAL>,
    OrganizationId(organization_id): OrganizationId,
    params: Result<Query<ApplicationQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Option<HealthCheckView>>>, ApiError> {
    let params = query(params)?;
    let application_id = parse_application_id(params.application_id.as_deref())?;

    let check = dal
        .run_blocking(move |dal| {
            dal.health_checks()
                .get_by_application(organization_id, application_id)
        })
        .await?;
    Ok(success(
        "health check retrieved",
        check.map(HealthCheckView::from),
    ))
}

/// Lists probe results newest-first.
#[utoipa::path(
    get,
    path = "/api/v1/healthcheck/results",
    tag = "healthcheck",
    params(ResultsQuery),
    responses(
        (status = 200, description = "Probe results", body = ApiResponse<Vec<HealthCheckResult>>),
        (status = 400, description = "Invalid query", body = ErrorBody),
        (status = 404, description = "Health check not found", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody),
    )
)]
pub async fn list_health_check_results(
    State(dal): State<DAL>,
    OrganizationId(organization_id): OrganizationId,
    params: Result<Query<ResultsQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<HealthCheckResult>>>, ApiError> {
    let params = query(params)?;
    let application_id = parse_application_id(params.application_id.as_deref())?;
    let limit = parse_limit(params.limit)?;
    let start_time = parse_time(params.start_time.as_deref())?;
    let end_time = parse_time(params.end_time.as_deref())?;
    if let (Some(start), Some(end)) = (start_time, end_time) {
        if start > end {
            return Err(ApiError::validation(MSG_INVALID_TIME_RANGE));
        }
    }

    let check = require_check(&dal, organization_id, application_id).await?;
    let results = dal
        .run_blocking(move |dal| {
            dal.health_check_results()
                .list(check.id, limit, start_time, end_time)
        })
        .await?;
    Ok(success("health check results retrieved", results))
}

/// Aggregates results over a trailing period.
#[utoipa::path(
    get,
    path = "/api/v1/healthcheck/stats",
    tag = "healthcheck",
    params(StatsQuery),
    responses(
        (status = 200, description = "Aggregated statistics", body = ApiResponse<HealthCheckStats>),
        (status = 400, description = "Invalid query", body = ErrorBody),
        (status = 404, description = "Health check not found", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody),
    )
)]
pub async fn get_health_check_stats(
    State(dal): State<DAL>,
    OrganizationId(organization_id): OrganizationId,
    params: Result<Query<StatsQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<HealthCheckStats>>, ApiError> {
    let params = query(params)?;
    let application_id = parse_application_id(params.application_id.as_deref())?;
    let period = parse_period(params.period.as_deref().unwrap_or(DEFAULT_STATS_PERIOD))
        .ok_or_else(|| ApiError::validation(MSG_INVALID_PERIOD))?;

    let check = require_check(&dal, organization_id, application_id).await?;
    let since = Utc::now() - period;
    let stats = dal
        .run_blocking(move |dal| dal.health_check_results().stats_since(check.id, since))
        .await?;
    Ok(success("health check stats retrieved", stats))
}
