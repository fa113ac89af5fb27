/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::api::v1::error::ErrorBody;
use crate::api::v1::healthcheck::{
    self, CreateHealthCheckRequest, HealthCheckView, ToggleHealthCheckRequest,
    UpdateHealthCheckRequest,
};
use crate::realtime::{Envelope, TopicKind};
use nixopus_models::models::{EffectiveState, HealthCheckResult, HealthCheckStats, HealthStatus};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        healthcheck::create_health_check,
        healthcheck::update_health_check,
        healthcheck::delete_health_check,
        healthcheck::toggle_health_check,
        healthcheck::get_health_check,
        healthcheck::list_health_check_results,
        healthcheck::get_health_check_stats,
    ),
    components(schemas(
        CreateHealthCheckRequest,
        UpdateHealthCheckRequest,
        ToggleHealthCheckRequest,
        HealthCheckView,
        HealthCheckResult,
        HealthCheckStats,
        HealthStatus,
        EffectiveState,
        ErrorBody,
        Envelope,
        TopicKind,
    )),
    modifiers(&OrganizationHeader),
    tags(
        (name = "healthcheck", description = "Application health checks"),
    )
)]
pub struct ApiDoc;

/// Documents the organization header every `/api/v1` route requires.
struct OrganizationHeader;

impl Modify for OrganizationHeader {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "organization",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(
                    super::middleware::ORGANIZATION_HEADER,
                ))),
            );
        }
    }
}
