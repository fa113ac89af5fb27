/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Data models for the control plane to interact with
pub mod applications;
pub mod health_check_results;
pub mod health_checks;
pub mod organization_settings;
pub mod telemetry_logs;

pub use applications::{Application, NewApplication, NewOrganization, Organization};
pub use health_check_results::{HealthCheckResult, HealthCheckStats, NewHealthCheckResult};
pub use health_checks::{
    EffectiveState, HealthCheck, HealthCheckChangeset, HealthStatus, NewHealthCheck, ProbeMethod,
};
pub use organization_settings::{
    NewOrganizationSettings, OrganizationSettings, ResolvedSettings, SettingsData,
    DEFAULT_RETENTION_DAYS,
};
pub use telemetry_logs::{NewApplicationLog, NewAuditLog, NewExtensionLog};
