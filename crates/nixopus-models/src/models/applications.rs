/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Organizations and the applications they own.
//!
//! Both are managed by collaborators; the control plane reads them to scope
//! sweeps and to build probe URLs.

use crate::schema::{applications, organizations};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = organizations)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = organizations)]
pub struct NewOrganization {
    pub name: String,
}

impl NewOrganization {
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("Organization name cannot be empty".to_string());
        }
        Ok(Self { name })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = applications)]
pub struct Application {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    /// Public domain, with or without a scheme.
    pub domain: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    /// Base URL that relative probe endpoints are joined onto.
    pub fn base_url(&self, default_base_url: &str) -> String {
        base_url_for(self.domain.as_deref(), default_base_url)
    }
}

/// `https://<domain>` unless the domain already carries a scheme; the default
/// base URL when there is no domain.
pub fn base_url_for(domain: Option<&str>, default_base_url: &str) -> String {
    match domain.map(str::trim).filter(|d| !d.is_empty()) {
        Some(d) if d.starts_with("http://") || d.starts_with("https://") => {
            d.trim_end_matches('/').to_string()
        }
        Some(d) => format!("https://{}", d.trim_end_matches('/')),
        None => default_base_url.trim_end_matches('/').to_string(),
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = applications)]
pub struct NewApplication {
    pub organization_id: Uuid,
    pub name: String,
    pub domain: Option<String>,
}

impl NewApplication {
    pub fn new(
        organization_id: Uuid,
        name: impl Into<String>,
        domain: Option<String>,
    ) -> Result<Self, String> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("Application name cannot be empty".to_string());
        }
        Ok(Self {
            organization_id,
            name,
            domain,
        })
    }
}
