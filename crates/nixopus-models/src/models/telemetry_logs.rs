/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Append-only telemetry tables subject to retention sweeps.
//!
//! Rows are written by collaborators; the control plane only deletes them.
//! `created_at` is insertable so fixtures can seed aged rows.

use crate::schema::{application_logs, audit_logs, extension_logs};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = application_logs)]
pub struct NewApplicationLog {
    pub application_id: Uuid,
    pub log: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = audit_logs)]
pub struct NewAuditLog {
    pub organization_id: Uuid,
    pub action: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = extension_logs)]
pub struct NewExtensionLog {
    pub execution_id: Option<Uuid>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}
