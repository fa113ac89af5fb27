/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Request context extractors.
//!
//! Authentication happens upstream; by the time a request reaches the
//! control API the caller's organization is carried in a header.

use super::error::{ApiError, MSG_MISSING_ORGANIZATION};
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

pub const ORGANIZATION_HEADER: &str = "X-Organization-Id";

/// The calling organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrganizationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for OrganizationId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(ORGANIZATION_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .map(OrganizationId)
            .ok_or_else(|| ApiError::validation(MSG_MISSING_ORGANIZATION))
    }
}
