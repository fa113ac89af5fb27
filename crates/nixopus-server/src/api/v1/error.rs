/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! API error and success bodies.

use crate::dal::DalError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use nixopus_utils::logging::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

pub const MSG_INVALID_APPLICATION_ID: &str = "invalid application id";
pub const MSG_INVALID_LIMIT: &str = "limit must be between 1 and 1000";
pub const MSG_INVALID_PERIOD: &str = "invalid period";
pub const MSG_INVALID_TIME_RANGE: &str = "invalid time range";
pub const MSG_MISSING_ORGANIZATION: &str = "missing organization id";
pub const MSG_INTERNAL: &str = "internal server error";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// Detail is logged, never returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::Internal(_) => MSG_INTERNAL.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<DalError> for ApiError {
    fn from(e: DalError) -> Self {
        if let DalError::Query(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) =
            &e
        {
            return ApiError::Conflict("health check already exists for this application".into());
        }
        error!("Storage error while handling request: {}", e);
        ApiError::Internal(e.to_string())
    }
}

/// `{status: "error", error}`
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub status: String,
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            status: "error".to_string(),
            error: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// `{status: "success", message, data}`
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: T,
}

pub fn success<T: Serialize>(message: impl Into<String>, data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        status: "success".to_string(),
        message: message.into(),
        data,
    })
}
