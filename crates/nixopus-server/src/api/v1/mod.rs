/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Version 1 of the control API.

pub mod error;
pub mod healthcheck;
pub mod middleware;
pub mod openapi;

use crate::api::AppState;
use axum::Router;

pub fn routes() -> Router<AppState> {
    Router::new().merge(healthcheck::routes())
}
