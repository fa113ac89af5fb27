/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # API Routes Aggregator Module
//!
//! Assembles the control API (`/api/v1`), the WebSocket upgrade (`/ws`)
//! and the operational endpoints (`/healthz`, `/readyz`, `/metrics`,
//! `/docs/openapi.json`).

pub mod v1;
pub mod ws;

use crate::dal::DAL;
use crate::metrics::encode_metrics;
use crate::realtime::Hub;
use axum::extract::{FromRef, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use diesel::RunQueryDsl;
use nixopus_utils::logging::prelude::*;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub dal: DAL,
    pub hub: Arc<Hub>,
}

impl FromRef<AppState> for DAL {
    fn from_ref(state: &AppState) -> Self {
        state.dal.clone()
    }
}

impl FromRef<AppState> for Arc<Hub> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.hub)
    }
}

/// Builds the full router.
pub fn configure_api_routes(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", v1::routes())
        .route("/ws", get(ws::ws_handler))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/docs/openapi.json", get(openapi_json))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness: the process is serving requests.
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness: the database answers.
async fn readyz(State(dal): State<DAL>) -> impl IntoResponse {
    let ping = dal
        .run_blocking(|dal| {
            let conn = &mut dal.conn()?;
            diesel::sql_query("SELECT 1").execute(conn)?;
            Ok(())
        })
        .await;
    match ping {
        Ok(()) => (StatusCode::OK, "Ready"),
        Err(e) => {
            warn!("Readiness check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "Not Ready")
        }
    }
}

/// Prometheus text exposition.
async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}

async fn openapi_json() -> impl IntoResponse {
    Json(v1::openapi::ApiDoc::openapi())
}
