/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Nixopus Server
//!
//! The operational control plane: periodic maintenance of tenant data and
//! Docker state ([`scheduler`]), per-application HTTP health checks
//! ([`healthcheck`]), and a WebSocket hub that fans out health events,
//! live container statistics, and interactive terminals ([`realtime`]).
//!
//! [`api`] exposes all of it over axum; [`cli`] wires it together.

pub mod api;
pub mod cli;
pub mod dal;
pub mod db;
pub mod docker;
pub mod healthcheck;
pub mod metrics;
pub mod realtime;
pub mod scheduler;
pub mod ssh;
