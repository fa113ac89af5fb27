/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Persistent types for the Nixopus control plane.
//!
//! `schema` mirrors the tables created by the migrations shipped in
//! `migrations/`; `models` holds the row structs, insertables, and the
//! value objects (organization settings, health-check state) built on them.

pub mod models;
pub mod schema;
