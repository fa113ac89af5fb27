/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Per-application health checking.
//!
//! [`probe`] issues one HTTP request and classifies it, [`state`] holds the
//! streak counters and the effective-state machine, and [`engine`] is the
//! ticker that selects due checks, fans probes out, persists results, and
//! broadcasts them.

pub mod engine;
pub mod probe;
pub mod state;

pub use engine::{EngineConfig, HealthEngine, HealthStore};
pub use probe::{HttpProber, ProbeExecutor, ProbeOutcome};
