/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Nixopus Logging Module
//!
//! All crates log through `tracing`. This module offers a one-call console
//! setup for tools and tests that do not need the full telemetry pipeline,
//! plus the prelude every module imports its macros from.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use nixopus_utils::logging::{self, prelude::*};
//!
//! logging::init("debug", "text");
//! info!("Logger initialized");
//! ```

use crate::config::{Log, Telemetry};

/// Installs a console subscriber at the given level and format.
///
/// Calling it more than once is harmless: later calls leave the first
/// subscriber in place.
pub fn init(level: &str, format: &str) {
    let log = Log {
        level: level.to_string(),
        format: format.to_string(),
    };
    let telemetry = Telemetry {
        enabled: false,
        otlp_endpoint: String::new(),
        service_name: String::new(),
        sampling_rate: 0.0,
    };
    let _ = crate::telemetry::init(&telemetry, &log);
}

pub mod prelude {
    pub use tracing::{debug, error, info, trace, warn};
    pub use tracing::{instrument, Instrument};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_repeated_init_does_not_panic() {
        super::init("debug", "text");
        super::init("info", "json");
        debug!("this is a debug message");
        info!(component = "logging", "structured fields are accepted");
    }
}
