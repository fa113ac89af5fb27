/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

mod health_check_results;
mod health_checks;
mod organization_settings;
mod telemetry_logs;
