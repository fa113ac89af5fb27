/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Nixopus control plane binary.

use nixopus_server::cli::{commands, parse_cli, Commands};
use nixopus_utils::config::Settings;
use nixopus_utils::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let cli = parse_cli();

    let config = Settings::new(cli.config.clone())?;
    telemetry::init(&config.telemetry, &config.log)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => commands::serve(&config).await?,
        Commands::RunJobs => commands::run_jobs(&config).await?,
    }
    Ok(())
}
