/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::api::{self, AppState};
use crate::dal::DAL;
use crate::db::{create_shared_connection_pool, redacted_url};
use crate::docker::{self, CliDockerManager};
use crate::healthcheck::{EngineConfig, HealthEngine, HttpProber};
use crate::realtime::{BroadcastSink, Hub, HubConfig};
use crate::scheduler::{self, Scheduler, SchedulerConfig, SettingsResolver};
use crate::ssh::Ssh2Connector;
use nixopus_utils::config::Settings;
use nixopus_utils::logging::prelude::*;
use std::sync::Arc;
use tokio::signal;

/// Connects to the database and applies pending migrations.
fn connect(config: &Settings) -> Result<DAL, Box<dyn std::error::Error>> {
    info!(
        "Creating database connection pool for {}",
        redacted_url(&config.database.url)
    );
    let pool = create_shared_connection_pool(&config.database.url, config.database.pool_size)?;

    info!("Running pending database migrations");
    let applied = pool.run_migrations()?;
    info!("Database migrations completed ({} applied)", applied);

    Ok(DAL::new(pool))
}

fn build_scheduler(config: &Settings, dal: &DAL) -> Scheduler {
    let resolver = Arc::new(SettingsResolver::new(Arc::new(dal.clone())));
    let mut scheduler = Scheduler::new(resolver, SchedulerConfig::from_settings(&config.scheduler));
    for job in scheduler::default_jobs(Arc::new(dal.clone()), scheduler::docker::process_default())
    {
        scheduler.register(job);
    }
    scheduler
}

/// Starts the control plane and blocks until ctrl-c.
///
/// Shutdown runs in dependency order: the cron loop (waiting for an
/// in-flight sweep), then the health loop and its probes, then the
/// WebSocket hub, then the HTTP listener.
pub async fn serve(config: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting Nixopus control plane");
    let dal = connect(config)?;

    if !docker::install_default(Arc::new(CliDockerManager::new(config.docker.host.clone()))) {
        warn!("Docker manager already installed; keeping the existing one");
    }

    let hub = Hub::new(
        HubConfig::from_settings(&config.realtime),
        Arc::new(Ssh2Connector::new(config.ssh.clone())),
    );

    let engine = HealthEngine::new(
        Arc::new(dal.clone()),
        Arc::new(HttpProber::new(config.healthcheck.follow_redirects)?),
        EngineConfig::from_settings(&config.healthcheck),
    );
    let sink: Arc<dyn BroadcastSink> = hub.clone();
    engine.set_broadcaster(&sink);
    let engine_task = engine.start();

    let scheduler = Arc::new(build_scheduler(config, &dal));
    scheduler.start()?;

    let app = api::configure_api_routes(AppState {
        dal,
        hub: hub.clone(),
    });

    info!("Starting server on {}", config.server.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;

    let (http_stop_tx, http_stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                http_stop_rx.await.ok();
            })
            .await
    });

    info!("Nixopus control plane is now running");
    signal::ctrl_c().await?;
    info!("Shutdown signal received");

    scheduler.shutdown().await;
    engine.shutdown().await;
    if let Err(e) = engine_task.await {
        warn!("Health loop ended abnormally: {}", e);
    }
    hub.shutdown().await;
    http_stop_tx.send(()).ok();
    server.await??;

    nixopus_utils::telemetry::shutdown();
    info!("Nixopus control plane stopped");
    Ok(())
}

/// Runs a single maintenance sweep and prints the report as JSON.
pub async fn run_jobs(config: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let dal = connect(config)?;
    if !docker::install_default(Arc::new(CliDockerManager::new(config.docker.host.clone()))) {
        warn!("Docker manager already installed; keeping the existing one");
    }

    let scheduler = build_scheduler(config, &dal);
    let report = scheduler.run_now().await?;
    info!(
        "Sweep {} finished: {} organizations, {} failures",
        report.sweep_id,
        report.organizations,
        report.failures()
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.failures() > 0 {
        return Err(format!("{} job invocations failed", report.failures()).into());
    }
    Ok(())
}
