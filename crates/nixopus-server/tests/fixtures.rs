/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Database fixture for the integration tests.
//!
//! Every fixture owns a single pooled connection inside a test transaction,
//! so nothing a test writes outlives it. Tests skip when `DATABASE_URL` is
//! not set.

#![allow(dead_code)]

use axum::Router;
use chrono::{DateTime, Utc};
use diesel::r2d2::TestCustomizer;
use dotenv::dotenv;
use nixopus_models::models::{
    Application, HealthCheck, NewApplication, NewHealthCheck, NewOrganization, Organization,
};
use nixopus_server::api::{self, AppState};
use nixopus_server::dal::DAL;
use nixopus_server::db::{build_pool, create_shared_connection_pool};
use nixopus_server::healthcheck::ProbeOutcome;
use nixopus_server::realtime::{Hub, HubConfig};
use nixopus_server::ssh::Ssh2Connector;
use nixopus_utils::config::Ssh;
use std::env;
use std::sync::{Arc, Once};
use uuid::Uuid;

static MIGRATE: Once = Once::new();

/// Applies migrations once per test binary, outside any test transaction.
pub fn migrate_once(database_url: &str) {
    MIGRATE.call_once(|| {
        create_shared_connection_pool(database_url, 1)
            .expect("Failed to create migration pool")
            .run_migrations()
            .expect("Failed to run migrations");
    });
}

#[derive(Clone)]
pub struct TestFixture {
    pub dal: DAL,
}

impl TestFixture {
    /// Connects, or returns `None` when no database is configured.
    pub fn try_new() -> Option<Self> {
        dotenv().ok();
        let Ok(database_url) = env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set; skipping database test");
            return None;
        };

        migrate_once(&database_url);

        let pool = build_pool(&database_url, 1, Some(Box::new(TestCustomizer)))
            .expect("Failed to create connection pool");

        Some(TestFixture {
            dal: DAL::new(pool),
        })
    }

    /// The full router with a hub whose SSH target is never contacted.
    pub fn create_test_router(&self) -> Router {
        let ssh = Ssh {
            host: "127.0.0.1".into(),
            port: 22,
            user: "test".into(),
            password: None,
            private_key_path: None,
            passphrase: None,
            connect_timeout_seconds: 1,
        };
        let hub = Hub::new(HubConfig::default(), Arc::new(Ssh2Connector::new(ssh)));
        api::configure_api_routes(AppState {
            dal: self.dal.clone(),
            hub,
        })
    }

    pub fn insert_test_organization(&self) -> Organization {
        let new_org = NewOrganization::new(format!("Test Org {}", Uuid::new_v4()))
            .expect("Failed to create NewOrganization");
        self.dal
            .organizations()
            .create(&new_org)
            .expect("Failed to create organization")
    }

    pub fn insert_test_application(&self, organization_id: Uuid, domain: Option<&str>) -> Application {
        let new_app = NewApplication::new(
            organization_id,
            format!("Test App {}", Uuid::new_v4()),
            domain.map(str::to_string),
        )
        .expect("Failed to create NewApplication");
        self.dal
            .applications()
            .create(&new_app)
            .expect("Failed to create application")
    }

    pub fn insert_test_health_check(&self, application: &Application) -> HealthCheck {
        let new_check = NewHealthCheck::with_defaults(application.id, application.organization_id);
        self.dal
            .health_checks()
            .create(&new_check)
            .expect("Failed to create health check")
    }

    /// Records one probe outcome at `at`.
    pub fn record(&self, check: &HealthCheck, outcome: ProbeOutcome, at: DateTime<Utc>) {
        self.dal
            .health_checks()
            .record_probe(check.id, &outcome, at)
            .expect("Failed to record probe");
    }
}
