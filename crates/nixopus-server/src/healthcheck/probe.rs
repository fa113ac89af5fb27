/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Single-shot HTTP probes.
//!
//! A probe never fails: transport problems are folded into an `error`
//! outcome with `status_code = 0`. Error messages are stripped of the target
//! URL before they are persisted or broadcast.

use async_trait::async_trait;
use nixopus_models::models::{HealthCheck, HealthStatus, ProbeMethod};
use std::error::Error as _;
use std::time::{Duration, Instant};

pub const USER_AGENT: &str = "Nixopus-HealthCheck/1.0";

/// Maximum number of redirects followed when redirects are enabled.
const MAX_REDIRECTS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Classification and measurements of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status: HealthStatus,
    /// Zero when no HTTP response was received.
    pub status_code: i32,
    pub response_time_ms: Option<i32>,
    /// Empty for healthy outcomes.
    pub error_message: String,
}

impl ProbeOutcome {
    pub fn error(message: impl Into<String>, elapsed: Option<Duration>) -> Self {
        Self {
            status: HealthStatus::Error,
            status_code: 0,
            response_time_ms: elapsed.map(millis),
            error_message: message.into(),
        }
    }
}

fn millis(elapsed: Duration) -> i32 {
    i32::try_from(elapsed.as_millis()).unwrap_or(i32::MAX)
}

/// Issues probes for health checks.
#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    async fn probe(&self, check: &HealthCheck, base_url: &str) -> ProbeOutcome;
}

/// Joins relative endpoints onto the application base URL.
pub fn target_url(endpoint: &str, base_url: &str) -> String {
    if endpoint.starts_with('/') {
        format!("{}{}", base_url.trim_end_matches('/'), endpoint)
    } else {
        endpoint.to_string()
    }
}

/// reqwest-backed probe executor.
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new(follow_redirects: bool) -> Result<Self, ProbeError> {
        let redirect = if follow_redirects {
            reqwest::redirect::Policy::limited(MAX_REDIRECTS)
        } else {
            reqwest::redirect::Policy::none()
        };
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect)
            .build()?;
        Ok(Self { client })
    }
}

/// Describes a transport error without the request URL.
fn describe(err: reqwest::Error, timeout: Duration) -> String {
    if err.is_timeout() {
        return format!("request timeout after {}s", timeout.as_secs());
    }
    let err = err.without_url();
    let mut message = format!("request failed: {}", err);
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[async_trait]
impl ProbeExecutor for HttpProber {
    async fn probe(&self, check: &HealthCheck, base_url: &str) -> ProbeOutcome {
        let url = target_url(&check.endpoint, base_url);
        let timeout = Duration::from_secs(u64::try_from(check.timeout_seconds.max(1)).unwrap_or(1));
        let method = check.probe_method();

        let mut request = match method {
            ProbeMethod::Get => self.client.get(&url),
            ProbeMethod::Post => self.client.post(&url),
            ProbeMethod::Head => self.client.head(&url),
        }
        .timeout(timeout);

        for (name, value) in check.header_map() {
            request = request.header(name, value);
        }
        if method == ProbeMethod::Post {
            if let Some(body) = &check.body {
                request = request.body(body.clone());
            }
        }

        let started = Instant::now();
        let response = request.send().await;
        let elapsed = started.elapsed();

        match response {
            Err(err) => ProbeOutcome::error(describe(err, timeout), Some(elapsed)),
            Ok(response) => {
                let code = i32::from(response.status().as_u16());
                if check.expects(code) {
                    ProbeOutcome {
                        status: HealthStatus::Healthy,
                        status_code: code,
                        response_time_ms: Some(millis(elapsed)),
                        error_message: String::new(),
                    }
                } else {
                    ProbeOutcome {
                        status: HealthStatus::Unhealthy,
                        status_code: code,
                        response_time_ms: Some(millis(elapsed)),
                        error_message: format!(
                            "unexpected status code {} (expected one of {:?})",
                            code, check.expected_status_codes
                        ),
                    }
                }
            }
        }
    }
}
