/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Realtime Module
//!
//! WebSocket fan-out for health results, container telemetry, and terminal
//! I/O.
//!
//! - [`hub`]: the connection registry and the write discipline every
//!   outbound frame goes through.
//! - [`messages`]: inbound actions and their payloads.
//! - [`monitor`]: per-connection container/system statistics ticker.
//! - [`terminal`]: per-connection interactive shell over SSH.
//!
//! Publishers outside this module only see [`BroadcastSink`].

pub mod hub;
pub mod messages;
pub mod monitor;
pub mod terminal;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

pub use hub::{Connection, FrameSink, Hub, HubConfig};

/// Topic families a connection can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TopicKind {
    MonitorHealthCheck,
    MonitorApplication,
    Terminal,
}

impl TopicKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicKind::MonitorHealthCheck => "monitor_health_check",
            TopicKind::MonitorApplication => "monitor_application",
            TopicKind::Terminal => "terminal",
        }
    }
}

impl FromStr for TopicKind {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monitor_health_check" => Ok(TopicKind::MonitorHealthCheck),
            "monitor_application" => Ok(TopicKind::MonitorApplication),
            "terminal" => Ok(TopicKind::Terminal),
            other => Err(HubError::UnknownTopic(other.to_string())),
        }
    }
}

impl fmt::Display for TopicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A subscription key: topic family plus resource id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    pub kind: TopicKind,
    pub resource_id: String,
}

impl Topic {
    pub fn new(kind: TopicKind, resource_id: impl Into<String>) -> Self {
        Self {
            kind,
            resource_id: resource_id.into(),
        }
    }
}

/// Outbound frame body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Envelope {
    pub action: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl Envelope {
    pub fn new(action: impl Into<String>, data: serde_json::Value, topic: Option<TopicKind>) -> Self {
        Self {
            action: action.into(),
            data,
            timestamp: Utc::now(),
            topic: topic.map(|t| t.as_str().to_string()),
        }
    }

    /// `{action: "error", data: <message>}`
    pub fn error(data: serde_json::Value) -> Self {
        Self::new("error", data, None)
    }

    /// Error scoped to an operation: `{action: "error", data: {action, error}}`.
    pub fn operation_error(operation: &str, error: impl fmt::Display) -> Self {
        Self::error(serde_json::json!({
            "action": operation,
            "error": error.to_string(),
        }))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("connection {0} not found")]
    ConnectionNotFound(uuid::Uuid),
    #[error("timed out acquiring write lock")]
    LockTimeout,
    #[error("write deadline exceeded")]
    WriteTimeout,
    #[error("write failed: {0}")]
    Write(String),
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

impl HubError {
    /// Label used for the write-failure metric.
    pub fn reason(&self) -> &'static str {
        match self {
            HubError::ConnectionNotFound(_) => "not_found",
            HubError::LockTimeout => "lock_timeout",
            HubError::WriteTimeout => "write_timeout",
            HubError::Write(_) => "write_error",
            HubError::UnknownTopic(_) => "unknown_topic",
            HubError::Encode(_) => "encode",
        }
    }
}

/// Capability handed to publishers that must not own the hub.
#[async_trait]
pub trait BroadcastSink: Send + Sync {
    async fn publish(&self, topic: Topic, action: &str, payload: serde_json::Value);
}
