/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Inbound WebSocket messages.
//!
//! Clients send `{action, data}` text frames. [`ClientAction::parse`] turns a
//! frame into a typed action or one of the two fixed protocol errors.

use super::monitor::MonitorOperation;
use serde::Deserialize;
use serde_json::Value;

pub const MSG_UNKNOWN_ACTION: &str = "Unknown message action";
pub const MSG_INVALID_FORMAT: &str = "Invalid message format";

#[derive(Debug, Deserialize)]
struct InboundMessage {
    action: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubscriptionRequest {
    pub topic: String,
    pub resource_id: String,
}

/// Optional knobs for a container monitor session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MonitorRequest {
    #[serde(default)]
    pub interval_seconds: Option<u64>,
    #[serde(default)]
    pub operations: Option<Vec<MonitorOperation>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TerminalRequest {
    #[serde(default)]
    pub terminal_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TerminalSize {
    pub rows: u16,
    pub cols: u16,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResizePayload {
    Nested { size: TerminalSize },
    Flat(TerminalSize),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InputPayload {
    Raw(String),
    Wrapped { data: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    Ping,
    Subscribe(SubscriptionRequest),
    Unsubscribe(SubscriptionRequest),
    MonitorApplication(MonitorRequest),
    MonitorApplicationConfig(MonitorRequest),
    StopMonitorApplication,
    Terminal(TerminalRequest),
    TerminalInput(String),
    TerminalResize(TerminalSize),
    TerminalExit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("{}", MSG_INVALID_FORMAT)]
    InvalidFormat,
    #[error("{}", MSG_UNKNOWN_ACTION)]
    UnknownAction(String),
}

/// Absent or `null` data decodes as the payload's default.
fn payload<T>(data: Value) -> Result<T, MessageError>
where
    T: for<'de> Deserialize<'de> + Default,
{
    if data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(data).map_err(|_| MessageError::InvalidFormat)
}

fn required<T>(data: Value) -> Result<T, MessageError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(data).map_err(|_| MessageError::InvalidFormat)
}

impl ClientAction {
    pub fn parse(text: &str) -> Result<Self, MessageError> {
        let message: InboundMessage =
            serde_json::from_str(text).map_err(|_| MessageError::InvalidFormat)?;
        let data = message.data;

        match message.action.as_str() {
            "ping" => Ok(ClientAction::Ping),
            "subscribe" => required(data).map(ClientAction::Subscribe),
            "unsubscribe" => required(data).map(ClientAction::Unsubscribe),
            "monitor_application" => payload(data).map(ClientAction::MonitorApplication),
            "monitor_application_config" => {
                payload(data).map(ClientAction::MonitorApplicationConfig)
            }
            "stop_monitor_application" => Ok(ClientAction::StopMonitorApplication),
            "terminal" => payload(data).map(ClientAction::Terminal),
            "terminal_input" => match required::<InputPayload>(data)? {
                InputPayload::Raw(input) | InputPayload::Wrapped { data: input } => {
                    Ok(ClientAction::TerminalInput(input))
                }
            },
            "terminal_resize" => match required::<ResizePayload>(data)? {
                ResizePayload::Nested { size } | ResizePayload::Flat(size) => {
                    Ok(ClientAction::TerminalResize(size))
                }
            },
            "terminal_exit" => Ok(ClientAction::TerminalExit),
            other => Err(MessageError::UnknownAction(other.to_string())),
        }
    }

    /// Wire name, used to scope per-operation errors.
    pub fn name(&self) -> &'static str {
        match self {
            ClientAction::Ping => "ping",
            ClientAction::Subscribe(_) => "subscribe",
            ClientAction::Unsubscribe(_) => "unsubscribe",
            ClientAction::MonitorApplication(_) => "monitor_application",
            ClientAction::MonitorApplicationConfig(_) => "monitor_application_config",
            ClientAction::StopMonitorApplication => "stop_monitor_application",
            ClientAction::Terminal(_) => "terminal",
            ClientAction::TerminalInput(_) => "terminal_input",
            ClientAction::TerminalResize(_) => "terminal_resize",
            ClientAction::TerminalExit => "terminal_exit",
        }
    }
}
