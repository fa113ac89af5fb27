/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # WebSocket Hub
//!
//! Owns every live connection. Each [`Connection`] serializes its outbound
//! frames through an async mutex; acquiring it is bounded by
//! `lock_timeout` and each write by `write_timeout`. A failed write is
//! counted and logged but never closes the connection; the transport's read
//! loop decides when a connection is dead and calls [`Hub::remove`].

use super::messages::{ClientAction, MessageError, SubscriptionRequest, TerminalSize};
use super::monitor::{self, MonitorConfig, MonitorHandle};
use super::terminal::{self, TerminalHandle};
use super::{BroadcastSink, Envelope, HubError, Topic, TopicKind};
use crate::metrics;
use crate::ssh::{ShellCommand, SshConnector};
use async_trait::async_trait;
use futures::future::join_all;
use nixopus_utils::config::Realtime;
use nixopus_utils::logging::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

pub const NORMAL_CLOSURE: u16 = 1000;

/// Write half of a transport connection.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), HubError>;
    async fn close(&mut self, code: u16, reason: &str) -> Result<(), HubError>;
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub lock_timeout: Duration,
    pub write_timeout: Duration,
    pub monitor_interval: Duration,
    pub terminal_flush: Duration,
    pub terminal_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(3),
            write_timeout: Duration::from_secs(5),
            monitor_interval: Duration::from_secs(10),
            terminal_flush: Duration::from_millis(10),
            terminal_buffer: 64 * 1024,
        }
    }
}

impl HubConfig {
    pub fn from_settings(realtime: &Realtime) -> Self {
        Self {
            lock_timeout: Duration::from_millis(realtime.lock_timeout_ms),
            write_timeout: Duration::from_millis(realtime.write_timeout_ms),
            monitor_interval: Duration::from_secs(realtime.monitor_interval_seconds.max(1)),
            terminal_flush: Duration::from_millis(realtime.terminal_flush_ms.max(1)),
            terminal_buffer: realtime.terminal_buffer_bytes.max(4),
        }
    }
}

pub struct Connection {
    id: Uuid,
    writer: Mutex<Box<dyn FrameSink>>,
    subscriptions: StdRwLock<HashSet<Topic>>,
    monitor: Mutex<Option<MonitorHandle>>,
    terminal: Mutex<Option<TerminalHandle>>,
    closed: AtomicBool,
    lock_timeout: Duration,
    write_timeout: Duration,
}

impl Connection {
    fn new(sink: Box<dyn FrameSink>, config: &HubConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            writer: Mutex::new(sink),
            subscriptions: StdRwLock::new(HashSet::new()),
            monitor: Mutex::new(None),
            terminal: Mutex::new(None),
            closed: AtomicBool::new(false),
            lock_timeout: config.lock_timeout,
            write_timeout: config.write_timeout,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_subscribed(&self, topic: &Topic) -> bool {
        self.subscriptions
            .read()
            .map(|subs| subs.contains(topic))
            .unwrap_or(false)
    }

    pub fn subscriptions(&self) -> Vec<Topic> {
        self.subscriptions
            .read()
            .map(|subs| subs.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn subscribe(&self, topic: Topic) {
        if let Ok(mut subs) = self.subscriptions.write() {
            subs.insert(topic);
        }
    }

    fn unsubscribe(&self, topic: &Topic) {
        if let Ok(mut subs) = self.subscriptions.write() {
            subs.remove(topic);
        }
    }

    /// Writes one envelope under the lock and write deadlines.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), HubError> {
        let result = match serde_json::to_string(envelope) {
            Ok(text) => self.write(text).await,
            Err(e) => Err(HubError::from(e)),
        };
        if let Err(e) = &result {
            metrics::record_ws_write_failure(e.reason());
            warn!(
                connection_id = %self.id,
                action = %envelope.action,
                "Failed to write frame: {}",
                e
            );
        }
        result
    }

    async fn write(&self, text: String) -> Result<(), HubError> {
        if self.is_closed() {
            return Err(HubError::Write("connection closed".into()));
        }
        let mut writer = tokio::time::timeout(self.lock_timeout, self.writer.lock())
            .await
            .map_err(|_| HubError::LockTimeout)?;
        tokio::time::timeout(self.write_timeout, writer.send_text(text))
            .await
            .map_err(|_| HubError::WriteTimeout)?
    }

    /// Sends a close frame once; later calls are no-ops.
    pub async fn close(&self, code: u16, reason: &str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Ok(mut writer) = tokio::time::timeout(self.lock_timeout, self.writer.lock()).await
        else {
            debug!(connection_id = %self.id, "Skipping close frame: write lock busy");
            return;
        };
        match tokio::time::timeout(self.write_timeout, writer.close(code, reason)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(connection_id = %self.id, "Close frame failed: {}", e),
            Err(_) => debug!(connection_id = %self.id, "Close frame timed out"),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn has_monitor(&self) -> bool {
        self.monitor
            .lock()
            .await
            .as_ref()
            .is_some_and(MonitorHandle::is_running)
    }

    pub async fn has_terminal(&self) -> bool {
        self.terminal
            .lock()
            .await
            .as_ref()
            .is_some_and(TerminalHandle::is_running)
    }

    async fn stop_monitor(&self) {
        let handle = self.monitor.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    async fn stop_terminal(&self) {
        let handle = self.terminal.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    async fn stop_sessions(&self) {
        self.stop_monitor().await;
        self.stop_terminal().await;
    }
}

/// Registry of live connections plus the SSH capability their sessions use.
pub struct Hub {
    connections: RwLock<HashMap<Uuid, Arc<Connection>>>,
    config: HubConfig,
    ssh: Arc<dyn SshConnector>,
}

impl Hub {
    pub fn new(config: HubConfig, ssh: Arc<dyn SshConnector>) -> Arc<Self> {
        Arc::new(Self {
            connections: RwLock::new(HashMap::new()),
            config,
            ssh,
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub async fn register(&self, sink: Box<dyn FrameSink>) -> Arc<Connection> {
        let connection = Arc::new(Connection::new(sink, &self.config));
        self.connections
            .write()
            .await
            .insert(connection.id, connection.clone());
        metrics::WS_CONNECTIONS.inc();
        debug!(connection_id = %connection.id, "WebSocket connection registered");
        connection
    }

    /// Drops a connection and stops its sessions.
    pub async fn remove(&self, id: Uuid) {
        let removed = self.connections.write().await.remove(&id);
        if let Some(connection) = removed {
            metrics::WS_CONNECTIONS.dec();
            connection.stop_sessions().await;
            debug!(connection_id = %id, "WebSocket connection removed");
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Connection>> {
        self.connections.read().await.get(&id).cloned()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    async fn require(&self, id: Uuid) -> Result<Arc<Connection>, HubError> {
        self.get(id).await.ok_or(HubError::ConnectionNotFound(id))
    }

    pub async fn subscribe(&self, id: Uuid, topic: Topic) -> Result<(), HubError> {
        self.require(id).await?.subscribe(topic);
        Ok(())
    }

    pub async fn unsubscribe(&self, id: Uuid, topic: &Topic) -> Result<(), HubError> {
        self.require(id).await?.unsubscribe(topic);
        Ok(())
    }

    /// Writes to every subscriber concurrently and returns how many writes
    /// succeeded. Returns once every write has finished or timed out.
    pub async fn broadcast_to_topic(
        &self,
        kind: TopicKind,
        resource_id: &str,
        action: &str,
        payload: serde_json::Value,
    ) -> usize {
        let topic = Topic::new(kind, resource_id);
        let subscribers: Vec<Arc<Connection>> = self
            .connections
            .read()
            .await
            .values()
            .filter(|c| c.is_subscribed(&topic))
            .cloned()
            .collect();

        if subscribers.is_empty() {
            return 0;
        }

        let envelope = Envelope::new(action, payload, Some(kind));
        let results = join_all(subscribers.iter().map(|c| c.send(&envelope))).await;
        let delivered = results.iter().filter(|r| r.is_ok()).count();
        trace!(
            topic = %kind,
            resource_id = %resource_id,
            subscribers = subscribers.len(),
            delivered,
            "Broadcast complete"
        );
        delivered
    }

    pub async fn send_to_connection(&self, id: Uuid, envelope: &Envelope) -> Result<(), HubError> {
        self.require(id).await?.send(envelope).await
    }

    /// Handles one inbound text frame from `id`.
    pub async fn handle_message(&self, id: Uuid, text: &str) {
        let Some(connection) = self.get(id).await else {
            return;
        };

        let action = match ClientAction::parse(text) {
            Ok(action) => action,
            Err(e) => {
                if let MessageError::UnknownAction(name) = &e {
                    debug!(connection_id = %id, action = %name, "Unknown message action");
                }
                let _ = connection.send(&Envelope::error(e.to_string().into())).await;
                return;
            }
        };

        let name = action.name();
        if let Err(message) = self.dispatch(&connection, action).await {
            let _ = connection
                .send(&Envelope::operation_error(name, message))
                .await;
        }
    }

    async fn dispatch(&self, connection: &Arc<Connection>, action: ClientAction) -> Result<(), String> {
        match action {
            ClientAction::Ping => Ok(()),
            ClientAction::Subscribe(request) => {
                connection.subscribe(parse_topic(&request)?);
                Ok(())
            }
            ClientAction::Unsubscribe(request) => {
                connection.unsubscribe(&parse_topic(&request)?);
                Ok(())
            }
            ClientAction::MonitorApplication(request) => {
                let mut slot = connection.monitor.lock().await;
                if let Some(handle) = slot.as_ref().filter(|h| h.is_running()) {
                    handle.reconfigure(&request);
                    return Ok(());
                }
                let mut config = MonitorConfig::new(self.config.monitor_interval);
                config.apply(&request);
                *slot = monitor::start(connection.clone(), self.ssh.as_ref(), config).await;
                Ok(())
            }
            ClientAction::MonitorApplicationConfig(request) => {
                let slot = connection.monitor.lock().await;
                match slot.as_ref().filter(|h| h.is_running()) {
                    Some(handle) => {
                        handle.reconfigure(&request);
                        Ok(())
                    }
                    None => Err("no active monitor session".to_string()),
                }
            }
            ClientAction::StopMonitorApplication => {
                connection.stop_monitor().await;
                connection.close(NORMAL_CLOSURE, "monitor stopped").await;
                Ok(())
            }
            ClientAction::Terminal(request) => {
                let mut slot = connection.terminal.lock().await;
                if slot.as_ref().is_some_and(TerminalHandle::is_running) {
                    return Err("terminal session already active".to_string());
                }
                let terminal_id = request
                    .terminal_id
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                let handle = terminal::start(
                    connection.clone(),
                    self.ssh.as_ref(),
                    terminal_id,
                    self.config.terminal_flush,
                    self.config.terminal_buffer,
                )
                .await
                .map_err(|e| e.to_string())?;
                *slot = Some(handle);
                Ok(())
            }
            ClientAction::TerminalInput(input) => {
                self.terminal_command(connection, ShellCommand::Input(input.into_bytes()))
                    .await
            }
            ClientAction::TerminalResize(TerminalSize { rows, cols }) => {
                self.terminal_command(connection, ShellCommand::Resize { rows, cols })
                    .await
            }
            ClientAction::TerminalExit => {
                connection.stop_terminal().await;
                connection.close(NORMAL_CLOSURE, "terminal closed").await;
                Ok(())
            }
        }
    }

    async fn terminal_command(
        &self,
        connection: &Connection,
        command: ShellCommand,
    ) -> Result<(), String> {
        let commands = connection
            .terminal
            .lock()
            .await
            .as_ref()
            .filter(|h| h.is_running())
            .map(TerminalHandle::commands);
        match commands {
            Some(commands) => commands
                .send(command)
                .await
                .map_err(|_| "terminal session closed".to_string()),
            None => Err("no active terminal session".to_string()),
        }
    }

    /// Closes every connection with a normal-closure frame and clears the
    /// registry.
    pub async fn shutdown(&self) {
        let connections: Vec<Arc<Connection>> =
            self.connections.write().await.drain().map(|(_, c)| c).collect();
        metrics::WS_CONNECTIONS.sub(connections.len() as i64);

        join_all(connections.iter().map(|c| async move {
            c.stop_sessions().await;
            c.close(NORMAL_CLOSURE, "server shutting down").await;
        }))
        .await;
        info!("WebSocket hub closed {} connections", connections.len());
    }
}

fn parse_topic(request: &SubscriptionRequest) -> Result<Topic, String> {
    let kind: TopicKind = request.topic.parse().map_err(|e: HubError| e.to_string())?;
    Ok(Topic::new(kind, request.resource_id.clone()))
}

#[async_trait]
impl BroadcastSink for Hub {
    async fn publish(&self, topic: Topic, action: &str, payload: serde_json::Value) {
        self.broadcast_to_topic(topic.kind, &topic.resource_id, action, payload)
            .await;
    }
}
