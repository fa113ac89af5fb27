/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Terminal Session
//!
//! Bridges an interactive SSH shell to one WebSocket connection. Shell
//! output is coalesced in an [`OutputBuffer`] and flushed on a short ticker,
//! or immediately once the buffer reaches its bound. While a flush is being
//! written the session stops draining the shell, so a slow client pushes
//! back on the SSH pump through its bounded channel.

use super::hub::{Connection, NORMAL_CLOSURE};
use super::{Envelope, TopicKind};
use crate::ssh::{ShellCommand, ShellStreams, SshConnector, SshError, DEFAULT_COLS, DEFAULT_ROWS};
use nixopus_utils::logging::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub const OUTPUT_TYPE_STDOUT: &str = "stdout";

/// Length of the longest prefix of `bytes` that does not end inside a UTF-8
/// sequence.
fn incomplete_tail_start(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for i in (len.saturating_sub(3)..len).rev() {
        let byte = bytes[i];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if len - i < width { i } else { len };
    }
    len
}

/// Bounded byte buffer that only ever drains whole characters.
#[derive(Debug)]
pub struct OutputBuffer {
    bytes: Vec<u8>,
    capacity: usize,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a chunk; returns true when the buffer is at its bound.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        self.bytes.extend_from_slice(chunk);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.bytes.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Takes everything up to the last complete character.
    pub fn drain(&mut self) -> Option<String> {
        let cut = incomplete_tail_start(&self.bytes);
        if cut == 0 {
            return None;
        }
        let rest = self.bytes.split_off(cut);
        let chunk = std::mem::replace(&mut self.bytes, rest);
        Some(String::from_utf8_lossy(&chunk).into_owned())
    }

    /// Takes everything, replacing a dangling partial character.
    pub fn drain_all(&mut self) -> Option<String> {
        if self.bytes.is_empty() {
            return None;
        }
        let chunk = std::mem::take(&mut self.bytes);
        Some(String::from_utf8_lossy(&chunk).into_owned())
    }
}

pub struct TerminalHandle {
    terminal_id: String,
    commands: mpsc::Sender<ShellCommand>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TerminalHandle {
    pub fn terminal_id(&self) -> &str {
        &self.terminal_id
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn commands(&self) -> mpsc::Sender<ShellCommand> {
        self.commands.clone()
    }

    /// Stops the session and waits for the SSH connection to close.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(terminal_id = %self.terminal_id, "Terminal task ended abnormally: {}", e);
        }
    }
}

/// Opens a shell on the host and starts streaming its output.
pub async fn start(
    connection: Arc<Connection>,
    ssh: &dyn SshConnector,
    terminal_id: String,
    flush_every: Duration,
    buffer_bytes: usize,
) -> Result<TerminalHandle, SshError> {
    let host = ssh.connect().await?;
    let shell = match host.open_shell(DEFAULT_ROWS, DEFAULT_COLS).await {
        Ok(shell) => shell,
        Err(e) => {
            host.close().await;
            return Err(e);
        }
    };

    let commands = shell.commands.clone();
    let cancel = CancellationToken::new();
    let mut session = Session {
        connection,
        terminal_id: terminal_id.clone(),
        buffer: OutputBuffer::new(buffer_bytes),
    };
    let task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let exited = session.pump(shell, flush_every, cancel).await;
            host.close().await;
            if exited {
                session
                    .connection
                    .close(NORMAL_CLOSURE, "terminal exited")
                    .await;
            }
            debug!(terminal_id = %session.terminal_id, exited, "Terminal session closed");
        })
    };

    info!(terminal_id = %terminal_id, "Terminal session started");
    Ok(TerminalHandle {
        terminal_id,
        commands,
        cancel,
        task,
    })
}

struct Session {
    connection: Arc<Connection>,
    terminal_id: String,
    buffer: OutputBuffer,
}

impl Session {
    /// Runs until cancelled or the shell exits. Returns true on shell exit.
    async fn pump(
        &mut self,
        shell: ShellStreams,
        flush_every: Duration,
        cancel: CancellationToken,
    ) -> bool {
        let ShellStreams {
            commands,
            mut output,
        } = shell;
        let mut ticker = tokio::time::interval(flush_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let exited = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break false,
                chunk = output.recv() => match chunk {
                    Some(bytes) => {
                        if self.buffer.push(&bytes) {
                            self.flush().await;
                        }
                    }
                    None => break true,
                },
                _ = ticker.tick() => self.flush().await,
            }
        };

        if let Some(content) = self.buffer.drain_all() {
            self.write(content).await;
        }
        let _ = commands.try_send(ShellCommand::Close);
        exited
    }

    async fn flush(&mut self) {
        if let Some(content) = self.buffer.drain() {
            self.write(content).await;
        }
    }

    async fn write(&self, content: String) {
        let envelope = Envelope::new(
            "terminal",
            serde_json::json!({
                "output_type": OUTPUT_TYPE_STDOUT,
                "content": content,
                "terminal_id": self.terminal_id,
            }),
            Some(TopicKind::Terminal),
        );
        let _ = self.connection.send(&envelope).await;
    }
}
