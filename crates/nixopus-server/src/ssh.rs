/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! SSH access to the managed host.
//!
//! Container monitoring runs commands over [`RemoteHost::exec`]; terminals
//! attach to [`RemoteHost::open_shell`]. The `ssh2` implementation drives
//! libssh2 on blocking threads and exposes the shell as a pair of channels.

use async_trait::async_trait;
use nixopus_utils::config::Ssh;
use nixopus_utils::logging::prelude::*;
use ssh2::Session;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const TERM: &str = "xterm-256color";
pub const DEFAULT_ROWS: u16 = 24;
pub const DEFAULT_COLS: u16 = 80;

/// Bound on queued output chunks between the pump and the session.
const OUTPUT_CHANNEL_CAPACITY: usize = 64;
const COMMAND_CHANNEL_CAPACITY: usize = 64;
const PUMP_IDLE: Duration = Duration::from_millis(5);
const READ_CHUNK: usize = 8192;

#[derive(Debug, thiserror::Error)]
pub enum SshError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("channel error: {0}")]
    Channel(String),
    #[error("command failed: {0}")]
    Command(String),
    #[error("blocking task failed: {0}")]
    Join(String),
}

impl From<ssh2::Error> for SshError {
    fn from(e: ssh2::Error) -> Self {
        SshError::Channel(e.to_string())
    }
}

/// Input accepted by a running shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Input(Vec<u8>),
    Resize { rows: u16, cols: u16 },
    Close,
}

/// A running shell. `output` closes when the shell exits.
pub struct ShellStreams {
    pub commands: mpsc::Sender<ShellCommand>,
    pub output: mpsc::Receiver<Vec<u8>>,
}

#[async_trait]
pub trait RemoteHost: Send + Sync {
    /// Runs a command and returns its stdout.
    async fn exec(&self, command: &str) -> Result<String, SshError>;

    /// Starts an interactive shell on a PTY of the given size.
    async fn open_shell(&self, rows: u16, cols: u16) -> Result<ShellStreams, SshError>;

    async fn close(&self);
}

#[async_trait]
pub trait SshConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn RemoteHost>, SshError>;
}

/// Connects with the configured credentials.
pub struct Ssh2Connector {
    config: Ssh,
}

impl Ssh2Connector {
    pub fn new(config: Ssh) -> Self {
        Self { config }
    }
}

fn open_session(config: &Ssh) -> Result<Session, SshError> {
    let addr = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|e| SshError::Connect(e.to_string()))?
        .next()
        .ok_or_else(|| SshError::Connect(format!("could not resolve {}", config.host)))?;
    let timeout = Duration::from_secs(config.connect_timeout_seconds.max(1));
    let tcp = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|e| SshError::Connect(e.to_string()))?;

    let mut session = Session::new().map_err(|e| SshError::Connect(e.to_string()))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    session
        .handshake()
        .map_err(|e| SshError::Connect(e.to_string()))?;

    if let Some(key) = &config.private_key_path {
        session
            .userauth_pubkey_file(&config.user, None, Path::new(key), config.passphrase.as_deref())
            .map_err(|e| SshError::Auth(e.to_string()))?;
    } else if let Some(password) = &config.password {
        session
            .userauth_password(&config.user, password)
            .map_err(|e| SshError::Auth(e.to_string()))?;
    } else {
        session
            .userauth_agent(&config.user)
            .map_err(|e| SshError::Auth(e.to_string()))?;
    }

    if !session.authenticated() {
        return Err(SshError::Auth("server rejected credentials".into()));
    }
    // Interactive channels rely on non-blocking reads; blocking calls use
    // their own deadline.
    session.set_timeout(0);
    Ok(session)
}

#[async_trait]
impl SshConnector for Ssh2Connector {
    async fn connect(&self) -> Result<Arc<dyn RemoteHost>, SshError> {
        let config = self.config.clone();
        let session = tokio::task::spawn_blocking(move || open_session(&config))
            .await
            .map_err(|e| SshError::Join(e.to_string()))??;
        debug!("SSH session established to {}:{}", self.config.host, self.config.port);
        Ok(Arc::new(Ssh2Host { session }))
    }
}

pub struct Ssh2Host {
    session: Session,
}

fn exec_blocking(session: &Session, command: &str) -> Result<String, SshError> {
    let mut channel = session.channel_session()?;
    channel.exec(command)?;

    let mut stdout = String::new();
    channel
        .read_to_string(&mut stdout)
        .map_err(|e| SshError::Channel(e.to_string()))?;
    let mut stderr = String::new();
    let _ = channel.stderr().read_to_string(&mut stderr);
    channel.wait_close()?;

    let status = channel.exit_status()?;
    if status != 0 {
        let detail = if stderr.trim().is_empty() {
            format!("exit status {}", status)
        } else {
            stderr.trim().to_string()
        };
        return Err(SshError::Command(detail));
    }
    Ok(stdout)
}

/// Moves bytes between a PTY channel and the async side until the shell
/// exits or a `Close` arrives.
fn pump_shell(
    session: Session,
    mut channel: ssh2::Channel,
    mut commands: mpsc::Receiver<ShellCommand>,
    output: mpsc::Sender<Vec<u8>>,
) {
    session.set_blocking(false);
    let mut buf = vec![0u8; READ_CHUNK];

    'pump: loop {
        let mut busy = false;

        loop {
            match commands.try_recv() {
                Ok(ShellCommand::Input(bytes)) => {
                    session.set_blocking(true);
                    let written = channel.write_all(&bytes).and_then(|_| channel.flush());
                    session.set_blocking(false);
                    if let Err(e) = written {
                        warn!("Failed to write to shell: {}", e);
                        break 'pump;
                    }
                    busy = true;
                }
                Ok(ShellCommand::Resize { rows, cols }) => {
                    session.set_blocking(true);
                    let resized =
                        channel.request_pty_size(u32::from(cols), u32::from(rows), None, None);
                    session.set_blocking(false);
                    if let Err(e) = resized {
                        warn!("Failed to resize PTY: {}", e);
                    }
                }
                Ok(ShellCommand::Close) => break 'pump,
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => break 'pump,
            }
        }

        for stream_id in [0, 1] {
            let mut stream = channel.stream(stream_id);
            match stream.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    busy = true;
                    if output.blocking_send(buf[..n].to_vec()).is_err() {
                        break 'pump;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => {
                    debug!("Shell read ended: {}", e);
                    break 'pump;
                }
            }
        }

        if channel.eof() {
            break;
        }
        if !busy {
            std::thread::sleep(PUMP_IDLE);
        }
    }

    session.set_blocking(true);
    let _ = channel.close();
    let _ = channel.wait_close();
}

#[async_trait]
impl RemoteHost for Ssh2Host {
    async fn exec(&self, command: &str) -> Result<String, SshError> {
        let session = self.session.clone();
        let command = command.to_string();
        tokio::task::spawn_blocking(move || exec_blocking(&session, &command))
            .await
            .map_err(|e| SshError::Join(e.to_string()))?
    }

    async fn open_shell(&self, rows: u16, cols: u16) -> Result<ShellStreams, SshError> {
        let session = self.session.clone();
        let channel = tokio::task::spawn_blocking(move || -> Result<ssh2::Channel, SshError> {
            let mut channel = session.channel_session()?;
            channel.request_pty(
                TERM,
                None,
                Some((u32::from(cols), u32::from(rows), 0, 0)),
            )?;
            channel.shell()?;
            Ok(channel)
        })
        .await
        .map_err(|e| SshError::Join(e.to_string()))??;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (output_tx, output_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let session = self.session.clone();
        std::thread::Builder::new()
            .name("ssh-shell-pump".into())
            .spawn(move || pump_shell(session, channel, command_rx, output_tx))
            .map_err(|e| SshError::Channel(e.to_string()))?;

        Ok(ShellStreams {
            commands: command_tx,
            output: output_rx,
        })
    }

    async fn close(&self) {
        let session = self.session.clone();
        let _ = tokio::task::spawn_blocking(move || {
            let _ = session.disconnect(None, "closing", None);
        })
        .await;
    }
}
