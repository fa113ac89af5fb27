/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Docker Manager
//!
//! Host-global Docker maintenance. [`CliDockerManager`] shells out to the
//! `docker` binary with `DOCKER_HOST` pointed at the configured daemon.
//! The process keeps one default manager, installed at startup with
//! [`install_default`] and fetched by jobs with [`default_manager`].

use async_trait::async_trait;
use nixopus_utils::logging::prelude::*;
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::sync::Arc;
use tokio::process::Command;

static DEFAULT_MANAGER: OnceCell<Arc<dyn DockerManager>> = OnceCell::new();

#[derive(Debug, thiserror::Error)]
pub enum DockerError {
    #[error("docker manager is not initialized")]
    Unavailable,
    #[error("failed to run docker: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("docker {command} exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: i32,
        stderr: String,
    },
}

/// Outcome of a prune.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PruneReport {
    /// "Total reclaimed space" as printed by the CLI, when present
    pub reclaimed: Option<String>,
    pub reclaimed_bytes: Option<u64>,
}

#[async_trait]
pub trait DockerManager: Send + Sync {
    async fn prune_dangling_images(&self) -> Result<PruneReport, DockerError>;
    async fn prune_build_cache(&self) -> Result<PruneReport, DockerError>;
}

pub struct CliDockerManager {
    binary: String,
    host: String,
}

impl CliDockerManager {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            binary: "docker".to_string(),
            host: host.into(),
        }
    }

    /// Overrides the CLI binary path.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    async fn run(&self, args: &[&str]) -> Result<String, DockerError> {
        let output = Command::new(&self.binary)
            .args(args)
            .env("DOCKER_HOST", &self.host)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(DockerError::Failed {
                command: args.join(" "),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn prune(&self, args: &[&str]) -> Result<PruneReport, DockerError> {
        let stdout = self.run(args).await?;
        let report = parse_prune_output(&stdout);
        debug!(command = %args.join(" "), reclaimed = ?report.reclaimed, "Docker prune finished");
        Ok(report)
    }
}

#[async_trait]
impl DockerManager for CliDockerManager {
    async fn prune_dangling_images(&self) -> Result<PruneReport, DockerError> {
        self.prune(&["image", "prune", "-f"]).await
    }

    async fn prune_build_cache(&self) -> Result<PruneReport, DockerError> {
        self.prune(&["builder", "prune", "-f"]).await
    }
}

/// Installs the process-wide manager. Later calls are ignored.
pub fn install_default(manager: Arc<dyn DockerManager>) -> bool {
    DEFAULT_MANAGER.set(manager).is_ok()
}

pub fn default_manager() -> Result<Arc<dyn DockerManager>, DockerError> {
    DEFAULT_MANAGER.get().cloned().ok_or(DockerError::Unavailable)
}

fn parse_prune_output(stdout: &str) -> PruneReport {
    let reclaimed = stdout.lines().find_map(|line| {
        line.trim()
            .strip_prefix("Total reclaimed space:")
            .or_else(|| line.trim().strip_prefix("Total:"))
            .map(|v| v.trim().to_string())
    });
    let reclaimed_bytes = reclaimed.as_deref().and_then(parse_size);
    PruneReport {
        reclaimed,
        reclaimed_bytes,
    }
}

/// Parses sizes such as `1.5GB`, `512kB`, `0B`.
fn parse_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let value: f64 = number.parse().ok()?;
    let multiplier: f64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1.0,
        "kb" => 1e3,
        "mb" => 1e6,
        "gb" => 1e9,
        "tb" => 1e12,
        "kib" => 1024.0,
        "mib" => 1024.0 * 1024.0,
        "gib" => 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some((value * multiplier).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prune_output() {
        let report = parse_prune_output(
            "Deleted Images:\ndeleted: sha256:abc\n\nTotal reclaimed space: 1.5GB\n",
        );
        assert_eq!(report.reclaimed.as_deref(), Some("1.5GB"));
        assert_eq!(report.reclaimed_bytes, Some(1_500_000_000));

        let builder = parse_prune_output("ID\tRECLAIMABLE\nTotal:\t512kB\n");
        assert_eq!(builder.reclaimed_bytes, Some(512_000));

        assert_eq!(parse_prune_output("").reclaimed, None);
    }

    #[test]
    fn test_parse_size_units() {
        assert_eq!(parse_size("0B"), Some(0));
        assert_eq!(parse_size("2MiB"), Some(2 * 1024 * 1024));
        assert_eq!(parse_size("lots"), None);
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let manager = CliDockerManager::new("unix:///var/run/docker.sock")
            .with_binary("/nonexistent/docker-binary");
        let err = manager.prune_dangling_images().await.unwrap_err();
        assert!(matches!(err, DockerError::Spawn(_)));
    }
}
