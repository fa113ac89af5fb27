/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
/// Nixopus control plane
///
/// Runs the maintenance scheduler, the health loop, and the realtime hub
/// behind one HTTP listener.
pub struct Cli {
    /// Optional configuration file layered over the built-in defaults
    #[arg(long, short, global = true, env = "NIXOPUS_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the control plane (the default)
    Serve,

    /// Run one maintenance sweep now and print its report
    RunJobs,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}
