// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # taskweave CLI
//!
//! Runs task specifications through the orchestrator in-process.
//!
//! ## Commands
//!
//! - `taskweave validate <FILE>` - Parse a task specification and check its graph
//! - `taskweave plan <FILE>` - Print the execution batches
//! - `taskweave run <FILE> [--topology ...]` - Execute with the built-in workers
//! - `taskweave risk <FILE>` - Score a risk input document set
//! - `taskweave config show|validate` - Configuration management

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use taskweave_cli::commands::{self, ConfigCommand};
use taskweave_cli::logging::{init_logging, LogFormat};
use taskweave_core::domain::topology::TopologyKind;

/// taskweave - multi-agent task orchestration
#[derive(Parser)]
#[command(name = "taskweave")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "TASKWEAVE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "TASKWEAVE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a task specification
    Validate {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Override the topology declared in the file
        #[arg(long)]
        topology: Option<TopologyKind>,
    },

    /// Show the execution batches of a task specification
    Plan {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long)]
        topology: Option<TopologyKind>,
    },

    /// Execute a task specification with the built-in workers
    Run {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long)]
        topology: Option<TopologyKind>,

        /// Print orchestration events to stderr after the run
        #[arg(long)]
        events: bool,
    },

    /// Score a risk input (JSON or YAML document set)
    Risk {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Print the assessment as JSON only
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_format)?;

    match cli.command {
        Some(Commands::Validate { file, topology }) => commands::validate::execute(file, topology),
        Some(Commands::Plan { file, topology }) => commands::plan::execute(file, topology),
        Some(Commands::Run {
            file,
            topology,
            events,
        }) => commands::run::execute(file, topology, events, cli.config).await,
        Some(Commands::Risk { file, json }) => commands::risk::execute(file, json, cli.config),
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config),
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}
