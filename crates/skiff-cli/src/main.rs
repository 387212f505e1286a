//! `skiff` - run a process the way a container runtime runs a container.

use anyhow::Result;
use clap::Parser;
use skiff_observe::{LoggerConfig, LoggerLevel, init_logger};
use tracing::debug;

mod commands;

use commands::{Cli, Commands};

/// Overrides `--log-level` when set.
const LOG_ENV: &str = "SKIFF_LOG";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match std::env::var(LOG_ENV) {
        Ok(directives) => LoggerLevel::new(directives)?,
        Err(_) => cli.log_level.clone(),
    };
    init_logger(&LoggerConfig {
        format: cli.log_format,
        level,
        ..Default::default()
    })?;
    debug!(target: "skiff.run", format = %cli.log_format, "logger initialized");

    match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
    }
}
