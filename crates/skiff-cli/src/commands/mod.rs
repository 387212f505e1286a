use clap::{Parser, Subcommand};
use skiff_observe::{LoggerFormat, LoggerLevel};

pub mod run;

#[derive(Parser, Debug)]
#[command(name = "skiff", version, about = "Run processes like containers")]
pub struct Cli {
    /// Log output format: text, json or journald
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LoggerFormat,

    /// Log filter directives (overridden by SKIFF_LOG)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: LoggerLevel,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create and run a new container from a command
    Run(run::RunArgs),
}
