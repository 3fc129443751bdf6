//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// TripFlow - group trip planning coordinator
#[derive(Parser)]
#[command(
    name = "tf",
    about = "Group trip planning coordinator for asynchronous message channels",
    version,
    after_help = "Logs are written to: ~/.local/share/tripflow/logs/tripflow.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run the coordinator, reading inbound messages from stdin
    Run,

    /// Print the effective configuration after the fallback chain
    Config,
}

/// Path of the log file `setup_logging` writes to
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tripflow")
        .join("logs")
        .join("tripflow.log")
}
