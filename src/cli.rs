use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "chaintrace", version, about = "Telemetry collector for blockchain developer tooling")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the collector service (default)
    Serve,

    /// Query stored CLI command records
    Logs(crate::commands::logs::LogsArgs),

    /// Query stored RPC call records
    Rpc(crate::commands::rpc::RpcArgs),

    /// Display the correlated trace for a command
    Trace(crate::commands::trace::TraceArgs),

    /// Fetch the analytics summary from a running instance
    Summary(crate::commands::summary::SummaryArgs),

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Display current configuration
    Show,

    /// Validate configuration file
    Validate,
}

impl Cli {
    /// Get the command to execute, defaulting to Serve if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}
