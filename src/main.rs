use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use chaintrace::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    init_tracing();

    match args.get_command() {
        cli::Commands::Serve => {
            commands::serve::execute(&args.config).await?;
        }
        cli::Commands::Logs(logs_args) => {
            commands::logs::execute(&args.config, logs_args).await?;
        }
        cli::Commands::Rpc(rpc_args) => {
            commands::rpc::execute(&args.config, rpc_args).await?;
        }
        cli::Commands::Trace(trace_args) => {
            commands::trace::execute(&args.config, trace_args).await?;
        }
        cli::Commands::Summary(summary_args) => {
            commands::summary::execute(&args.config, summary_args).await?;
        }
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(&args.config)?,
            cli::ConfigCommands::Validate => commands::config::validate(&args.config)?,
        },
        cli::Commands::Version => {
            println!("chaintrace v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
