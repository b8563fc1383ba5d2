use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use tracing::info;

use chaintrace::{config, server};

/// Execute the serve command
pub async fn execute(config_path: &Path) -> Result<()> {
    println!("{}", "Starting chaintrace collector...".green());

    let cfg = config::load_config(config_path)?;

    info!("Starting chaintrace collector in foreground mode");

    // Blocks until shutdown
    server::start_server(cfg, config_path.to_path_buf()).await?;

    Ok(())
}
