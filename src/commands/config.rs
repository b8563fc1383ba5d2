use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use tracing::info;

use chaintrace::config;

/// Execute the config show command
pub fn show(config_path: &Path) -> Result<()> {
    println!("{}", "Loading configuration...".yellow());
    info!("Loading configuration for display");

    let cfg = config::load_config(config_path)?;

    println!("{}", "Current Configuration:".green().bold());
    println!();

    let toml_string = toml::to_string_pretty(&cfg)?;
    println!("{}", toml_string);

    Ok(())
}

/// Execute the config validate command
pub fn validate(config_path: &Path) -> Result<()> {
    println!("{}", "Validating configuration...".yellow());
    info!("Validating configuration file");

    let cfg = config::load_config(config_path)?;

    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    println!("  Listen address: {}:{}", cfg.server.host, cfg.server.port);
    println!("  Database: {}", cfg.storage.database_path);
    println!("  Aggregation window: {}h", cfg.aggregator.window_hours);
    println!(
        "  Correlator scan cap: {} commands",
        cfg.correlator.max_overlapping_commands
    );

    info!("Configuration validation successful");
    Ok(())
}
