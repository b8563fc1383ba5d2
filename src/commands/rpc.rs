//! RPC call log query
//!
//! Query and display stored RPC call records directly from the database.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::path::Path;

use chaintrace::config;
use chaintrace::model::{current_millis, RecordStatus, RpcRecord};
use chaintrace::store::{RpcFilter, TelemetryDb};

/// Query and display RPC call records
#[derive(Debug, Clone, Parser)]
pub struct RpcArgs {
    /// Filter by outcome (success, error)
    #[arg(short, long)]
    pub status: Option<String>,

    /// Exact method name match
    #[arg(short, long)]
    pub method: Option<String>,

    /// Substring match against the method name
    #[arg(short = 'g', long)]
    pub contains: Option<String>,

    /// Show records since N seconds ago
    #[arg(long)]
    pub since: Option<u64>,

    /// Maximum number of results
    #[arg(long, default_value = "100")]
    pub limit: usize,

    /// Output format (text, json)
    #[arg(short = 'f', long, default_value = "text")]
    pub format: String,
}

/// Execute the rpc command
pub async fn execute(config_path: &Path, args: RpcArgs) -> Result<()> {
    let cfg = config::load_config(config_path)?;

    let db_url = format!("sqlite:{}", cfg.storage.database_path);
    let db = TelemetryDb::new(&db_url).await?;

    let status = match &args.status {
        None => None,
        Some(s) => match RecordStatus::parse(s) {
            Some(status) => Some(status),
            None => {
                eprintln!("{}", format!("Unknown status filter: {}", s).red());
                return Ok(());
            }
        },
    };

    let filter = RpcFilter {
        status,
        method: args.method.clone(),
        contains: args.contains.clone(),
        since: args.since.map(|s| current_millis().saturating_sub(s * 1000)),
        until: None,
        limit: Some(args.limit),
        offset: 0,
    };

    let records = db.list_rpc_calls(&filter).await?;

    if records.is_empty() {
        println!("{}", "No RPC records found matching the criteria".yellow());
        return Ok(());
    }

    match args.format.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&records)?;
            println!("{}", json);
        }
        "text" | _ => {
            display_records_text(&records);
        }
    }

    Ok(())
}

fn display_records_text(records: &[RpcRecord]) {
    println!("{}", format!("Found {} RPC records", records.len()).bold());
    println!();

    for record in records {
        let timestamp = chrono::DateTime::from_timestamp_millis(record.timestamp as i64)
            .unwrap_or_default()
            .format("%Y-%m-%d %H:%M:%S%.3f");

        let status_colored = match record.status {
            RecordStatus::Success => record.status.as_str().green(),
            RecordStatus::Error => record.status.as_str().red().bold(),
        };

        let parent_display = record
            .parent_command_id
            .map(|id| format!(" parent=#{}", id))
            .unwrap_or_default();

        println!(
            "{} {} {} {} {}{}",
            timestamp.to_string().dimmed(),
            format!("#{}", record.id).cyan(),
            status_colored,
            record.rpc_method.blue(),
            format!("{}ms", record.duration_ms).dimmed(),
            parent_display.dimmed()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_args_parsing() {
        let args = RpcArgs::parse_from(&["rpc", "--method", "simulateTransaction"]);
        assert_eq!(args.method, Some("simulateTransaction".to_string()));
        assert_eq!(args.limit, 100);
    }
}
