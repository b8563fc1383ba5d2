//! CLI command log query
//!
//! Query and display stored command records directly from the database.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::path::Path;

use chaintrace::config;
use chaintrace::model::{current_millis, CommandRecord, RecordStatus};
use chaintrace::store::{CommandFilter, TelemetryDb};

/// Query and display CLI command records
#[derive(Debug, Clone, Parser)]
pub struct LogsArgs {
    /// Filter by outcome (success, error)
    #[arg(short, long)]
    pub status: Option<String>,

    /// Substring match against the command text
    #[arg(short = 'g', long)]
    pub contains: Option<String>,

    /// Show records since N seconds ago (e.g., 3600 for last hour)
    #[arg(long)]
    pub since: Option<u64>,

    /// Maximum number of results
    #[arg(long, default_value = "100")]
    pub limit: usize,

    /// Output format (text, json)
    #[arg(short = 'f', long, default_value = "text")]
    pub format: String,
}

/// Execute the logs command
pub async fn execute(config_path: &Path, args: LogsArgs) -> Result<()> {
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

    let filter = CommandFilter {
        status,
        contains: args.contains.clone(),
        since: args.since.map(|s| current_millis().saturating_sub(s * 1000)),
        until: None,
        limit: Some(args.limit),
        offset: 0,
    };

    let records = db.list_commands(&filter).await?;

    if records.is_empty() {
        println!("{}", "No command records found matching the criteria".yellow());
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

fn display_records_text(records: &[CommandRecord]) {
    println!("{}", format!("Found {} command records", records.len()).bold());
    println!();

    for record in records {
        let timestamp = chrono::DateTime::from_timestamp_millis(record.timestamp as i64)
            .unwrap_or_default()
            .format("%Y-%m-%d %H:%M:%S%.3f");

        let status_colored = match record.status {
            RecordStatus::Success => record.status.as_str().green(),
            RecordStatus::Error => record.status.as_str().red().bold(),
        };

        let user_display = record
            .user
            .as_ref()
            .map(|u| format!(" user={}", u))
            .unwrap_or_default();

        println!(
            "{} {} {} {}{} {}",
            timestamp.to_string().dimmed(),
            format!("#{}", record.id).cyan(),
            status_colored,
            format!("{}ms", record.duration_ms).dimmed(),
            user_display.dimmed(),
            record.command
        );

        if !record.output.is_empty() {
            println!("  {}", record.output.dimmed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logs_args_parsing() {
        let args = LogsArgs::parse_from(&["logs", "--status", "error", "--limit", "50"]);
        assert_eq!(args.status, Some("error".to_string()));
        assert_eq!(args.limit, 50);
        assert_eq!(args.format, "text");
    }
}
