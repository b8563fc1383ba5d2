//! Trace query command
//!
//! Correlate and display the RPC steps attributed to one CLI command.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;

use chaintrace::config;
use chaintrace::correlate::{Confidence, CorrelationError, Correlator, Trace};
use chaintrace::model::RecordStatus;
use chaintrace::store::TelemetryDb;

/// Correlate and display a command trace
#[derive(Debug, Clone, Parser)]
pub struct TraceArgs {
    /// Command record identifier to trace
    pub command_id: u64,

    /// Output format (tree, json)
    #[arg(short = 'f', long, default_value = "tree")]
    pub format: String,
}

/// Execute the trace command
pub async fn execute(config_path: &Path, args: TraceArgs) -> Result<()> {
    let cfg = config::load_config(config_path)?;

    let db_url = format!("sqlite:{}", cfg.storage.database_path);
    let db = Arc::new(TelemetryDb::new(&db_url).await?);

    let correlator = Correlator::new(db, cfg.correlator.max_overlapping_commands);

    let trace = match correlator.trace(args.command_id).await {
        Ok(trace) => trace,
        Err(CorrelationError::UnknownCommand(id)) => {
            println!("{}", format!("No command record with id {}", id).yellow());
            return Ok(());
        }
        Err(CorrelationError::NoSteps(id)) => {
            println!(
                "{}",
                format!("No RPC calls attributable to command {}", id).yellow()
            );
            return Ok(());
        }
        Err(CorrelationError::Storage(e)) => return Err(e),
    };

    match args.format.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&trace)?;
            println!("{}", json);
        }
        "tree" | _ => {
            display_trace_tree(&trace);
        }
    }

    Ok(())
}

/// Display trace in ASCII tree format
fn display_trace_tree(trace: &Trace) {
    let timestamp = chrono::DateTime::from_timestamp_millis(trace.timestamp as i64)
        .unwrap_or_default()
        .format("%Y-%m-%d %H:%M:%S%.3f");

    println!("{}", "=".repeat(80).dimmed());
    println!("{} {}", "Command:".bold(), trace.command.cyan());
    println!("{} #{}", "Id:".bold(), trace.command_id);
    println!("{} {}", "Started:".bold(), timestamp);
    println!("{} {}", "Duration:".bold(), format_duration(trace.duration_ms));
    println!(
        "{} {}",
        "Confidence:".bold(),
        confidence_colored(trace.confidence)
    );
    println!("{} {}", "Steps:".bold(), trace.steps.len());
    println!("{}", "=".repeat(80).dimmed());
    println!();

    for (i, step) in trace.steps.iter().enumerate() {
        let tree_char = if i == trace.steps.len() - 1 {
            "└─ "
        } else {
            "├─ "
        };

        let offset = step.record.timestamp.saturating_sub(trace.timestamp);

        let status_colored = match step.record.status {
            RecordStatus::Success => step.record.status.as_str().green(),
            RecordStatus::Error => step.record.status.as_str().red().bold(),
        };

        println!(
            "{}{} {} {} ({}) {}",
            tree_char,
            step.record.rpc_method.bold().blue(),
            format!("+{}ms", offset).dimmed(),
            format_duration(step.record.duration_ms),
            status_colored,
            confidence_colored(step.confidence)
        );
    }
    println!();
}

fn confidence_colored(confidence: Confidence) -> String {
    match confidence {
        Confidence::Exact => "exact".green().to_string(),
        Confidence::Heuristic => "heuristic".yellow().to_string(),
    }
}

/// Format duration in human-friendly way
fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms).green().to_string()
    } else if ms < 10000 {
        format!("{:.2}s", ms as f64 / 1000.0).cyan().to_string()
    } else {
        format!("{:.2}s", ms as f64 / 1000.0).yellow().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_args_parsing() {
        let args = TraceArgs::parse_from(&["trace", "42", "--format", "json"]);
        assert_eq!(args.command_id, 42);
        assert_eq!(args.format, "json");
    }

    #[test]
    fn test_format_duration() {
        assert!(format_duration(500).contains("500ms"));
        assert!(format_duration(1500).contains("1.50s"));
    }
}
