//! Analytics summary command
//!
//! Fetches the rolling summary from a running collector over HTTP; the
//! summary lives in the server's in-memory aggregator, not the database.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::path::Path;

use chaintrace::config;
use chaintrace::handlers::query_api::SummaryResponse;

/// Fetch and display the analytics summary
#[derive(Debug, Clone, Parser)]
pub struct SummaryArgs {
    /// Collector base URL (derived from config if not provided)
    #[arg(short, long)]
    pub url: Option<String>,

    /// Narrower window than configured, in hours
    #[arg(short, long)]
    pub window_hours: Option<u64>,

    /// Output format (text, json)
    #[arg(short = 'f', long, default_value = "text")]
    pub format: String,
}

/// Execute the summary command
pub async fn execute(config_path: &Path, args: SummaryArgs) -> Result<()> {
    let cfg = config::load_config(config_path)?;

    let base_url = args
        .url
        .clone()
        .unwrap_or_else(|| format!("http://{}:{}", cfg.server.host, cfg.server.port));

    let mut url = format!("{}/api/analytics/summary", base_url.trim_end_matches('/'));
    if let Some(hours) = args.window_hours {
        url.push_str(&format!("?window_hours={}", hours));
    }

    let response = reqwest::Client::new()
        .get(&url)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to reach collector at {}: {}", base_url, e))?;

    if !response.status().is_success() {
        anyhow::bail!("Collector returned HTTP {}", response.status());
    }

    let summary: SummaryResponse = response.json().await?;

    match args.format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        "text" | _ => {
            display_summary_text(&summary);
        }
    }

    Ok(())
}

fn display_summary_text(summary: &SummaryResponse) {
    let hours = summary.window_seconds as f64 / 3600.0;

    println!(
        "{}",
        format!("Analytics summary (last {:.0}h)", hours).bold()
    );
    println!();

    let success_rate = format!("{:.1}%", summary.success_rate);
    let success_colored = if summary.success_rate >= 95.0 {
        success_rate.green()
    } else if summary.success_rate >= 80.0 {
        success_rate.yellow()
    } else {
        success_rate.red()
    };

    println!("  {:<22} {}", "Total commands:".bold(), summary.total_commands);
    println!("  {:<22} {}", "Success rate:".bold(), success_colored);
    println!("  {:<22} {}", "Errors:".bold(), summary.error_count);
    println!(
        "  {:<22} {:.1}ms",
        "Avg response time:".bold(),
        summary.avg_response_time
    );
    if let Some(p95) = summary.p95_response_time {
        println!("  {:<22} {:.1}ms", "p95 response time:".bold(), p95);
    }
    if let Some(p99) = summary.p99_response_time {
        println!("  {:<22} {:.1}ms", "p99 response time:".bold(), p99);
    }
    println!(
        "  {:<22} {:.1}",
        "Commands per hour:".bold(),
        summary.commands_per_hour
    );
    println!(
        "  {:<22} {:.0}/100",
        "Performance score:".bold(),
        summary.performance_score
    );
}
