//! Scheduled retention cleanup
//!
//! Deletes records older than each stream's TTL, once per day at a
//! configured hour.

use super::database::{CleanupStats, TelemetryDb};
use anyhow::Result;
use chrono::{Datelike, Timelike};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

/// Cleanup configuration
#[derive(Debug, Clone, Copy)]
pub struct CleanupConfig {
    /// Hour of day to run cleanup (0-23)
    pub cleanup_hour: u32,

    /// How often to check whether it is cleanup time
    pub check_interval: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            cleanup_hour: 3,
            check_interval: Duration::from_secs(3600),
        }
    }
}

/// Spawn the background cleanup task
pub fn spawn_cleanup_task(
    db: Arc<TelemetryDb>,
    config: CleanupConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        cleanup_loop(db, config).await;
    })
}

async fn cleanup_loop(db: Arc<TelemetryDb>, config: CleanupConfig) {
    let mut interval = time::interval(config.check_interval);
    let mut last_cleanup_day: Option<u32> = None;

    loop {
        interval.tick().await;

        let now = chrono::Local::now();
        let current_hour = now.hour();
        let current_day = now.ordinal();

        if current_hour == config.cleanup_hour && Some(current_day) != last_cleanup_day {
            tracing::info!(cleanup_hour = config.cleanup_hour, "Starting scheduled cleanup");

            match db.cleanup_old_data().await {
                Ok(stats) => {
                    tracing::info!(
                        commands_deleted = stats.commands_deleted,
                        rpc_calls_deleted = stats.rpc_calls_deleted,
                        events_deleted = stats.events_deleted,
                        "Cleanup completed successfully"
                    );

                    last_cleanup_day = Some(current_day);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Cleanup failed");
                }
            }
        }
    }
}

/// Run cleanup immediately (manual triggering)
pub async fn run_cleanup_now(db: &TelemetryDb) -> Result<CleanupStats> {
    db.cleanup_old_data().await
}
