//! SQLite database layer for the telemetry record store
//!
//! Provides async operations over the append-only streams with:
//! - Connection pooling
//! - Automatic migrations
//! - `INSERT OR IGNORE` as the atomic check-and-insert on identifiers
//! - WAL mode for concurrent reads/writes

use crate::model::{CommandRecord, ContractEvent, RecordStatus, RpcRecord};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;

/// Telemetry database handle
///
/// Manages the SQLite connection pool and raw record operations.
pub struct TelemetryDb {
    pool: SqlitePool,
}

impl TelemetryDb {
    /// Open (or create) the database and run migrations
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite URL (e.g., "sqlite:./data/chaintrace.db")
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .pragma("cache_size", "-64000")
            .pragma("temp_store", "memory")
            .pragma("synchronous", "NORMAL");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .context("Failed to connect to telemetry database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run telemetry database migrations")?;

        Ok(Self { pool })
    }

    /// Append a command record. Returns `true` if the row was inserted,
    /// `false` if the identifier already existed (idempotent no-op).
    pub async fn insert_command(&self, record: &CommandRecord) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO commands (id, command, parameters, status, timestamp, duration_ms, output, user)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id as i64)
        .bind(&record.command)
        .bind(&record.parameters)
        .bind(record.status.as_str())
        .bind(record.timestamp as i64)
        .bind(record.duration_ms as i64)
        .bind(&record.output)
        .bind(&record.user)
        .execute(&self.pool)
        .await
        .context("Failed to insert command record")?;

        Ok(result.rows_affected() == 1)
    }

    /// Append an RPC call record, idempotent on the identifier.
    pub async fn insert_rpc(&self, record: &RpcRecord) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO rpc_calls (id, rpc_method, parameters, status, timestamp, duration_ms, result, parent_command_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id as i64)
        .bind(&record.rpc_method)
        .bind(record.parameters.to_string())
        .bind(record.status.as_str())
        .bind(record.timestamp as i64)
        .bind(record.duration_ms as i64)
        .bind(record.result.as_ref().map(|v| v.to_string()))
        .bind(record.parent_command_id.map(|id| id as i64))
        .execute(&self.pool)
        .await
        .context("Failed to insert rpc record")?;

        Ok(result.rows_affected() == 1)
    }

    /// Append contract events in one transaction. Duplicate identifiers
    /// within or across batches are ignored.
    pub async fn insert_events_batch(&self, events: &[ContractEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for event in events {
            sqlx::query(
                "INSERT OR IGNORE INTO contract_events (id, contract_id, event_type, timestamp, data)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(event.id as i64)
            .bind(&event.contract_id)
            .bind(&event.event_type)
            .bind(event.timestamp as i64)
            .bind(event.data.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    /// Look up one command record by identifier
    pub async fn get_command(&self, id: u64) -> Result<Option<CommandRecord>> {
        let row = sqlx::query(
            "SELECT id, command, parameters, status, timestamp, duration_ms, output, user
             FROM commands WHERE id = ?",
        )
        .bind(id as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_command))
    }

    /// RPC records explicitly linked to a command, ordered by start time
    pub async fn rpc_linked_to(&self, command_id: u64) -> Result<Vec<RpcRecord>> {
        let rows = sqlx::query(
            "SELECT id, rpc_method, parameters, status, timestamp, duration_ms, result, parent_command_id
             FROM rpc_calls
             WHERE parent_command_id = ?
             ORDER BY timestamp ASC, id ASC",
        )
        .bind(command_id as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_rpc).collect())
    }

    /// Unlinked RPC records whose start time falls in [start, end],
    /// candidates for heuristic attribution
    pub async fn unlinked_rpc_in_window(&self, start: u64, end: u64) -> Result<Vec<RpcRecord>> {
        let rows = sqlx::query(
            "SELECT id, rpc_method, parameters, status, timestamp, duration_ms, result, parent_command_id
             FROM rpc_calls
             WHERE parent_command_id IS NULL AND timestamp >= ? AND timestamp <= ?
             ORDER BY timestamp ASC, id ASC",
        )
        .bind(start as i64)
        .bind(end as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_rpc).collect())
    }

    /// Commands whose windows overlap [start, end], capped at `limit`.
    /// The cap bounds the correlator's scan under pathological overlap.
    pub async fn commands_overlapping(
        &self,
        start: u64,
        end: u64,
        limit: usize,
    ) -> Result<Vec<CommandRecord>> {
        let rows = sqlx::query(
            "SELECT id, command, parameters, status, timestamp, duration_ms, output, user
             FROM commands
             WHERE timestamp <= ? AND timestamp + duration_ms >= ?
             ORDER BY timestamp ASC, id ASC
             LIMIT ?",
        )
        .bind(end as i64)
        .bind(start as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_command).collect())
    }

    /// Status/timing tuples for rebuilding in-memory aggregates on startup
    pub async fn command_timings_since(&self, since: u64) -> Result<Vec<(RecordStatus, u64, u64)>> {
        self.timings_since("commands", since).await
    }

    pub async fn rpc_timings_since(&self, since: u64) -> Result<Vec<(RecordStatus, u64, u64)>> {
        self.timings_since("rpc_calls", since).await
    }

    async fn timings_since(&self, table: &str, since: u64) -> Result<Vec<(RecordStatus, u64, u64)>> {
        let sql = format!(
            "SELECT status, timestamp, duration_ms FROM {} WHERE timestamp >= ?",
            table
        );
        let rows = sqlx::query(&sql)
            .bind(since as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let status = RecordStatus::parse(row.get("status")).unwrap_or(RecordStatus::Error);
                (
                    status,
                    row.get::<i64, _>("timestamp") as u64,
                    row.get::<i64, _>("duration_ms") as u64,
                )
            })
            .collect())
    }

    /// Row counts across the three streams
    pub async fn stats(&self) -> Result<StoreStats> {
        let command_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM commands")
            .fetch_one(&self.pool)
            .await?;

        let rpc_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rpc_calls")
            .fetch_one(&self.pool)
            .await?;

        let event_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contract_events")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            command_count: command_count as u64,
            rpc_count: rpc_count as u64,
            event_count: event_count as u64,
        })
    }

    /// Delete records older than each stream's retention TTL
    ///
    /// Called from the scheduled cleanup task.
    pub async fn cleanup_old_data(&self) -> Result<CleanupStats> {
        let mut tx = self.pool.begin().await?;

        let policies: Vec<(String, i64)> =
            sqlx::query_as("SELECT table_name, ttl_days FROM retention_policy")
                .fetch_all(&mut *tx)
                .await?;

        let mut stats = CleanupStats {
            commands_deleted: 0,
            rpc_calls_deleted: 0,
            events_deleted: 0,
        };

        let now = crate::model::current_millis() as i64;

        for (table_name, ttl_days) in policies {
            let cutoff = now.saturating_sub(ttl_days * 24 * 60 * 60 * 1000);

            let deleted = match table_name.as_str() {
                "commands" => {
                    let result = sqlx::query("DELETE FROM commands WHERE timestamp < ?")
                        .bind(cutoff)
                        .execute(&mut *tx)
                        .await?;
                    stats.commands_deleted = result.rows_affected();
                    result.rows_affected()
                }
                "rpc_calls" => {
                    let result = sqlx::query("DELETE FROM rpc_calls WHERE timestamp < ?")
                        .bind(cutoff)
                        .execute(&mut *tx)
                        .await?;
                    stats.rpc_calls_deleted = result.rows_affected();
                    result.rows_affected()
                }
                "contract_events" => {
                    let result = sqlx::query("DELETE FROM contract_events WHERE timestamp < ?")
                        .bind(cutoff)
                        .execute(&mut *tx)
                        .await?;
                    stats.events_deleted = result.rows_affected();
                    result.rows_affected()
                }
                _ => 0,
            };

            tracing::info!(
                table = %table_name,
                ttl_days = ttl_days,
                deleted = deleted,
                "Cleaned up old records"
            );

            sqlx::query("UPDATE retention_policy SET last_cleanup = ? WHERE table_name = ?")
                .bind(now)
                .bind(&table_name)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .context("Failed to VACUUM database")?;

        Ok(stats)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

pub(crate) fn row_to_command(row: sqlx::sqlite::SqliteRow) -> CommandRecord {
    CommandRecord {
        id: row.get::<i64, _>("id") as u64,
        command: row.get("command"),
        parameters: row.get("parameters"),
        status: RecordStatus::parse(row.get("status")).unwrap_or(RecordStatus::Error),
        timestamp: row.get::<i64, _>("timestamp") as u64,
        duration_ms: row.get::<i64, _>("duration_ms") as u64,
        output: row.get("output"),
        user: row.get("user"),
    }
}

pub(crate) fn row_to_rpc(row: sqlx::sqlite::SqliteRow) -> RpcRecord {
    let parameters: String = row.get("parameters");
    let result: Option<String> = row.get("result");

    RpcRecord {
        id: row.get::<i64, _>("id") as u64,
        rpc_method: row.get("rpc_method"),
        parameters: serde_json::from_str(&parameters).unwrap_or(serde_json::Value::Null),
        status: RecordStatus::parse(row.get("status")).unwrap_or(RecordStatus::Error),
        timestamp: row.get::<i64, _>("timestamp") as u64,
        duration_ms: row.get::<i64, _>("duration_ms") as u64,
        result: result.and_then(|r| serde_json::from_str(&r).ok()),
        parent_command_id: row
            .get::<Option<i64>, _>("parent_command_id")
            .map(|id| id as u64),
    }
}

pub(crate) fn row_to_event(row: sqlx::sqlite::SqliteRow) -> ContractEvent {
    let data: String = row.get("data");

    ContractEvent {
        id: row.get::<i64, _>("id") as u64,
        contract_id: row.get("contract_id"),
        event_type: row.get("event_type"),
        timestamp: row.get::<i64, _>("timestamp") as u64,
        data: serde_json::from_str(&data).unwrap_or(serde_json::Value::Null),
    }
}

/// Row counts per stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub command_count: u64,
    pub rpc_count: u64,
    pub event_count: u64,
}

/// Cleanup statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupStats {
    pub commands_deleted: u64,
    pub rpc_calls_deleted: u64,
    pub events_deleted: u64,
}
