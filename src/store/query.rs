//! List and analytics queries over the record store
//!
//! All list operations return newest-first sequences; filters are
//! conjunctive (every supplied predicate must match).

use super::database::{row_to_command, row_to_event, row_to_rpc, TelemetryDb};
use crate::model::{CommandRecord, ContractEvent, RecordStatus, RpcRecord};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::Row;

const DEFAULT_LIMIT: usize = 100;

/// Filter for command list queries
#[derive(Debug, Clone, Default)]
pub struct CommandFilter {
    pub status: Option<RecordStatus>,

    /// Substring match against the command text
    pub contains: Option<String>,

    /// Start time (Unix milliseconds)
    pub since: Option<u64>,

    /// End time (Unix milliseconds)
    pub until: Option<u64>,

    pub limit: Option<usize>,

    pub offset: usize,
}

/// Filter for RPC call list queries
#[derive(Debug, Clone, Default)]
pub struct RpcFilter {
    pub status: Option<RecordStatus>,

    /// Exact method name match
    pub method: Option<String>,

    /// Substring match against the method name
    pub contains: Option<String>,

    pub since: Option<u64>,

    pub until: Option<u64>,

    pub limit: Option<usize>,

    pub offset: usize,
}

/// Aggregated contract activity for the metrics endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractMetrics {
    pub total_calls: u64,
    pub gas_usage: Vec<GasReading>,
    pub error_distribution: Vec<ErrorSlice>,
    pub performance_data: Vec<MethodPerformance>,
}

/// One gas reading extracted from a contract event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasReading {
    pub timestamp: u64,
    pub contract_id: String,
    pub gas_used: u64,
}

/// Error count for one RPC method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorSlice {
    pub rpc_method: String,
    pub count: u64,
}

/// Call volume and latency for one RPC method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodPerformance {
    pub rpc_method: String,
    pub calls: u64,
    pub avg_duration_ms: f64,
}

impl TelemetryDb {
    /// List command records, newest first
    pub async fn list_commands(&self, filter: &CommandFilter) -> Result<Vec<CommandRecord>> {
        let mut sql = String::from(
            "SELECT id, command, parameters, status, timestamp, duration_ms, output, user
             FROM commands WHERE 1=1",
        );
        let mut binds: Vec<String> = Vec::new();

        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            binds.push(status.as_str().to_string());
        }

        if let Some(contains) = &filter.contains {
            sql.push_str(" AND command LIKE ?");
            binds.push(format!("%{}%", contains));
        }

        if let Some(since) = filter.since {
            sql.push_str(&format!(" AND timestamp >= {}", since as i64));
        }

        if let Some(until) = filter.until {
            sql.push_str(&format!(" AND timestamp <= {}", until as i64));
        }

        sql.push_str(&format!(
            " ORDER BY timestamp DESC, id DESC LIMIT {} OFFSET {}",
            filter.limit.unwrap_or(DEFAULT_LIMIT),
            filter.offset
        ));

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }

        let rows = query.fetch_all(self.pool()).await?;
        Ok(rows.into_iter().map(row_to_command).collect())
    }

    /// List RPC call records, newest first
    pub async fn list_rpc_calls(&self, filter: &RpcFilter) -> Result<Vec<RpcRecord>> {
        let mut sql = String::from(
            "SELECT id, rpc_method, parameters, status, timestamp, duration_ms, result, parent_command_id
             FROM rpc_calls WHERE 1=1",
        );
        let mut binds: Vec<String> = Vec::new();

        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            binds.push(status.as_str().to_string());
        }

        if let Some(method) = &filter.method {
            sql.push_str(" AND rpc_method = ?");
            binds.push(method.clone());
        }

        if let Some(contains) = &filter.contains {
            sql.push_str(" AND rpc_method LIKE ?");
            binds.push(format!("%{}%", contains));
        }

        if let Some(since) = filter.since {
            sql.push_str(&format!(" AND timestamp >= {}", since as i64));
        }

        if let Some(until) = filter.until {
            sql.push_str(&format!(" AND timestamp <= {}", until as i64));
        }

        sql.push_str(&format!(
            " ORDER BY timestamp DESC, id DESC LIMIT {} OFFSET {}",
            filter.limit.unwrap_or(DEFAULT_LIMIT),
            filter.offset
        ));

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }

        let rows = query.fetch_all(self.pool()).await?;
        Ok(rows.into_iter().map(row_to_rpc).collect())
    }

    /// Most recent contract events
    pub async fn recent_events(&self, limit: usize) -> Result<Vec<ContractEvent>> {
        let rows = sqlx::query(
            "SELECT id, contract_id, event_type, timestamp, data
             FROM contract_events
             ORDER BY timestamp DESC, id DESC
             LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(row_to_event).collect())
    }

    /// Contract activity metrics over records newer than `since`
    pub async fn contract_metrics(&self, since: u64) -> Result<ContractMetrics> {
        let total_calls: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM rpc_calls WHERE timestamp >= ?")
                .bind(since as i64)
                .fetch_one(self.pool())
                .await?;

        let gas_rows = sqlx::query(
            "SELECT timestamp, contract_id,
                    CAST(json_extract(data, '$.gas_used') AS INTEGER) AS gas_used
             FROM contract_events
             WHERE timestamp >= ? AND json_extract(data, '$.gas_used') IS NOT NULL
             ORDER BY timestamp DESC
             LIMIT 100",
        )
        .bind(since as i64)
        .fetch_all(self.pool())
        .await?;

        let gas_usage = gas_rows
            .into_iter()
            .map(|row| GasReading {
                timestamp: row.get::<i64, _>("timestamp") as u64,
                contract_id: row.get("contract_id"),
                gas_used: row.get::<i64, _>("gas_used").max(0) as u64,
            })
            .collect();

        let error_rows = sqlx::query(
            "SELECT rpc_method, COUNT(*) AS count
             FROM rpc_calls
             WHERE timestamp >= ? AND status = 'error'
             GROUP BY rpc_method
             ORDER BY count DESC
             LIMIT 20",
        )
        .bind(since as i64)
        .fetch_all(self.pool())
        .await?;

        let error_distribution = error_rows
            .into_iter()
            .map(|row| ErrorSlice {
                rpc_method: row.get("rpc_method"),
                count: row.get::<i64, _>("count") as u64,
            })
            .collect();

        let perf_rows = sqlx::query(
            "SELECT rpc_method, COUNT(*) AS calls, AVG(duration_ms) AS avg_duration
             FROM rpc_calls
             WHERE timestamp >= ?
             GROUP BY rpc_method
             ORDER BY calls DESC
             LIMIT 20",
        )
        .bind(since as i64)
        .fetch_all(self.pool())
        .await?;

        let performance_data = perf_rows
            .into_iter()
            .map(|row| MethodPerformance {
                rpc_method: row.get("rpc_method"),
                calls: row.get::<i64, _>("calls") as u64,
                avg_duration_ms: row.get::<f64, _>("avg_duration"),
            })
            .collect();

        Ok(ContractMetrics {
            total_calls: total_calls as u64,
            gas_usage,
            error_distribution,
            performance_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CommandRecord, ContractEvent, RpcRecord};

    async fn create_test_db() -> TelemetryDb {
        TelemetryDb::new("sqlite::memory:").await.unwrap()
    }

    async fn seed(db: &TelemetryDb) {
        for id in 1..=6u64 {
            let status = if id % 2 == 0 {
                RecordStatus::Error
            } else {
                RecordStatus::Success
            };
            db.insert_command(&CommandRecord {
                id,
                command: if id <= 3 {
                    format!("contract deploy --id {}", id)
                } else {
                    format!("contract invoke --id {}", id)
                },
                parameters: None,
                status,
                timestamp: 1000 * id,
                duration_ms: 100,
                output: String::new(),
                user: None,
            })
            .await
            .unwrap();

            db.insert_rpc(&RpcRecord {
                id,
                rpc_method: if id % 2 == 0 {
                    "sendTransaction".to_string()
                } else {
                    "simulateTransaction".to_string()
                },
                parameters: serde_json::Value::Null,
                status,
                timestamp: 1000 * id,
                duration_ms: 50 * id,
                result: None,
                parent_command_id: None,
            })
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn test_list_commands_newest_first() {
        let db = create_test_db().await;
        seed(&db).await;

        let all = db.list_commands(&CommandFilter::default()).await.unwrap();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0].id, 6);
        assert_eq!(all[5].id, 1);
    }

    #[tokio::test]
    async fn test_list_commands_conjunctive_filters() {
        let db = create_test_db().await;
        seed(&db).await;

        // status=error AND text contains "deploy" leaves only command 2.
        let filter = CommandFilter {
            status: Some(RecordStatus::Error),
            contains: Some("deploy".to_string()),
            ..Default::default()
        };
        let matched = db.list_commands(&filter).await.unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, 2);
    }

    #[tokio::test]
    async fn test_list_commands_limit_offset() {
        let db = create_test_db().await;
        seed(&db).await;

        let filter = CommandFilter {
            limit: Some(2),
            offset: 2,
            ..Default::default()
        };
        let page = db.list_commands(&filter).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, 4);
        assert_eq!(page[1].id, 3);
    }

    #[tokio::test]
    async fn test_list_rpc_by_method() {
        let db = create_test_db().await;
        seed(&db).await;

        let filter = RpcFilter {
            method: Some("sendTransaction".to_string()),
            ..Default::default()
        };
        let matched = db.list_rpc_calls(&filter).await.unwrap();
        assert_eq!(matched.len(), 3);
        assert!(matched.iter().all(|r| r.rpc_method == "sendTransaction"));
    }

    #[tokio::test]
    async fn test_recent_events() {
        let db = create_test_db().await;

        let events: Vec<ContractEvent> = (1..=10)
            .map(|id| ContractEvent {
                id,
                contract_id: "CCR6".to_string(),
                event_type: "transfer".to_string(),
                timestamp: 100 * id,
                data: serde_json::Value::Null,
            })
            .collect();
        db.insert_events_batch(&events).await.unwrap();

        let recent = db.recent_events(3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].id, 10);
    }

    #[tokio::test]
    async fn test_contract_metrics() {
        let db = create_test_db().await;
        seed(&db).await;

        db.insert_events_batch(&[
            ContractEvent {
                id: 1,
                contract_id: "CCR6".to_string(),
                event_type: "invoke".to_string(),
                timestamp: 5000,
                data: serde_json::json!({"gas_used": 145623}),
            },
            ContractEvent {
                id: 2,
                contract_id: "CCR6".to_string(),
                event_type: "transfer".to_string(),
                timestamp: 6000,
                data: serde_json::json!({"amount": 5}),
            },
        ])
        .await
        .unwrap();

        let metrics = db.contract_metrics(0).await.unwrap();
        assert_eq!(metrics.total_calls, 6);
        assert_eq!(metrics.gas_usage.len(), 1);
        assert_eq!(metrics.gas_usage[0].gas_used, 145623);
        assert_eq!(metrics.error_distribution.len(), 1);
        assert_eq!(metrics.error_distribution[0].rpc_method, "sendTransaction");
        assert_eq!(metrics.error_distribution[0].count, 3);
        assert_eq!(metrics.performance_data.len(), 2);
    }
}
