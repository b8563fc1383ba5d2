//! Query surface HTTP API handlers
//!
//! Read-only endpoints consumed by presentation layers. List endpoints
//! degrade to empty collections on storage failure (logged, never fatal to
//! the caller); trace lookups distinguish not-found from empty.

use super::AppState;
use crate::correlate::Trace;
use crate::error::AppError;
use crate::metrics;
use crate::model::{current_millis, CommandRecord, ContractEvent, RecordStatus, RpcRecord};
use crate::store::{CommandFilter, ContractMetrics, RpcFilter};
use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_limit() -> usize {
    100
}

fn default_event_limit() -> usize {
    50
}

/// Query parameters for command list queries
#[derive(Debug, Deserialize)]
pub struct CommandQueryParams {
    /// Filter by outcome ("success" or "error")
    pub status: Option<String>,

    /// Substring match against the command text
    pub contains: Option<String>,

    /// Show records since N seconds ago
    pub since: Option<u64>,

    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default)]
    pub offset: usize,
}

/// Query parameters for RPC list queries
#[derive(Debug, Deserialize)]
pub struct RpcQueryParams {
    pub status: Option<String>,

    /// Exact method name match
    pub method: Option<String>,

    /// Substring match against the method name
    pub contains: Option<String>,

    pub since: Option<u64>,

    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    /// Narrower window than configured, in hours
    pub window_hours: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct EventsParams {
    #[serde(default = "default_event_limit")]
    pub limit: usize,
}

/// Response for command list queries
#[derive(Debug, Serialize)]
pub struct CommandsResponse {
    pub total: usize,
    pub records: Vec<CommandRecord>,
}

/// Response for RPC list queries
#[derive(Debug, Serialize)]
pub struct RpcCallsResponse {
    pub total: usize,
    pub records: Vec<RpcRecord>,
}

/// Response for live event queries
#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub total: usize,
    pub events: Vec<ContractEvent>,
}

/// Analytics summary over the command stream
#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub total_commands: u64,
    /// Percent, 0-100
    pub success_rate: f64,
    pub avg_response_time: f64,
    pub error_count: u64,
    pub commands_per_hour: f64,
    pub performance_score: f64,
    pub p95_response_time: Option<f64>,
    pub p99_response_time: Option<f64>,
    pub window_seconds: u64,
}

fn parse_status(status: &Option<String>) -> Result<Option<RecordStatus>, AppError> {
    match status {
        None => Ok(None),
        Some(s) => RecordStatus::parse(s)
            .map(Some)
            .ok_or_else(|| AppError::Validation(format!("unknown status filter: {}", s))),
    }
}

fn since_to_millis(since: Option<u64>) -> Option<u64> {
    since.map(|s| current_millis().saturating_sub(s * 1000))
}

/// GET /api/cli-logs - List command records with filtering
///
/// Example: GET /api/cli-logs?status=error&contains=deploy&limit=20
pub async fn list_commands(
    State(state): State<AppState>,
    Query(params): Query<CommandQueryParams>,
) -> Result<Json<CommandsResponse>, AppError> {
    metrics::record_query("cli-logs");

    let filter = CommandFilter {
        status: parse_status(&params.status)?,
        contains: params.contains,
        since: since_to_millis(params.since),
        until: None,
        limit: Some(params.limit),
        offset: params.offset,
    };

    // Storage failure degrades to "no data yet" rather than failing the
    // presentation layer.
    let records = match state.db.list_commands(&filter).await {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(error = %e, "Command list query failed; returning empty");
            Vec::new()
        }
    };

    Ok(Json(CommandsResponse {
        total: records.len(),
        records,
    }))
}

/// GET /api/rpc-logs - List RPC call records with filtering
pub async fn list_rpc_calls(
    State(state): State<AppState>,
    Query(params): Query<RpcQueryParams>,
) -> Result<Json<RpcCallsResponse>, AppError> {
    metrics::record_query("rpc-logs");

    let filter = RpcFilter {
        status: parse_status(&params.status)?,
        method: params.method,
        contains: params.contains,
        since: since_to_millis(params.since),
        until: None,
        limit: Some(params.limit),
        offset: params.offset,
    };

    let records = match state.db.list_rpc_calls(&filter).await {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(error = %e, "RPC list query failed; returning empty");
            Vec::new()
        }
    };

    Ok(Json(RpcCallsResponse {
        total: records.len(),
        records,
    }))
}

/// GET /api/trace/{command_id} - Correlated trace for one command
///
/// 404 when the command is unknown or has no attributable RPC calls;
/// a trace is never empty.
pub async fn get_trace(
    State(state): State<AppState>,
    Path(command_id): Path<u64>,
) -> Result<Json<Trace>, AppError> {
    match state.correlator.trace(command_id).await {
        Ok(trace) => {
            metrics::record_trace_lookup("hit");
            Ok(Json(trace))
        }
        Err(e) => {
            let outcome = match &e {
                crate::correlate::CorrelationError::Storage(_) => "error",
                _ => "not_found",
            };
            metrics::record_trace_lookup(outcome);
            Err(e.into())
        }
    }
}

/// GET /api/analytics/summary - Rolling summary over the command stream
pub async fn get_summary(
    State(state): State<AppState>,
    Query(params): Query<SummaryParams>,
) -> Result<Json<SummaryResponse>, AppError> {
    metrics::record_query("analytics-summary");

    if params.window_hours == Some(0) {
        return Err(AppError::Validation(
            "window_hours must be at least 1".to_string(),
        ));
    }

    let now = current_millis();
    let snapshot = match params.window_hours {
        Some(hours) => state
            .command_stats
            .snapshot_over(Duration::from_secs(hours * 3600), now),
        None => state.command_stats.snapshot(now),
    };

    Ok(Json(SummaryResponse {
        total_commands: snapshot.total_count,
        success_rate: snapshot.success_rate,
        avg_response_time: snapshot.avg_duration_ms,
        error_count: snapshot.error_count,
        commands_per_hour: snapshot.per_hour,
        performance_score: snapshot.performance_score,
        p95_response_time: snapshot.p95_duration_ms,
        p99_response_time: snapshot.p99_duration_ms,
        window_seconds: snapshot.window_seconds,
    }))
}

/// GET /api/contracts/metrics - Contract activity over the configured window
pub async fn get_contract_metrics(
    State(state): State<AppState>,
) -> Result<Json<ContractMetrics>, AppError> {
    metrics::record_query("contracts-metrics");

    let window = state.command_stats.window();
    let since = current_millis().saturating_sub(window.as_millis() as u64);

    let contract_metrics = match state.db.contract_metrics(since).await {
        Ok(metrics) => metrics,
        Err(e) => {
            tracing::warn!(error = %e, "Contract metrics query failed; returning empty");
            ContractMetrics::default()
        }
    };

    Ok(Json(contract_metrics))
}

/// GET /api/events/live - Most recent contract events
pub async fn get_live_events(
    State(state): State<AppState>,
    Query(params): Query<EventsParams>,
) -> Result<Json<EventsResponse>, AppError> {
    metrics::record_query("events-live");

    let events = match state.db.recent_events(params.limit).await {
        Ok(events) => events,
        Err(e) => {
            tracing::warn!(error = %e, "Event list query failed; returning empty");
            Vec::new()
        }
    };

    Ok(Json(EventsResponse {
        total: events.len(),
        events,
    }))
}
