//! Ingest HTTP API handlers
//!
//! Producers report completed CLI commands, RPC calls, and contract events
//! here. Command and RPC ingest acks only after a durable insert and is
//! idempotent on the record identifier; event ingest is fire-and-forget
//! through the batch writer.

use super::AppState;
use crate::error::AppError;
use crate::metrics;
use crate::model::{current_millis, CommandRecord, ContractEvent, RpcRecord};
use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

/// Response for command/RPC ingest
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub id: u64,
    /// True when the identifier was already stored; the submission was a no-op
    pub duplicate: bool,
}

/// Response for event ingest
#[derive(Debug, Serialize)]
pub struct EventsAccepted {
    pub accepted: usize,
}

/// One event or a batch; relays post both shapes
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EventSubmission {
    One(Box<ContractEvent>),
    Many(Vec<ContractEvent>),
}

/// POST /api/cli-logs - Ingest a completed CLI command record
pub async fn ingest_command(
    State(state): State<AppState>,
    Json(record): Json<CommandRecord>,
) -> Result<Json<IngestResponse>, AppError> {
    let start = Instant::now();

    if let Err(e) = record.validate() {
        metrics::record_rejected("commands");
        return Err(e.into());
    }

    let inserted = state
        .db
        .insert_command(&record)
        .await
        .map_err(|e| AppError::Storage(e.to_string()))?;

    if inserted {
        state.command_stats.record(
            record.status,
            record.timestamp,
            record.duration_ms,
            current_millis(),
        );
        metrics::record_ingested("commands", record.status.as_str());

        tracing::debug!(
            ingest_id = %Uuid::new_v4(),
            record_id = record.id,
            command = %record.command,
            status = record.status.as_str(),
            duration_ms = record.duration_ms,
            "Command record ingested"
        );
    } else {
        metrics::record_duplicate("commands");
    }

    metrics::record_ingest_duration("commands", start.elapsed());

    Ok(Json(IngestResponse {
        id: record.id,
        duplicate: !inserted,
    }))
}

/// POST /api/rpc-logs - Ingest a completed RPC call record
pub async fn ingest_rpc(
    State(state): State<AppState>,
    Json(record): Json<RpcRecord>,
) -> Result<Json<IngestResponse>, AppError> {
    let start = Instant::now();

    if let Err(e) = record.validate() {
        metrics::record_rejected("rpc_calls");
        return Err(e.into());
    }

    let inserted = state
        .db
        .insert_rpc(&record)
        .await
        .map_err(|e| AppError::Storage(e.to_string()))?;

    if inserted {
        state.rpc_stats.record(
            record.status,
            record.timestamp,
            record.duration_ms,
            current_millis(),
        );
        metrics::record_ingested("rpc_calls", record.status.as_str());

        tracing::debug!(
            ingest_id = %Uuid::new_v4(),
            record_id = record.id,
            rpc_method = %record.rpc_method,
            status = record.status.as_str(),
            parent_command_id = ?record.parent_command_id,
            "RPC record ingested"
        );
    } else {
        metrics::record_duplicate("rpc_calls");
    }

    metrics::record_ingest_duration("rpc_calls", start.elapsed());

    Ok(Json(IngestResponse {
        id: record.id,
        duplicate: !inserted,
    }))
}

/// POST /api/events - Ingest contract events (single or batch)
///
/// The whole submission is validated before anything is enqueued; a batch
/// with one malformed event is rejected intact so the producer can fix and
/// resend it (resends are idempotent at write time).
pub async fn ingest_events(
    State(state): State<AppState>,
    Json(submission): Json<EventSubmission>,
) -> Result<Json<EventsAccepted>, AppError> {
    let events = match submission {
        EventSubmission::One(event) => vec![*event],
        EventSubmission::Many(events) => events,
    };

    for event in &events {
        if let Err(e) = event.validate() {
            metrics::record_rejected("events");
            return Err(e.into());
        }
    }

    let accepted = events.len();
    for event in events {
        state.events.write(event);
    }

    metrics::record_ingested("events", "accepted");

    Ok(Json(EventsAccepted { accepted }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_submission_accepts_both_shapes() {
        let one: EventSubmission = serde_json::from_str(
            r#"{"id":1,"contract_id":"CCR6","event_type":"transfer","timestamp":1,"data":{}}"#,
        )
        .unwrap();
        assert!(matches!(one, EventSubmission::One(_)));

        let many: EventSubmission = serde_json::from_str(
            r#"[{"id":1,"contract_id":"CCR6","event_type":"transfer","timestamp":1,"data":{}}]"#,
        )
        .unwrap();
        match many {
            EventSubmission::Many(events) => assert_eq!(events.len(), 1),
            _ => panic!("expected batch"),
        }
    }
}
