//! Trace correlation: attributing RPC calls to the CLI command that caused them
//!
//! Attribution policy, in priority order:
//!
//! 1. An explicit `parent_command_id` on the RPC record is authoritative
//!    (`confidence: exact`), even when the time-window fallback would point
//!    at a different command.
//! 2. Otherwise an RPC call is attributed to a command when its start time
//!    falls inside the command's `[start, start + duration]` window and no
//!    other command's window is strictly narrower and also contains it.
//!    Equal-width containing windows tie-break to the earliest-starting
//!    command. This fallback is approximate (`confidence: heuristic`):
//!    overlapping windows from concurrent CLI sessions can misattribute,
//!    which the tag surfaces rather than masks.
//!
//! A trace is never empty by construction; a command with no attributable
//! RPC calls yields `NoSteps`, not a zero-step trace.

use crate::error::AppError;
use crate::model::{CommandRecord, RecordStatus, RpcRecord};
use crate::store::TelemetryDb;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// How an RPC step was linked to its command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Producer supplied an explicit parent command id
    Exact,
    /// Inferred from time-window containment
    Heuristic,
}

/// One RPC call attributed to a command
#[derive(Debug, Clone, Serialize)]
pub struct TraceStep {
    #[serde(flatten)]
    pub record: RpcRecord,
    pub confidence: Confidence,
}

/// The ordered RPC steps attributed to a single CLI invocation
#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    pub command_id: u64,
    pub command: String,
    pub status: RecordStatus,
    pub timestamp: u64,
    pub duration_ms: u64,
    /// Weakest confidence among the steps
    pub confidence: Confidence,
    pub steps: Vec<TraceStep>,
}

#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error("command {0} not found")]
    UnknownCommand(u64),

    #[error("no rpc calls attributable to command {0}")]
    NoSteps(u64),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<CorrelationError> for AppError {
    fn from(err: CorrelationError) -> Self {
        match err {
            CorrelationError::UnknownCommand(_) | CorrelationError::NoSteps(_) => {
                AppError::NotFound(err.to_string())
            }
            CorrelationError::Storage(e) => AppError::Storage(e.to_string()),
        }
    }
}

/// Builds traces from the record store
pub struct Correlator {
    db: Arc<TelemetryDb>,
    max_overlapping: usize,
}

impl Correlator {
    pub fn new(db: Arc<TelemetryDb>, max_overlapping: usize) -> Self {
        Self { db, max_overlapping }
    }

    /// Correlate the trace for one command
    pub async fn trace(&self, command_id: u64) -> Result<Trace, CorrelationError> {
        let command = self
            .db
            .get_command(command_id)
            .await?
            .ok_or(CorrelationError::UnknownCommand(command_id))?;

        let mut steps: Vec<TraceStep> = self
            .db
            .rpc_linked_to(command_id)
            .await?
            .into_iter()
            .map(|record| TraceStep {
                record,
                confidence: Confidence::Exact,
            })
            .collect();

        let (start, end) = command.window();
        let candidates = self.db.unlinked_rpc_in_window(start, end).await?;

        if !candidates.is_empty() {
            let mut overlapping = self
                .db
                .commands_overlapping(start, end, self.max_overlapping)
                .await?;

            if overlapping.len() == self.max_overlapping {
                tracing::warn!(
                    command_id = command_id,
                    cap = self.max_overlapping,
                    "Overlapping command scan truncated; heuristic attribution may be incomplete"
                );
            }

            // The cap can push the command itself out of the scan.
            if !overlapping.iter().any(|c| c.id == command.id) {
                overlapping.push(command.clone());
            }

            for record in candidates {
                if best_owner(record.timestamp, &overlapping) == Some(command.id) {
                    steps.push(TraceStep {
                        record,
                        confidence: Confidence::Heuristic,
                    });
                }
            }
        }

        if steps.is_empty() {
            return Err(CorrelationError::NoSteps(command_id));
        }

        steps.sort_by_key(|step| (step.record.timestamp, step.record.id));

        let confidence = if steps.iter().all(|s| s.confidence == Confidence::Exact) {
            Confidence::Exact
        } else {
            Confidence::Heuristic
        };

        Ok(Trace {
            command_id: command.id,
            command: command.command,
            status: command.status,
            timestamp: command.timestamp,
            duration_ms: command.duration_ms,
            confidence,
            steps,
        })
    }
}

/// The command whose window contains `timestamp` and is strictly narrower
/// than every other containing window; equal widths tie-break to the
/// earliest start, then the lowest id.
fn best_owner(timestamp: u64, commands: &[CommandRecord]) -> Option<u64> {
    commands
        .iter()
        .filter(|c| {
            let (start, end) = c.window();
            start <= timestamp && timestamp <= end
        })
        .min_by_key(|c| (c.duration_ms, c.timestamp, c.id))
        .map(|c| c.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CommandRecord, RecordStatus};

    const T0: u64 = 1_700_000_000_000;

    async fn create_test_db() -> Arc<TelemetryDb> {
        Arc::new(TelemetryDb::new("sqlite::memory:").await.unwrap())
    }

    fn command(id: u64, timestamp: u64, duration_ms: u64) -> CommandRecord {
        CommandRecord {
            id,
            command: format!("contract deploy --run {}", id),
            parameters: None,
            status: RecordStatus::Success,
            timestamp,
            duration_ms,
            output: String::new(),
            user: None,
        }
    }

    fn rpc(id: u64, timestamp: u64, parent: Option<u64>) -> RpcRecord {
        RpcRecord {
            id,
            rpc_method: "simulateTransaction".to_string(),
            parameters: serde_json::Value::Null,
            status: RecordStatus::Success,
            timestamp,
            duration_ms: 800,
            result: None,
            parent_command_id: parent,
        }
    }

    #[tokio::test]
    async fn test_unknown_command_is_not_found() {
        let db = create_test_db().await;
        let correlator = Correlator::new(db, 256);

        match correlator.trace(42).await {
            Err(CorrelationError::UnknownCommand(42)) => {}
            other => panic!("expected UnknownCommand, got {:?}", other.map(|t| t.command_id)),
        }
    }

    #[tokio::test]
    async fn test_no_overlapping_rpc_is_not_found() {
        let db = create_test_db().await;
        db.insert_command(&command(1, T0, 5000)).await.unwrap();
        // Outside the window entirely.
        db.insert_rpc(&rpc(1, T0 + 60_000, None)).await.unwrap();

        let correlator = Correlator::new(db, 256);
        match correlator.trace(1).await {
            Err(CorrelationError::NoSteps(1)) => {}
            other => panic!("expected NoSteps, got {:?}", other.map(|t| t.command_id)),
        }
    }

    #[tokio::test]
    async fn test_time_containment_attribution_is_heuristic() {
        let db = create_test_db().await;
        db.insert_command(&command(1, T0, 5000)).await.unwrap();
        db.insert_rpc(&rpc(1, T0 + 1000, None)).await.unwrap();

        let correlator = Correlator::new(db, 256);
        let trace = correlator.trace(1).await.unwrap();

        assert_eq!(trace.steps.len(), 1);
        assert_eq!(trace.steps[0].confidence, Confidence::Heuristic);
        assert_eq!(trace.confidence, Confidence::Heuristic);
    }

    #[tokio::test]
    async fn test_explicit_link_wins_over_time_window() {
        let db = create_test_db().await;
        // Command 2's window contains the RPC; the explicit link points at 1.
        db.insert_command(&command(1, T0, 100)).await.unwrap();
        db.insert_command(&command(2, T0 + 500, 5000)).await.unwrap();
        db.insert_rpc(&rpc(1, T0 + 1000, Some(1))).await.unwrap();

        let correlator = Correlator::new(db, 256);

        let trace = correlator.trace(1).await.unwrap();
        assert_eq!(trace.steps.len(), 1);
        assert_eq!(trace.steps[0].confidence, Confidence::Exact);
        assert_eq!(trace.confidence, Confidence::Exact);

        // And command 2 does not pick it up heuristically.
        match correlator.trace(2).await {
            Err(CorrelationError::NoSteps(2)) => {}
            other => panic!("expected NoSteps, got {:?}", other.map(|t| t.command_id)),
        }
    }

    #[tokio::test]
    async fn test_narrower_window_wins() {
        let db = create_test_db().await;
        // Both windows contain the RPC; command 2's is strictly narrower.
        db.insert_command(&command(1, T0, 10_000)).await.unwrap();
        db.insert_command(&command(2, T0 + 500, 2000)).await.unwrap();
        db.insert_rpc(&rpc(1, T0 + 1000, None)).await.unwrap();

        let correlator = Correlator::new(db, 256);

        let trace = correlator.trace(2).await.unwrap();
        assert_eq!(trace.steps.len(), 1);
        assert_eq!(trace.steps[0].record.id, 1);

        match correlator.trace(1).await {
            Err(CorrelationError::NoSteps(1)) => {}
            other => panic!("expected NoSteps, got {:?}", other.map(|t| t.command_id)),
        }
    }

    #[tokio::test]
    async fn test_equal_windows_earliest_start_wins() {
        let db = create_test_db().await;
        db.insert_command(&command(1, T0, 5000)).await.unwrap();
        db.insert_command(&command(2, T0 + 1000, 5000)).await.unwrap();
        db.insert_rpc(&rpc(1, T0 + 2000, None)).await.unwrap();

        let correlator = Correlator::new(db, 256);

        let trace = correlator.trace(1).await.unwrap();
        assert_eq!(trace.steps.len(), 1);

        match correlator.trace(2).await {
            Err(CorrelationError::NoSteps(2)) => {}
            other => panic!("expected NoSteps, got {:?}", other.map(|t| t.command_id)),
        }
    }

    #[tokio::test]
    async fn test_steps_ordered_by_start_time() {
        let db = create_test_db().await;
        db.insert_command(&command(1, T0, 5000)).await.unwrap();
        db.insert_rpc(&rpc(3, T0 + 3000, None)).await.unwrap();
        db.insert_rpc(&rpc(2, T0 + 2000, Some(1))).await.unwrap();
        db.insert_rpc(&rpc(1, T0 + 1000, None)).await.unwrap();

        let correlator = Correlator::new(db, 256);
        let trace = correlator.trace(1).await.unwrap();

        let times: Vec<u64> = trace.steps.iter().map(|s| s.record.timestamp).collect();
        assert_eq!(times, vec![T0 + 1000, T0 + 2000, T0 + 3000]);

        // Mixed exact and heuristic steps degrade the trace confidence.
        assert_eq!(trace.steps[1].confidence, Confidence::Exact);
        assert_eq!(trace.confidence, Confidence::Heuristic);
    }

    #[tokio::test]
    async fn test_truncated_scan_still_considers_own_command() {
        let db = create_test_db().await;
        // Many wide commands ahead of the narrow one in scan order.
        for id in 1..=10 {
            db.insert_command(&command(id, T0, 60_000)).await.unwrap();
        }
        db.insert_command(&command(11, T0 + 1000, 1000)).await.unwrap();
        db.insert_rpc(&rpc(1, T0 + 1500, None)).await.unwrap();

        let correlator = Correlator::new(db, 4);
        let trace = correlator.trace(11).await.unwrap();
        assert_eq!(trace.steps.len(), 1);
    }
}
