//! Async batch writer for the contract event stream
//!
//! Events are fire-and-forget and high-volume, so they are not written on
//! the request path: handlers push into a channel and a background task
//! batches inserts (size or time based flush). CLI/RPC ingest does not go
//! through here; those streams ack only after a durable insert.

use super::database::TelemetryDb;
use crate::model::ContractEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Handle for non-blocking contract event writes
///
/// The actual inserts happen in a background task.
#[derive(Clone)]
pub struct EventWriter {
    sender: mpsc::UnboundedSender<ContractEvent>,
}

impl EventWriter {
    /// Spawn the background writer task
    ///
    /// # Arguments
    ///
    /// * `db` - Database handle
    /// * `batch_size` - Max events per batch
    /// * `flush_interval` - Max time before a partial batch flushes
    pub fn spawn(db: Arc<TelemetryDb>, batch_size: usize, flush_interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            writer_task(db, rx, batch_size, flush_interval).await;
        });

        Self { sender: tx }
    }

    /// Enqueue one event (non-blocking). Events enqueued after shutdown
    /// begins are dropped.
    pub fn write(&self, event: ContractEvent) {
        let _ = self.sender.send(event);
    }
}

async fn writer_task(
    db: Arc<TelemetryDb>,
    mut rx: mpsc::UnboundedReceiver<ContractEvent>,
    batch_size: usize,
    flush_interval: Duration,
) {
    let mut batch: Vec<ContractEvent> = Vec::with_capacity(batch_size);

    let mut flush_timer = tokio::time::interval(flush_interval);
    flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            maybe_event = rx.recv() => {
                match maybe_event {
                    Some(event) => {
                        batch.push(event);
                        if batch.len() >= batch_size {
                            flush(&db, &mut batch).await;
                        }
                    }
                    // Channel closed: flush remaining and exit.
                    None => {
                        flush(&db, &mut batch).await;
                        break;
                    }
                }
            }

            _ = flush_timer.tick() => {
                flush(&db, &mut batch).await;
            }
        }
    }

    tracing::info!("Contract event writer shutting down");
}

async fn flush(db: &TelemetryDb, batch: &mut Vec<ContractEvent>) {
    if batch.is_empty() {
        return;
    }

    let count = batch.len();
    let start = std::time::Instant::now();

    match db.insert_events_batch(batch).await {
        Ok(_) => {
            tracing::debug!(
                count = count,
                duration_ms = start.elapsed().as_millis() as u64,
                "Flushed event batch"
            );
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                count = count,
                "Failed to flush event batch"
            );
        }
    }

    batch.clear();
}
