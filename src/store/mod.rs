//! Append-only record store
//!
//! SQLite-backed storage for the three telemetry streams (CLI commands,
//! RPC calls, contract events), with:
//! - Atomic check-and-insert on producer identifiers (idempotent ingest)
//! - WAL mode for concurrent reads during ingestion
//! - Batched writes for the high-volume event stream
//! - TTL-based retention cleanup

pub mod cleanup;
pub mod database;
pub mod query;
pub mod writer;

pub use cleanup::{run_cleanup_now, spawn_cleanup_task, CleanupConfig};
pub use database::{CleanupStats, StoreStats, TelemetryDb};
pub use query::{CommandFilter, ContractMetrics, RpcFilter};
pub use writer::EventWriter;
