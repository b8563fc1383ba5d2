pub mod health;
pub mod ingest_api;
pub mod metrics_handler;
pub mod query_api;

use crate::aggregate::StreamStats;
use crate::config::Config;
use crate::correlate::Correlator;
use crate::store::{EventWriter, TelemetryDb};
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Shared state for the HTTP API
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ArcSwap<Config>>,
    pub db: Arc<TelemetryDb>,
    pub command_stats: Arc<StreamStats>,
    pub rpc_stats: Arc<StreamStats>,
    pub events: EventWriter,
    pub correlator: Arc<Correlator>,
}
