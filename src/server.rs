use anyhow::Result;
use arc_swap::ArcSwap;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    aggregate::StreamStats,
    config::Config,
    correlate::Correlator,
    handlers::{self, AppState},
    metrics,
    model::current_millis,
    signals::setup_signal_handlers,
    store::{spawn_cleanup_task, CleanupConfig, EventWriter, TelemetryDb},
};

/// Start the collector service
///
/// This function:
/// 1. Initializes metrics
/// 2. Opens the record store and rebuilds rolling statistics from it
/// 3. Sets up signal handlers for graceful shutdown and config reload
/// 4. Serves the HTTP API until shutdown
pub async fn start_server(config: Config, config_path: PathBuf) -> Result<()> {
    info!("Initializing Prometheus metrics...");
    let metrics_handle = Arc::new(metrics::init_metrics());

    let state = build_state(&config, None).await?;

    // Wrap config in ArcSwap for atomic reload support
    let config_swap = state.config.clone();

    spawn_cleanup_task(
        state.db.clone(),
        CleanupConfig {
            cleanup_hour: config.storage.cleanup_hour,
            ..Default::default()
        },
    );

    // Setup signal handlers (SIGTERM, SIGINT for shutdown; SIGHUP for reload)
    let (shutdown_tx, signal_handle) = setup_signal_handlers(
        config_swap.clone(),
        config_path,
        state.command_stats.clone(),
        state.rpc_stats.clone(),
    );
    let mut shutdown_rx = shutdown_tx.subscribe();

    let app = create_router(state, metrics_handle);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting chaintrace collector on {}", addr);
    info!(
        "Configuration: {}h window, database {}",
        config.aggregator.window_hours, config.storage.database_path
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Shutdown signal received, draining connections...");
        })
        .await?;

    signal_handle.await?;
    info!("Server stopped gracefully");

    Ok(())
}

/// Assemble the shared application state
///
/// `database_url` overrides the configured path (used by tests with
/// "sqlite::memory:"). Rolling statistics are rebuilt by replaying the
/// retention window from the store.
pub async fn build_state(config: &Config, database_url: Option<&str>) -> Result<AppState> {
    let db_url = match database_url {
        Some(url) => url.to_string(),
        None => {
            if let Some(parent) = std::path::Path::new(&config.storage.database_path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            format!("sqlite:{}", config.storage.database_path)
        }
    };

    let db = Arc::new(TelemetryDb::new(&db_url).await?);

    let window = Duration::from_secs(config.aggregator.window_hours * 3600);
    let command_stats = Arc::new(StreamStats::new(window));
    let rpc_stats = Arc::new(StreamStats::new(window));

    hydrate_stats(&db, &command_stats, &rpc_stats).await?;

    let events = EventWriter::spawn(
        db.clone(),
        config.ingest.event_batch_size,
        Duration::from_millis(config.ingest.event_flush_interval_ms),
    );

    let correlator = Arc::new(Correlator::new(
        db.clone(),
        config.correlator.max_overlapping_commands,
    ));

    Ok(AppState {
        config: Arc::new(ArcSwap::from_pointee(config.clone())),
        db,
        command_stats,
        rpc_stats,
        events,
        correlator,
    })
}

/// Replay the window from the store so restarts don't zero the summary
async fn hydrate_stats(
    db: &TelemetryDb,
    command_stats: &StreamStats,
    rpc_stats: &StreamStats,
) -> Result<()> {
    let now = current_millis();
    let since = now.saturating_sub(command_stats.window().as_millis() as u64);

    let commands = db.command_timings_since(since).await?;
    for (status, timestamp, duration_ms) in &commands {
        command_stats.record(*status, *timestamp, *duration_ms, now);
    }

    let rpc_calls = db.rpc_timings_since(since).await?;
    for (status, timestamp, duration_ms) in &rpc_calls {
        rpc_stats.record(*status, *timestamp, *duration_ms, now);
    }

    info!(
        commands = commands.len(),
        rpc_calls = rpc_calls.len(),
        "Rebuilt rolling statistics from store"
    );

    Ok(())
}

/// Create the Axum router with all routes and middleware
pub fn create_router(
    state: AppState,
    metrics_handle: Arc<metrics_exporter_prometheus::PrometheusHandle>,
) -> Router {
    let api_routes = Router::new()
        .route(
            "/api/cli-logs",
            post(handlers::ingest_api::ingest_command).get(handlers::query_api::list_commands),
        )
        .route(
            "/api/rpc-logs",
            post(handlers::ingest_api::ingest_rpc).get(handlers::query_api::list_rpc_calls),
        )
        .route("/api/events", post(handlers::ingest_api::ingest_events))
        .route("/api/events/live", get(handlers::query_api::get_live_events))
        .route("/api/trace/:command_id", get(handlers::query_api::get_trace))
        .route(
            "/api/analytics/summary",
            get(handlers::query_api::get_summary),
        )
        .route(
            "/api/contracts/metrics",
            get(handlers::query_api::get_contract_metrics),
        )
        .route("/ready", get(handlers::health::readiness_check))
        .with_state(state);

    Router::new()
        // Public endpoints outside the API state
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics_handler::metrics))
        .with_state(metrics_handle)
        .merge(api_routes)
        // Limit request body size to keep batch submissions bounded
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CommandRecord, RecordStatus};

    #[tokio::test]
    async fn test_create_router() {
        let config = Config {
            server: Default::default(),
            storage: Default::default(),
            aggregator: Default::default(),
            correlator: Default::default(),
            ingest: Default::default(),
        };

        let state = build_state(&config, Some("sqlite::memory:")).await.unwrap();

        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let metrics_handle = Arc::new(recorder.handle());

        let _app = create_router(state, metrics_handle);
        // Router created successfully - no panic
    }

    #[tokio::test]
    async fn test_hydration_replays_window() {
        let config = Config {
            server: Default::default(),
            storage: Default::default(),
            aggregator: Default::default(),
            correlator: Default::default(),
            ingest: Default::default(),
        };

        let db = Arc::new(TelemetryDb::new("sqlite::memory:").await.unwrap());
        db.insert_command(&CommandRecord {
            id: 1,
            command: "contract deploy".to_string(),
            parameters: None,
            status: RecordStatus::Success,
            timestamp: current_millis() - 1000,
            duration_ms: 10,
            output: String::new(),
            user: None,
        })
        .await
        .unwrap();

        let window = Duration::from_secs(config.aggregator.window_hours * 3600);
        let command_stats = Arc::new(StreamStats::new(window));
        let rpc_stats = Arc::new(StreamStats::new(window));

        hydrate_stats(&db, &command_stats, &rpc_stats).await.unwrap();

        assert_eq!(command_stats.snapshot(current_millis()).total_count, 1);
    }
}
