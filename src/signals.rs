use anyhow::Result;
use arc_swap::ArcSwap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use crate::aggregate::StreamStats;
use crate::config::Config;

/// Shutdown signal types
#[derive(Debug, Clone, Copy)]
pub enum ShutdownSignal {
    /// Graceful shutdown (drain connections, clean up)
    Graceful,
}

/// Setup signal handlers for the server
///
/// Returns a broadcast sender for shutdown signals and a join handle for
/// the signal task.
///
/// Handles:
/// - SIGTERM/SIGINT: Graceful shutdown
/// - SIGHUP: Configuration reload
#[cfg(unix)]
pub fn setup_signal_handlers(
    config: Arc<ArcSwap<Config>>,
    config_path: PathBuf,
    command_stats: Arc<StreamStats>,
    rpc_stats: Arc<StreamStats>,
) -> (
    broadcast::Sender<ShutdownSignal>,
    tokio::task::JoinHandle<()>,
) {
    let (shutdown_tx, _) = broadcast::channel(16);
    let tx_clone = shutdown_tx.clone();

    let handle = tokio::spawn(async move {
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to setup SIGINT handler");
        let mut sighup = signal(SignalKind::hangup()).expect("Failed to setup SIGHUP handler");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("SIGTERM received, initiating graceful shutdown");
                    let _ = tx_clone.send(ShutdownSignal::Graceful);
                    break;
                }
                _ = sigint.recv() => {
                    info!("SIGINT received, initiating graceful shutdown");
                    let _ = tx_clone.send(ShutdownSignal::Graceful);
                    break;
                }
                _ = sighup.recv() => {
                    info!("SIGHUP received, reloading configuration");
                    if let Err(e) = reload_config(&config, &config_path, &command_stats, &rpc_stats) {
                        error!("Failed to reload configuration: {}", e);
                    } else {
                        info!("Configuration reloaded successfully");
                    }
                }
            }
        }
    });

    (shutdown_tx, handle)
}

/// Windows placeholder - only Ctrl+C is supported
#[cfg(not(unix))]
pub fn setup_signal_handlers(
    _config: Arc<ArcSwap<Config>>,
    _config_path: PathBuf,
    _command_stats: Arc<StreamStats>,
    _rpc_stats: Arc<StreamStats>,
) -> (
    broadcast::Sender<ShutdownSignal>,
    tokio::task::JoinHandle<()>,
) {
    let (shutdown_tx, _) = broadcast::channel(16);
    let tx_clone = shutdown_tx.clone();

    let handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received, initiating shutdown");
                let _ = tx_clone.send(ShutdownSignal::Graceful);
            }
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
        }
    });

    (shutdown_tx, handle)
}

/// Reload configuration atomically
///
/// Loads and validates the new configuration, applies the aggregator
/// window to the live statistics, and swaps the shared config. Server
/// address and database path changes require a restart and are ignored
/// with a warning. If validation fails, the old configuration stays.
#[cfg(unix)]
fn reload_config(
    config: &Arc<ArcSwap<Config>>,
    config_path: &PathBuf,
    command_stats: &Arc<StreamStats>,
    rpc_stats: &Arc<StreamStats>,
) -> Result<()> {
    info!("Loading new configuration...");

    let new_config = crate::config::load_config(config_path)?;

    let old = config.load();
    if new_config.server.host != old.server.host || new_config.server.port != old.server.port {
        tracing::warn!("server.host/port changes require a restart; keeping current bind address");
    }
    if new_config.storage.database_path != old.storage.database_path {
        tracing::warn!("storage.database_path changes require a restart; keeping current store");
    }

    let window = std::time::Duration::from_secs(new_config.aggregator.window_hours * 3600);
    command_stats.set_window(window);
    rpc_stats.set_window(window);

    info!(
        window_hours = new_config.aggregator.window_hours,
        "New configuration loaded"
    );

    config.store(Arc::new(new_config));

    Ok(())
}
