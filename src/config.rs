use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub aggregator: AggregatorConfig,

    #[serde(default)]
    pub correlator: CorrelatorConfig,

    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// SQLite database path (default: "./data/chaintrace.db")
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Hour of day (0-23) at which retention cleanup runs
    #[serde(default = "default_cleanup_hour")]
    pub cleanup_hour: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            cleanup_hour: default_cleanup_hour(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AggregatorConfig {
    /// Trailing window for rolling statistics, in hours
    #[serde(default = "default_window_hours")]
    pub window_hours: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorrelatorConfig {
    /// Cap on overlapping command windows examined during heuristic
    /// attribution. Guards the windowed scan against pathological overlap.
    #[serde(default = "default_max_overlapping_commands")]
    pub max_overlapping_commands: usize,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            max_overlapping_commands: default_max_overlapping_commands(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    /// Contract events per write batch
    #[serde(default = "default_event_batch_size")]
    pub event_batch_size: usize,

    /// Max time before a partial event batch flushes, in milliseconds
    #[serde(default = "default_event_flush_interval_ms")]
    pub event_flush_interval_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            event_batch_size: default_event_batch_size(),
            event_flush_interval_ms: default_event_flush_interval_ms(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database_path() -> String {
    "./data/chaintrace.db".to_string()
}

fn default_cleanup_hour() -> u32 {
    3
}

fn default_window_hours() -> u64 {
    24
}

fn default_max_overlapping_commands() -> usize {
    256
}

fn default_event_batch_size() -> usize {
    100
}

fn default_event_flush_interval_ms() -> u64 {
    100
}

/// Load configuration from a TOML file plus CHAINTRACE__ environment
/// overrides (e.g., CHAINTRACE__SERVER__PORT=9000).
///
/// A missing file is not an error; defaults apply.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("CHAINTRACE").separator("__"))
        .build()?;

    let cfg: Config = builder.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.aggregator.window_hours == 0 {
        anyhow::bail!("aggregator.window_hours must be at least 1");
    }

    if cfg.storage.cleanup_hour > 23 {
        anyhow::bail!(
            "storage.cleanup_hour must be 0-23, got {}",
            cfg.storage.cleanup_hour
        );
    }

    if cfg.correlator.max_overlapping_commands == 0 {
        anyhow::bail!("correlator.max_overlapping_commands must be at least 1");
    }

    if cfg.ingest.event_batch_size == 0 {
        anyhow::bail!("ingest.event_batch_size must be at least 1");
    }

    if cfg.server.host.parse::<std::net::IpAddr>().is_err() {
        anyhow::bail!("server.host is not a valid IP address: {}", cfg.server.host);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            aggregator: AggregatorConfig::default(),
            correlator: CorrelatorConfig::default(),
            ingest: IngestConfig::default(),
        };

        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.aggregator.window_hours, 24);
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut cfg = Config {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            aggregator: AggregatorConfig::default(),
            correlator: CorrelatorConfig::default(),
            ingest: IngestConfig::default(),
        };
        cfg.aggregator.window_hours = 0;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_bad_host_rejected() {
        let mut cfg = Config {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            aggregator: AggregatorConfig::default(),
            correlator: CorrelatorConfig::default(),
            ingest: IngestConfig::default(),
        };
        cfg.server.host = "not-an-ip".to_string();
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = load_config(Path::new("/nonexistent/chaintrace.toml")).unwrap();
        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.storage.cleanup_hour, 3);
    }
}
