//! Simgate server binary.
//!
//! Loads configuration, registers the bundled simulators, starts the
//! background services, and serves the gateway API until Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `simgate.yaml` (or `$SIMGATE_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Register simulators
//! 4. Start services (request log, monitor, maintenance sweep)
//! 5. Serve HTTP and `WebSocket` until shutdown
//! 6. Close subscriptions and flush the request log

mod error;

use std::path::{Path, PathBuf};

use simgate_core::config::{LoggingConfig, SimgateConfig};
use simgate_server::server::{ServerConfig, ctrl_c, start_server};
use simgate_server::startup::start_services;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::DaemonError;

/// Config file used when `SIMGATE_CONFIG` is unset.
const DEFAULT_CONFIG_PATH: &str = "simgate.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, startup, or the server fails.
#[tokio::main]
async fn main() -> Result<(), DaemonError> {
    let path = config_path();
    let loaded = load_config(&path)?;
    init_logging(&loaded.config.logging);

    info!(version = env!("CARGO_PKG_VERSION"), "simgate starting");
    if loaded.from_file {
        info!(path = %path.display(), "Configuration loaded");
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
    }

    let config = loaded.config;
    let registry = simgate_sims::registry();
    let services = start_services(&config, registry)?;

    let server_config = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };
    let served = start_server(&server_config, services.state(), ctrl_c()).await;

    services.shutdown().await;
    served?;

    info!("simgate stopped");
    Ok(())
}

/// A loaded configuration and whether it came from a file.
struct Loaded {
    config: SimgateConfig,
    from_file: bool,
}

fn config_path() -> PathBuf {
    std::env::var_os("SIMGATE_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Load configuration from `path`, or defaults (with environment
/// overrides) when the file does not exist.
fn load_config(path: &Path) -> Result<Loaded, DaemonError> {
    if path.exists() {
        let config = SimgateConfig::from_file(path).map_err(|source| DaemonError::Config {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Loaded {
            config,
            from_file: true,
        })
    } else {
        let mut config = SimgateConfig::default();
        config.apply_env_overrides();
        Ok(Loaded {
            config,
            from_file: false,
        })
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config(&dir.path().join("absent.yaml")).unwrap();
        assert!(!loaded.from_file);
        assert_eq!(loaded.config.cache.max_size, SimgateConfig::default().cache.max_size);
    }

    #[test]
    fn file_values_are_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simgate.yaml");
        std::fs::write(&path, "cache:\n  max_size: 7\nlogging:\n  json: true\n").unwrap();

        let loaded = load_config(&path).unwrap();
        assert!(loaded.from_file);
        assert_eq!(loaded.config.cache.max_size, 7);
        assert!(loaded.config.logging.json);
    }

    #[test]
    fn malformed_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "cache: [unterminated").unwrap();

        let err = load_config(&path).err().unwrap();
        assert!(err.to_string().contains("broken.yaml"));
    }
}
