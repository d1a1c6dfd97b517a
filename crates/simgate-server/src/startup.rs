//! Service wiring for the daemon.
//!
//! [`start_services`] builds the shared state from configuration, opens
//! the request log, and spawns the maintenance loop. [`Services::shutdown`]
//! tears them down in reverse: subscriptions closed, sweep stopped, request
//! log flushed.
//!
//! # Usage
//!
//! ```rust,ignore
//! use simgate_server::startup::start_services;
//!
//! let services = start_services(&config, simgate_sims::registry())?;
//! start_server(&server_config, services.state(), ctrl_c()).await?;
//! services.shutdown().await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use simgate_core::config::SimgateConfig;
use simgate_core::monitor::{Monitor, RequestLog};
use simgate_core::simulator::SimulatorRegistry;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::maintenance::spawn_maintenance;
use crate::state::AppState;

/// How long shutdown waits for the request log to drain.
const LOG_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur while starting services.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The request log directory or file could not be opened.
    #[error("failed to open request log in {dir}: {source}")]
    RequestLog {
        /// Configured log directory.
        dir: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// Running background services and the state they share.
pub struct Services {
    state: Arc<AppState>,
    maintenance: JoinHandle<()>,
    log_writer: Option<JoinHandle<()>>,
}

/// Build the state and start background tasks. Must be called inside a
/// tokio runtime.
pub fn start_services(
    config: &SimgateConfig,
    registry: SimulatorRegistry,
) -> Result<Services, StartupError> {
    let (log, log_writer) = if config.monitor.request_log {
        let (log, writer) =
            RequestLog::spawn(&config.monitor.log_dir).map_err(|source| {
                StartupError::RequestLog {
                    dir: config.monitor.log_dir.display().to_string(),
                    source,
                }
            })?;
        (Some(log), Some(writer))
    } else {
        (None, None)
    };

    let monitor = Monitor::new(config.monitor.samples_per_endpoint, log);
    let simulators = registry.len();
    let state = Arc::new(AppState::new(config, registry, monitor));
    let maintenance = spawn_maintenance(Arc::clone(&state), config.maintenance.interval());

    info!(
        simulators,
        cache_size = config.cache.max_size,
        cache_ttl_secs = config.cache.ttl_seconds,
        executors = config.executor.instances,
        rate_limit = config.rate_limit.enabled,
        "services started"
    );

    Ok(Services {
        state,
        maintenance,
        log_writer,
    })
}

impl Services {
    /// Shared state for the router.
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Close subscriptions, stop the sweep, and flush the request log.
    pub async fn shutdown(self) {
        self.state.gateway.close_connections();
        self.maintenance.abort();
        self.state.gateway.close_log();
        if let Some(writer) = self.log_writer {
            if tokio::time::timeout(LOG_FLUSH_TIMEOUT, writer).await.is_err() {
                warn!("request log did not flush before shutdown");
            }
        }
        info!("services stopped");
    }
}
