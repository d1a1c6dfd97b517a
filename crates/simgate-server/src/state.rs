//! Shared application state for the gateway server.
//!
//! [`AppState`] wraps the [`Gateway`] together with the handful of
//! settings the HTTP layer needs directly. It is wrapped in an [`Arc`]
//! and injected via Axum's `State` extractor.
//!
//! [`Arc`]: std::sync::Arc

use simgate_core::config::{SimgateConfig, WebSocketConfig};
use simgate_core::monitor::Monitor;
use simgate_core::simulator::SimulatorRegistry;

use crate::gateway::Gateway;

/// Shared state for the Axum application.
pub struct AppState {
    /// The serving pipeline.
    pub gateway: Gateway,
    /// Push channel timing.
    pub websocket: WebSocketConfig,
    /// Whether the first `X-Forwarded-For` hop identifies the client.
    pub trust_forwarded_for: bool,
}

impl AppState {
    /// Build the state for `config`, serving `registry`.
    pub fn new(config: &SimgateConfig, registry: SimulatorRegistry, monitor: Monitor) -> Self {
        Self {
            gateway: Gateway::new(config, registry, monitor),
            websocket: config.websocket.clone(),
            trust_forwarded_for: config.server.trust_forwarded_for,
        }
    }
}
