//! Per-request observability record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable record describing one completed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMetric {
    /// Request path.
    pub endpoint: String,
    /// HTTP method (or `WS` for push messages).
    pub method: String,
    /// Response status code.
    pub status: u16,
    /// Wall-clock handling time in milliseconds.
    pub duration_ms: f64,
    /// Client identity the request was admitted under.
    pub client_identity: String,
    /// When the request completed.
    pub timestamp: DateTime<Utc>,
    /// Whether the response was served from the result cache.
    pub cache_hit: bool,
    /// Simulation the request targeted, if any.
    pub simulation_id: Option<String>,
}

impl RequestMetric {
    /// Create a metric stamped with the current time.
    pub fn new(
        endpoint: impl Into<String>,
        method: impl Into<String>,
        status: u16,
        duration_ms: f64,
        client_identity: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: method.into(),
            status,
            duration_ms,
            client_identity: client_identity.into(),
            timestamp: Utc::now(),
            cache_hit: false,
            simulation_id: None,
        }
    }

    /// Attach the simulation this request targeted.
    #[must_use]
    pub fn with_simulation(mut self, simulation_id: impl Into<String>, cache_hit: bool) -> Self {
        self.simulation_id = Some(simulation_id.into());
        self.cache_hit = cache_hit;
        self
    }

    /// Whether the status denotes a failure.
    pub const fn is_error(&self) -> bool {
        self.status >= 400
    }
}
