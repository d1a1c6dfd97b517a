//! Periodic background cleanup.
//!
//! Every interval the sweep removes expired cache entries and forgets rate
//! limit identities that have been idle for two minutes.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::state::AppState;

/// Spawn the sweep loop. The first sweep runs one `period` after start.
pub fn spawn_maintenance(state: Arc<AppState>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(Duration::from_secs(1)));
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let report = state.gateway.sweep();
            if report.expired_entries > 0 || report.idle_clients > 0 {
                info!(
                    expired_entries = report.expired_entries,
                    idle_clients = report.idle_clients,
                    "maintenance sweep"
                );
            } else {
                debug!("maintenance sweep: nothing to remove");
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use simgate_core::cache::CacheKey;
    use simgate_core::config::SimgateConfig;
    use simgate_core::monitor::Monitor;
    use simgate_core::simulator::SimulatorRegistry;
    use simgate_types::ParameterSet;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_expired_entries() {
        let mut config = SimgateConfig::default();
        config.cache.ttl_seconds = 10;
        config.maintenance.cleanup_interval_seconds = 30;
        let state = Arc::new(AppState::new(
            &config,
            SimulatorRegistry::new(),
            Monitor::new(8, None),
        ));
        state.gateway.cache().set(
            CacheKey::new("rc_filter", &ParameterSet::new()),
            Arc::new(serde_json::json!({})),
        );

        let task = spawn_maintenance(Arc::clone(&state), config.maintenance.interval());
        // Let the loop start its ticker before moving the clock.
        tokio::task::yield_now().await;
        assert_eq!(state.gateway.cache().len(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        assert!(state.gateway.cache().is_empty());
        task.abort();
    }
}
