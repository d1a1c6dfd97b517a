//! The request pipeline that composes every serving component.
//!
//! A simulation request flows through admission control, simulator lookup,
//! parameter validation, the result cache, bounded execution, and
//! serialization, and the fresh result is stored back in the cache. State
//! changes are pushed to the simulation's live subscribers. The
//! [`Gateway`] owns one instance of each component; nothing here is
//! process-global.

use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value as Json;
use simgate_core::cache::{CacheKey, ResultCache};
use simgate_core::config::SimgateConfig;
use simgate_core::connections::ConnectionRegistry;
use simgate_core::executor::ExecutorPool;
use simgate_core::monitor::Monitor;
use simgate_core::rate_limiter::RateLimiter;
use simgate_core::serializer::serialize;
use simgate_core::simulator::{SimulatorError, SimulatorHandle, SimulatorRegistry, StepAction};
use simgate_types::{ConnectionId, ExecutionResult, FrameKind, ParameterSet, PushFrame};
use tracing::{debug, error, info, warn};

use crate::error::GatewayError;

/// A one-shot action a client can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Initialize the simulator and return its state.
    Init,
    /// Recompute with new parameters.
    Update,
    /// Recompute with the given parameters.
    Run,
    /// Recompute with default parameters.
    Reset,
    /// Advance a time-stepped simulator.
    Advance,
    /// Step one frame forward.
    StepForward,
    /// Step one frame backward.
    StepBackward,
}

impl Action {
    /// The stepping direction, for time-stepped actions.
    pub const fn step(self) -> Option<StepAction> {
        match self {
            Self::Advance => Some(StepAction::Advance),
            Self::StepForward => Some(StepAction::Forward),
            Self::StepBackward => Some(StepAction::Backward),
            Self::Init | Self::Update | Self::Run | Self::Reset => None,
        }
    }

    /// Whether subscribers should see the resulting state.
    pub const fn publishes(self) -> bool {
        !matches!(self, Self::Init)
    }
}

impl FromStr for Action {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "init" => Ok(Self::Init),
            "update" => Ok(Self::Update),
            "run" => Ok(Self::Run),
            "reset" => Ok(Self::Reset),
            "advance" => Ok(Self::Advance),
            "step_forward" => Ok(Self::StepForward),
            "step_backward" => Ok(Self::StepBackward),
            _ => Err(GatewayError::UnknownAction(s.to_owned())),
        }
    }
}

/// A successfully computed or cached state.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Serialized simulation state.
    pub data: Arc<Json>,
    /// Whether `data` came from the result cache.
    pub cache_hit: bool,
}

/// Counts from one maintenance sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    /// Expired cache entries removed.
    pub expired_entries: usize,
    /// Idle rate-limit identities forgotten.
    pub idle_clients: usize,
}

/// Composition root of the serving components.
pub struct Gateway {
    registry: SimulatorRegistry,
    cache: ResultCache<Arc<Json>>,
    limiter: RateLimiter,
    rate_limit_enabled: bool,
    executors: ExecutorPool,
    connections: ConnectionRegistry,
    monitor: Monitor,
}

impl Gateway {
    /// Build every component from `config`, serving the simulators in
    /// `registry` and reporting to `monitor`.
    pub fn new(config: &SimgateConfig, registry: SimulatorRegistry, monitor: Monitor) -> Self {
        Self {
            registry,
            cache: ResultCache::new(config.cache.max_size, config.cache.ttl()),
            limiter: RateLimiter::from_config(&config.rate_limit),
            rate_limit_enabled: config.rate_limit.enabled,
            executors: ExecutorPool::from_config(&config.executor),
            connections: ConnectionRegistry::new(
                config.websocket.outbound_queue,
                config.websocket.max_messages_per_second,
            ),
            monitor,
        }
    }

    /// Registered simulators.
    pub const fn registry(&self) -> &SimulatorRegistry {
        &self.registry
    }

    /// The result cache.
    pub const fn cache(&self) -> &ResultCache<Arc<Json>> {
        &self.cache
    }

    /// The admission limiter.
    pub const fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Push subscriptions.
    pub const fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Request metrics.
    pub const fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// Admit one request from `identity`, or reject it with a retry hint.
    pub fn admit(&self, identity: &str) -> Result<(), GatewayError> {
        if !self.rate_limit_enabled {
            return Ok(());
        }
        let admission = self.limiter.admit(identity);
        if admission.allowed {
            return Ok(());
        }
        self.monitor.record_rate_limited();
        info!(
            identity,
            reason = ?admission.reason,
            retry_after = admission.retry_after_secs,
            "request rate limited"
        );
        Err(GatewayError::RateLimited {
            retry_after: admission.retry_after_secs,
        })
    }

    /// Look up a registered simulator.
    pub fn simulator(&self, sim_id: &str) -> Result<&SimulatorHandle, GatewayError> {
        self.registry
            .get(sim_id)
            .ok_or_else(|| GatewayError::NotFound(sim_id.to_owned()))
    }

    /// State of `sim_id` for `supplied` parameters, from cache or freshly
    /// computed. Parameters missing from `supplied` take their defaults.
    pub async fn state(
        &self,
        sim_id: &str,
        supplied: &ParameterSet,
    ) -> Result<Outcome, GatewayError> {
        let handle = self.simulator(sim_id)?;
        let params = handle.schema().validate(supplied)?;
        let key = CacheKey::new(sim_id, &params);

        if let Some(data) = self.cache.get(&key) {
            debug!(sim_id, %key, "cache hit");
            return Ok(Outcome {
                data,
                cache_hit: true,
            });
        }

        let worker = handle.clone();
        let result = self
            .executors
            .run(
                move |cancel| {
                    let raw = worker.get_state(&params)?;
                    if cancel.is_cancelled() {
                        return Err(SimulatorError::Failed(anyhow::anyhow!(
                            "result discarded after deadline"
                        )));
                    }
                    Ok(serialize(&raw))
                },
                None,
            )
            .await;

        let data = Arc::new(Self::unwrap_execution(sim_id, result)?);
        self.cache.set(key, Arc::clone(&data));
        Ok(Outcome {
            data,
            cache_hit: false,
        })
    }

    /// Perform a one-shot `action`. Stepping results bypass the cache.
    pub async fn execute(
        &self,
        sim_id: &str,
        action: Action,
        supplied: &ParameterSet,
    ) -> Result<Outcome, GatewayError> {
        if let Some(step) = action.step() {
            return self.step(sim_id, step, supplied).await;
        }
        if action == Action::Reset {
            return self.state(sim_id, &ParameterSet::new()).await;
        }
        self.state(sim_id, supplied).await
    }

    async fn step(
        &self,
        sim_id: &str,
        step: StepAction,
        supplied: &ParameterSet,
    ) -> Result<Outcome, GatewayError> {
        let handle = self.simulator(sim_id)?;
        let params = handle.schema().validate(supplied)?;
        let worker = handle.clone();
        let result = self
            .executors
            .run(
                move |_cancel| Ok(serialize(&worker.step(step, &params)?)),
                None,
            )
            .await;
        Ok(Outcome {
            data: Arc::new(Self::unwrap_execution(sim_id, result)?),
            cache_hit: false,
        })
    }

    fn unwrap_execution(
        sim_id: &str,
        result: ExecutionResult<Json>,
    ) -> Result<Json, GatewayError> {
        match result {
            ExecutionResult::Success { value } => Ok(value),
            ExecutionResult::Timeout { deadline_ms } => {
                warn!(sim_id, deadline_ms, "simulation timed out");
                Err(GatewayError::Timeout { deadline_ms })
            }
            ExecutionResult::Error {
                kind,
                message,
                detail,
            } => {
                if kind.is_caller_fault() {
                    info!(sim_id, ?kind, ?detail, "simulation rejected parameters");
                } else {
                    error!(sim_id, ?kind, ?detail, "simulation failed");
                }
                Err(GatewayError::from_fault(kind, message, detail))
            }
        }
    }

    /// Push `outcome` to the subscribers of `sim_id`, skipping `origin`.
    /// Returns how many subscribers it was queued for.
    pub fn publish(&self, sim_id: &str, outcome: &Outcome, origin: Option<ConnectionId>) -> usize {
        let frame = PushFrame::state(
            FrameKind::Broadcast,
            Json::clone(&outcome.data),
            outcome.cache_hit,
        );
        let payload = match serde_json::to_value(&frame) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(sim_id, error = %e, "failed to encode broadcast frame");
                return 0;
            }
        };
        let delivered = match origin {
            Some(origin) => self.connections.broadcast_except(sim_id, &payload, origin),
            None => self.connections.broadcast(sim_id, &payload),
        };
        if delivered > 0 {
            debug!(sim_id, delivered, "state broadcast");
        }
        self.sync_connection_gauge();
        delivered
    }

    /// Copy the live subscription count into the monitor.
    pub fn sync_connection_gauge(&self) {
        self.monitor
            .set_ws_connections(self.connections.connection_count());
    }

    /// Remove expired cache entries and idle rate-limit identities.
    pub fn sweep(&self) -> SweepReport {
        let report = SweepReport {
            expired_entries: self.cache.cleanup_expired(),
            idle_clients: self.limiter.cleanup(),
        };
        self.sync_connection_gauge();
        report
    }

    /// Close every push subscription with a shutdown frame.
    pub fn close_connections(&self) {
        self.connections.close_all();
        self.sync_connection_gauge();
    }

    /// Stop writing the request log.
    pub fn close_log(&self) {
        self.monitor.close_log();
    }
}
