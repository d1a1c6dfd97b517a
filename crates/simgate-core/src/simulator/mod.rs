//! The simulator contract and the registry of available simulators.
//!
//! A [`Simulator`] computes a raw [`Value`] from a validated
//! [`ParameterSet`]. It is initialized lazily, exactly once, on first use;
//! a failed initialization is retried on the next call. Computation runs
//! on blocking workers under the executor's deadline, so implementations
//! may be CPU-heavy but must be `Send + Sync`.

pub mod schema;

use std::sync::{Arc, Mutex, PoisonError};

use simgate_types::{ParameterSet, SimulationInfo, Value};
use tracing::info;

pub use schema::{ParamKind, ParamSpec, ParameterSchema};

/// Errors a simulator may raise.
///
/// The executor maps each variant to a [`simgate_types::FaultKind`].
#[derive(Debug, thiserror::Error)]
pub enum SimulatorError {
    /// A parameter had the wrong type or shape.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A parameter was well-typed but unusable (out of domain).
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// Any other failure.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Direction of a time-stepped update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    /// Advance by the simulator's natural increment.
    Advance,
    /// Step one frame forward.
    Forward,
    /// Step one frame backward.
    Backward,
}

/// A parameterized numeric simulation.
pub trait Simulator: Send + Sync + 'static {
    /// Catalog metadata.
    fn info(&self) -> SimulationInfo;

    /// Declared parameters.
    fn schema(&self) -> ParameterSchema;

    /// One-time setup, run before the first computation.
    fn initialize(&self) -> Result<(), SimulatorError> {
        Ok(())
    }

    /// Compute the full state for `params`.
    fn get_state(&self, params: &ParameterSet) -> Result<Value, SimulatorError>;

    /// Compute a time-stepped update. Results of stepping are never
    /// cached.
    fn step(&self, action: StepAction, params: &ParameterSet) -> Result<Value, SimulatorError> {
        let _ = action;
        self.get_state(params)
    }
}

/// A registered simulator with its cached metadata and init state.
#[derive(Clone)]
pub struct SimulatorHandle {
    info: Arc<SimulationInfo>,
    schema: Arc<ParameterSchema>,
    simulator: Arc<dyn Simulator>,
    initialized: Arc<Mutex<bool>>,
}

impl SimulatorHandle {
    fn new(simulator: Arc<dyn Simulator>) -> Self {
        Self {
            info: Arc::new(simulator.info()),
            schema: Arc::new(simulator.schema()),
            simulator,
            initialized: Arc::new(Mutex::new(false)),
        }
    }

    /// Simulation identifier.
    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Catalog metadata.
    pub fn info(&self) -> &SimulationInfo {
        &self.info
    }

    /// Declared parameters.
    pub fn schema(&self) -> &ParameterSchema {
        &self.schema
    }

    /// Whether initialization has completed.
    pub fn is_initialized(&self) -> bool {
        *self.initialized.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run [`Simulator::initialize`] once. Concurrent callers wait for
    /// the first to finish; a failure leaves the simulator uninitialized.
    ///
    /// Blocking: call from a worker, not an async task.
    pub fn ensure_initialized(&self) -> Result<(), SimulatorError> {
        let mut done = self.initialized.lock().unwrap_or_else(PoisonError::into_inner);
        if !*done {
            self.simulator.initialize()?;
            *done = true;
            info!(sim_id = %self.info.id, "simulator initialized");
        }
        Ok(())
    }

    /// Initialize if needed, then compute the state. Blocking.
    pub fn get_state(&self, params: &ParameterSet) -> Result<Value, SimulatorError> {
        self.ensure_initialized()?;
        self.simulator.get_state(params)
    }

    /// Initialize if needed, then compute a stepped update. Blocking.
    pub fn step(&self, action: StepAction, params: &ParameterSet) -> Result<Value, SimulatorError> {
        self.ensure_initialized()?;
        self.simulator.step(action, params)
    }
}

/// The set of simulators the gateway can serve, in registration order.
#[derive(Clone, Default)]
pub struct SimulatorRegistry {
    entries: Vec<SimulatorHandle>,
}

impl SimulatorRegistry {
    /// An empty registry.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register a simulator, replacing any with the same id.
    pub fn register(&mut self, simulator: impl Simulator) {
        let handle = SimulatorHandle::new(Arc::new(simulator));
        self.entries.retain(|existing| existing.id() != handle.id());
        self.entries.push(handle);
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, simulator: impl Simulator) -> Self {
        self.register(simulator);
        self
    }

    /// Look up a simulator by id.
    pub fn get(&self, id: &str) -> Option<&SimulatorHandle> {
        self.entries.iter().find(|h| h.id() == id)
    }

    /// Catalog entries, optionally restricted to one category.
    pub fn catalog(&self, category: Option<&str>) -> Vec<SimulationInfo> {
        self.entries
            .iter()
            .filter(|h| category.is_none_or(|c| h.info().category == c))
            .map(|h| h.info().clone())
            .collect()
    }

    /// Distinct categories in registration order.
    pub fn categories(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for handle in &self.entries {
            let category = &handle.info().category;
            if !seen.contains(category) {
                seen.push(category.clone());
            }
        }
        seen
    }

    /// Number of registered simulators.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of simulators that have been initialized.
    pub fn initialized_count(&self) -> usize {
        self.entries.iter().filter(|h| h.is_initialized()).count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Echoes its parameters back and counts initializations.
    pub(crate) struct Echo {
        pub(crate) id: &'static str,
        pub(crate) category: &'static str,
        pub(crate) inits: Arc<AtomicUsize>,
    }

    impl Echo {
        pub(crate) fn new(id: &'static str) -> Self {
            Self {
                id,
                category: "test",
                inits: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl Simulator for Echo {
        fn info(&self) -> SimulationInfo {
            SimulationInfo {
                id: self.id.to_owned(),
                name: self.id.to_owned(),
                description: String::from("echo"),
                category: self.category.to_owned(),
            }
        }

        fn schema(&self) -> ParameterSchema {
            ParameterSchema::new().param(ParamSpec::slider("x", "X", 0.0, 10.0, 1.0))
        }

        fn initialize(&self) -> Result<(), SimulatorError> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn get_state(&self, params: &ParameterSet) -> Result<Value, SimulatorError> {
            Ok(Value::from(params.to_json()))
        }
    }

    #[test]
    fn initialization_runs_once() {
        let echo = Echo::new("echo");
        let inits = Arc::clone(&echo.inits);
        let registry = SimulatorRegistry::new().with(echo);
        let handle = registry.get("echo").unwrap();

        assert!(!handle.is_initialized());
        handle.get_state(&ParameterSet::new()).unwrap();
        handle.get_state(&ParameterSet::new()).unwrap();
        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert_eq!(registry.initialized_count(), 1);
    }

    #[test]
    fn catalog_filters_by_category() {
        let mut other = Echo::new("other");
        other.category = "controls";
        let registry = SimulatorRegistry::new().with(Echo::new("echo")).with(other);

        assert_eq!(registry.catalog(None).len(), 2);
        let controls = registry.catalog(Some("controls"));
        assert_eq!(controls.len(), 1);
        assert_eq!(controls.first().unwrap().id, "other");
        assert!(registry.catalog(Some("missing")).is_empty());
    }

    #[test]
    fn categories_are_distinct_in_registration_order() {
        let mut other = Echo::new("other");
        other.category = "controls";
        let registry = SimulatorRegistry::new()
            .with(Echo::new("echo"))
            .with(other)
            .with(Echo::new("echo2"));

        assert_eq!(registry.categories(), vec!["test", "controls"]);
        assert!(SimulatorRegistry::new().categories().is_empty());
    }

    #[test]
    fn registering_same_id_replaces() {
        let registry = SimulatorRegistry::new()
            .with(Echo::new("echo"))
            .with(Echo::new("echo"));
        assert_eq!(registry.len(), 1);
    }

    struct FailsOnce {
        attempts: AtomicUsize,
    }

    impl Simulator for FailsOnce {
        fn info(&self) -> SimulationInfo {
            SimulationInfo {
                id: String::from("flaky"),
                name: String::from("Flaky"),
                description: String::new(),
                category: String::new(),
            }
        }

        fn schema(&self) -> ParameterSchema {
            ParameterSchema::new()
        }

        fn initialize(&self) -> Result<(), SimulatorError> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(anyhow::anyhow!("warming up").into());
            }
            Ok(())
        }

        fn get_state(&self, _params: &ParameterSet) -> Result<Value, SimulatorError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn failed_initialization_is_retried() {
        let registry = SimulatorRegistry::new().with(FailsOnce {
            attempts: AtomicUsize::new(0),
        });
        let handle = registry.get("flaky").unwrap();
        assert!(handle.get_state(&ParameterSet::new()).is_err());
        assert!(!handle.is_initialized());
        assert!(handle.get_state(&ParameterSet::new()).is_ok());
        assert!(handle.is_initialized());
    }
}
