//! Bounded execution of simulator jobs.
//!
//! [`Executor::run`] moves a blocking job onto a dedicated worker thread
//! and waits for it up to a deadline. Whatever happens -- success, a
//! classified simulator error, a panic, or an elapsed deadline -- the
//! caller gets an [`ExecutionResult`] and is never blocked past the
//! deadline.
//!
//! A job that misses its deadline is abandoned, not killed: its
//! [`CancelToken`] is tripped so it can stop early, and its result is
//! discarded when it eventually finishes. Workers are drawn from a
//! process-wide semaphore, and an abandoned worker keeps its permit until
//! it exits, so runaway jobs cannot grow the thread count without bound.
//!
//! One instance runs one job at a time. [`ExecutorPool`] spreads jobs
//! over several instances.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use simgate_types::{ExecutionResult, FaultKind};
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, warn};

use crate::config::ExecutorConfig;
use crate::simulator::SimulatorError;

/// Cooperative cancellation flag handed to every job.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A fresh, untripped token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the job should stop.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Ask the job to stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Runs one job at a time with a hard deadline.
pub struct Executor {
    default_timeout: Duration,
    max_timeout: Duration,
    workers: Arc<Semaphore>,
    gate: Mutex<()>,
}

impl Executor {
    /// Create an executor drawing workers from `workers`.
    ///
    /// The default timeout is itself capped at `max_timeout`.
    pub fn new(default_timeout: Duration, max_timeout: Duration, workers: Arc<Semaphore>) -> Self {
        Self {
            default_timeout: default_timeout.min(max_timeout),
            max_timeout,
            workers,
            gate: Mutex::new(()),
        }
    }

    /// The deadline applied when the caller does not choose one.
    pub const fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Run `job` on a worker, waiting at most `timeout` (or the default),
    /// capped at the configured maximum.
    pub async fn run<T, F>(&self, job: F, timeout: Option<Duration>) -> ExecutionResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&CancelToken) -> Result<T, SimulatorError> + Send + 'static,
    {
        let deadline = timeout.unwrap_or(self.default_timeout).min(self.max_timeout);
        let token = CancelToken::new();
        let worker_token = token.clone();
        let workers = Arc::clone(&self.workers);

        let _gate = self.gate.lock().await;

        let attempt = tokio::time::timeout(deadline, async move {
            let permit = workers.acquire_owned().await?;
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                job(&worker_token)
            });
            Ok::<_, tokio::sync::AcquireError>(handle.await)
        })
        .await;

        match attempt {
            Err(_elapsed) => {
                token.cancel();
                let deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);
                warn!(deadline_ms, "execution timed out; job abandoned");
                ExecutionResult::Timeout { deadline_ms }
            }
            Ok(Err(_closed)) => ExecutionResult::Error {
                kind: FaultKind::Unclassified,
                message: String::from("Execution failed: executor is shut down"),
                detail: None,
            },
            Ok(Ok(Err(join_error))) => {
                let detail = if join_error.is_panic() {
                    panic_message(join_error.into_panic())
                } else {
                    join_error.to_string()
                };
                error!(%detail, "simulator worker panicked");
                ExecutionResult::Error {
                    kind: FaultKind::Panicked,
                    message: String::from("Execution failed: simulator panicked"),
                    detail: Some(detail),
                }
            }
            Ok(Ok(Ok(Ok(value)))) => ExecutionResult::Success { value },
            Ok(Ok(Ok(Err(err)))) => classify(err),
        }
    }
}

/// Map a simulator error onto the fault taxonomy.
fn classify<T>(err: SimulatorError) -> ExecutionResult<T> {
    match err {
        SimulatorError::InvalidParameter(detail) => ExecutionResult::Error {
            kind: FaultKind::InvalidParameter,
            message: String::from("Invalid parameters provided"),
            detail: Some(detail),
        },
        SimulatorError::InvalidValue(detail) => ExecutionResult::Error {
            kind: FaultKind::InvalidValue,
            message: String::from("Invalid value in parameters"),
            detail: Some(detail),
        },
        SimulatorError::Failed(source) => {
            let detail = format!("{source:?}");
            error!(error = %source, "simulator execution failed");
            ExecutionResult::Error {
                kind: FaultKind::Unclassified,
                message: String::from("Execution failed"),
                detail: Some(detail),
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("non-string panic payload"))
}

/// A fixed set of executors used round-robin.
pub struct ExecutorPool {
    executors: Vec<Executor>,
    next: AtomicUsize,
}

impl ExecutorPool {
    /// Create `instances` executors sharing one worker semaphore of
    /// `max_workers` permits. Zero values are treated as 1.
    pub fn new(
        instances: usize,
        max_workers: usize,
        default_timeout: Duration,
        max_timeout: Duration,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(max_workers.max(1)));
        let executors = (0..instances.max(1))
            .map(|_| Executor::new(default_timeout, max_timeout, Arc::clone(&workers)))
            .collect();
        Self {
            executors,
            next: AtomicUsize::new(0),
        }
    }

    /// Create a pool from configuration.
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(
            config.instances,
            config.max_workers,
            config.timeout(),
            config.max_timeout(),
        )
    }

    /// Number of executor instances.
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    /// Whether the pool is empty. Never true for a constructed pool.
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Pick the next executor in round-robin order.
    pub fn pick(&self) -> Option<&Executor> {
        let len = self.executors.len();
        if len == 0 {
            return None;
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed).checked_rem(len)?;
        self.executors.get(i)
    }

    /// Run `job` on the next executor. See [`Executor::run`].
    pub async fn run<T, F>(&self, job: F, timeout: Option<Duration>) -> ExecutionResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&CancelToken) -> Result<T, SimulatorError> + Send + 'static,
    {
        match self.pick() {
            Some(executor) => executor.run(job, timeout).await,
            None => ExecutionResult::Error {
                kind: FaultKind::Unclassified,
                message: String::from("Execution failed: no executor available"),
                detail: None,
            },
        }
    }
}
