//! Request metrics, latency percentiles, and the durable request log.
//!
//! [`Monitor::record`] updates in-memory counters and a per-endpoint ring
//! buffer of recent latencies, then hands a JSON line to the
//! [`RequestLog`] writer task. Recording never blocks on disk and never
//! fails: when the log queue is full the line is dropped.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use simgate_types::RequestMetric;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// File name of the request log inside the log directory.
pub const REQUEST_LOG_FILE: &str = "requests.log";

const LOG_QUEUE_CAPACITY: usize = 4096;

/// Latency percentiles for one endpoint, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Percentiles {
    /// Median.
    pub p50: f64,
    /// 95th percentile.
    pub p95: f64,
    /// 99th percentile.
    pub p99: f64,
}

impl Percentiles {
    /// Percentiles of `samples`, using the sample at index
    /// `floor(n * p)` of the sorted list. Empty input yields zeros.
    pub fn of(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        Self {
            p50: pick(&sorted, 0.50),
            p95: pick(&sorted, 0.95),
            p99: pick(&sorted, 0.99),
        }
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn pick(sorted: &[f64], p: f64) -> f64 {
    let idx = ((sorted.len() as f64) * p).floor() as usize;
    let idx = idx.min(sorted.len().saturating_sub(1));
    sorted.get(idx).copied().unwrap_or(0.0)
}

/// Snapshot of monitor counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorStats {
    /// Seconds since the monitor was created.
    pub uptime_seconds: f64,
    /// Requests recorded.
    pub total_requests: u64,
    /// Requests with status >= 400.
    pub total_errors: u64,
    /// `errors / requests` as a percentage, three decimals.
    pub error_rate_percent: f64,
    /// Simulation requests served from cache.
    pub cache_hits: u64,
    /// Simulation requests that computed a result.
    pub cache_misses: u64,
    /// `hits / (hits + misses)` as a percentage, two decimals.
    pub cache_hit_rate_percent: f64,
    /// Live push subscriptions.
    pub ws_connections: usize,
    /// Requests rejected by admission control.
    pub rate_limited: u64,
    /// Latency percentiles per endpoint.
    pub response_times: BTreeMap<String, Percentiles>,
    /// Request count per endpoint.
    pub requests_by_endpoint: BTreeMap<String, u64>,
    /// Error count per endpoint.
    pub errors_by_endpoint: BTreeMap<String, u64>,
}

#[derive(Default)]
struct MonitorInner {
    samples: HashMap<String, VecDeque<f64>>,
    requests_by_endpoint: HashMap<String, u64>,
    errors_by_endpoint: HashMap<String, u64>,
    total_requests: u64,
    total_errors: u64,
    cache_hits: u64,
    cache_misses: u64,
    rate_limited: u64,
    ws_connections: usize,
    log: Option<RequestLog>,
}

/// Thread-safe request metrics aggregator.
pub struct Monitor {
    started: Instant,
    capacity: usize,
    inner: Mutex<MonitorInner>,
}

impl Monitor {
    /// Create a monitor keeping `samples_per_endpoint` latencies per
    /// endpoint, optionally appending to `log`.
    pub fn new(samples_per_endpoint: usize, log: Option<RequestLog>) -> Self {
        Self {
            started: Instant::now(),
            capacity: samples_per_endpoint.max(1),
            inner: Mutex::new(MonitorInner {
                log,
                ..MonitorInner::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one completed request.
    ///
    /// The log append only enqueues, so it happens under the same lock.
    pub fn record(&self, metric: &RequestMetric) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.total_requests = inner.total_requests.saturating_add(1);
        bump(&mut inner.requests_by_endpoint, &metric.endpoint);

        let ring = inner.samples.entry(metric.endpoint.clone()).or_default();
        ring.push_back(metric.duration_ms);
        while ring.len() > self.capacity {
            ring.pop_front();
        }

        if metric.is_error() {
            inner.total_errors = inner.total_errors.saturating_add(1);
            bump(&mut inner.errors_by_endpoint, &metric.endpoint);
        }

        if metric.simulation_id.is_some() {
            if metric.cache_hit {
                inner.cache_hits = inner.cache_hits.saturating_add(1);
            } else {
                inner.cache_misses = inner.cache_misses.saturating_add(1);
            }
        }

        if let Some(log) = inner.log.as_ref() {
            log.append(metric);
        }
    }

    /// Count one request rejected by admission control.
    pub fn record_rate_limited(&self) {
        let mut inner = self.lock();
        inner.rate_limited = inner.rate_limited.saturating_add(1);
    }

    /// Update the live push subscription gauge.
    pub fn set_ws_connections(&self, count: usize) {
        self.lock().ws_connections = count;
    }

    /// Seconds since the monitor was created.
    pub fn uptime_seconds(&self) -> f64 {
        round_to(self.started.elapsed().as_secs_f64(), 2)
    }

    /// Snapshot of counters and percentiles.
    pub fn stats(&self) -> MonitorStats {
        let (samples, snapshot) = {
            let inner = self.lock();
            let samples: Vec<(String, Vec<f64>)> = inner
                .samples
                .iter()
                .map(|(endpoint, ring)| (endpoint.clone(), ring.iter().copied().collect()))
                .collect();
            let snapshot = MonitorStats {
                uptime_seconds: self.uptime_seconds(),
                total_requests: inner.total_requests,
                total_errors: inner.total_errors,
                error_rate_percent: rate(inner.total_errors, inner.total_requests, 3),
                cache_hits: inner.cache_hits,
                cache_misses: inner.cache_misses,
                cache_hit_rate_percent: rate(
                    inner.cache_hits,
                    inner.cache_hits.saturating_add(inner.cache_misses),
                    2,
                ),
                ws_connections: inner.ws_connections,
                rate_limited: inner.rate_limited,
                response_times: BTreeMap::new(),
                requests_by_endpoint: inner
                    .requests_by_endpoint
                    .iter()
                    .map(|(k, v)| (k.clone(), *v))
                    .collect(),
                errors_by_endpoint: inner
                    .errors_by_endpoint
                    .iter()
                    .map(|(k, v)| (k.clone(), *v))
                    .collect(),
            };
            (samples, snapshot)
        };

        // Percentiles are computed outside the lock.
        MonitorStats {
            response_times: samples
                .into_iter()
                .map(|(endpoint, times)| (endpoint, Percentiles::of(&times)))
                .collect(),
            ..snapshot
        }
    }

    /// Stop appending to the request log. The writer task flushes what is
    /// queued and exits.
    pub fn close_log(&self) {
        let taken = self.lock().log.take();
        if let Some(log) = taken {
            let dropped = log.dropped();
            if dropped > 0 {
                warn!(dropped, "request log lines dropped under load");
            }
        }
    }
}

fn bump(map: &mut HashMap<String, u64>, key: &str) {
    if let Some(count) = map.get_mut(key) {
        *count = count.saturating_add(1);
    } else {
        map.insert(key.to_owned(), 1);
    }
}

#[allow(clippy::cast_precision_loss)]
fn rate(part: u64, total: u64, decimals: i32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_to(part as f64 / total as f64 * 100.0, decimals)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10_f64.powi(decimals);
    (value * scale).round() / scale
}

/// One line of the durable request log.
#[derive(Debug, Serialize)]
struct LogLine<'a> {
    timestamp: String,
    endpoint: &'a str,
    method: &'a str,
    status: u16,
    duration_ms: f64,
    client_ip: &'a str,
    cache_hit: bool,
    simulation_id: Option<&'a str>,
}

impl<'a> LogLine<'a> {
    fn from_metric(metric: &'a RequestMetric) -> Self {
        Self {
            timestamp: metric.timestamp.to_rfc3339(),
            endpoint: &metric.endpoint,
            method: &metric.method,
            status: metric.status,
            duration_ms: round_to(metric.duration_ms, 2),
            client_ip: &metric.client_identity,
            cache_hit: metric.cache_hit,
            simulation_id: metric.simulation_id.as_deref(),
        }
    }
}

/// Append-only JSON-lines request log fed through a bounded queue.
#[derive(Debug)]
pub struct RequestLog {
    tx: mpsc::Sender<String>,
    dropped: AtomicU64,
}

impl RequestLog {
    /// Open `dir/requests.log` for appending (creating `dir` if needed)
    /// and spawn the writer task. Must be called inside a tokio runtime.
    ///
    /// The returned handle completes once every [`RequestLog`] sender is
    /// gone and the queue has been flushed.
    pub fn spawn(dir: &Path) -> io::Result<(Self, JoinHandle<()>)> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(REQUEST_LOG_FILE);
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let (tx, rx) = mpsc::channel(LOG_QUEUE_CAPACITY);
        let handle = tokio::spawn(write_lines(tokio::fs::File::from_std(file), path, rx));
        Ok((
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            handle,
        ))
    }

    /// Queue one metric for writing. Drops the line if the queue is full.
    pub fn append(&self, metric: &RequestMetric) {
        let line = match serde_json::to_string(&LogLine::from_metric(metric)) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to encode request log line");
                return;
            }
        };
        if self.tx.try_send(line).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("request log queue full; line dropped");
        }
    }

    /// Lines dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

async fn write_lines(mut file: tokio::fs::File, path: PathBuf, mut rx: mpsc::Receiver<String>) {
    info!(path = %path.display(), "request log opened");
    while let Some(mut line) = rx.recv().await {
        line.push('\n');
        if let Err(e) = file.write_all(line.as_bytes()).await {
            warn!(error = %e, "failed to write request log");
            continue;
        }
        if let Err(e) = file.flush().await {
            warn!(error = %e, "failed to flush request log");
        }
    }
    if let Err(e) = file.sync_all().await {
        debug!(error = %e, "request log sync on close failed");
    }
    info!("request log closed");
}
