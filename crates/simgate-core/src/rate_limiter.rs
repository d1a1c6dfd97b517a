//! Sliding-window admission control.
//!
//! [`RateLimiter`] admits REST requests per client identity using three
//! checks, in order:
//!
//! 1. A global counter over a fixed 60 s window, shared by all clients.
//! 2. A per-identity sliding 60 s window of admitted request timestamps.
//! 3. A per-identity 10 s burst sub-window over the same timestamps.
//!
//! A rejection carries the seconds until the relevant window frees a slot,
//! never less than one. Identities idle for more than two minutes are
//! dropped by [`RateLimiter::cleanup`].
//!
//! [`MessageWindow`] is the per-connection variant used on push
//! subscriptions: a one-second message counter with a fixed cap.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::percent;
use crate::config::RateLimitConfig;

const WINDOW: Duration = Duration::from_secs(60);
const BURST_WINDOW: Duration = Duration::from_secs(10);
const IDLE_CUTOFF: Duration = Duration::from_secs(120);
const MIN_RETRY_SECS: f64 = 1.0;

/// Which limit rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The process-wide limit.
    Global,
    /// The per-identity 60 s limit.
    PerClient,
    /// The per-identity 10 s burst limit.
    Burst,
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Admission {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Seconds to wait before retrying; 0 when allowed, at least 1
    /// otherwise.
    pub retry_after_secs: f64,
    /// The limit that rejected the request.
    pub reason: Option<RejectReason>,
}

impl Admission {
    const fn allow() -> Self {
        Self {
            allowed: true,
            retry_after_secs: 0.0,
            reason: None,
        }
    }

    fn reject(reason: RejectReason, remaining: Duration) -> Self {
        Self {
            allowed: false,
            retry_after_secs: remaining.as_secs_f64().max(MIN_RETRY_SECS),
            reason: Some(reason),
        }
    }
}

/// Configured limits, as reported in stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Limits {
    /// Requests per identity per minute.
    pub per_client_per_minute: u32,
    /// Requests per identity per 10 s.
    pub burst_size: u32,
    /// Requests across all identities per minute.
    pub global_per_minute: u32,
}

/// Snapshot of limiter counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitStats {
    /// Admission checks performed.
    pub total_requests: u64,
    /// Checks that were rejected.
    pub blocked_requests: u64,
    /// `blocked / total` as a percentage.
    pub block_rate: f64,
    /// Identities currently tracked.
    pub unique_clients: usize,
    /// Requests counted in the current global window.
    pub global_count_current_minute: u32,
    /// Configured limits.
    pub limits: Limits,
}

struct LimiterInner {
    clients: HashMap<String, VecDeque<Instant>>,
    global_window_start: Instant,
    global_count: u32,
    total_requests: u64,
    blocked_requests: u64,
}

/// Thread-safe per-identity and global rate limiter.
pub struct RateLimiter {
    limits: Limits,
    inner: Mutex<LimiterInner>,
}

impl RateLimiter {
    /// Create a limiter with the given limits.
    pub fn new(per_client_per_minute: u32, burst_size: u32, global_per_minute: u32) -> Self {
        Self {
            limits: Limits {
                per_client_per_minute,
                burst_size,
                global_per_minute,
            },
            inner: Mutex::new(LimiterInner {
                clients: HashMap::new(),
                global_window_start: Instant::now(),
                global_count: 0,
                total_requests: 0,
                blocked_requests: 0,
            }),
        }
    }

    /// Create a limiter from configuration.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.requests_per_minute,
            config.burst_size,
            config.global_limit_per_minute,
        )
    }

    fn lock(&self) -> MutexGuard<'_, LimiterInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether a request from `identity` may proceed, recording it
    /// if so.
    ///
    /// The current time is sampled under the lock, so admissions for one
    /// identity are recorded in monotonic order.
    pub fn admit(&self, identity: &str) -> Admission {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let now = Instant::now();

        inner.total_requests = inner.total_requests.saturating_add(1);

        if now.saturating_duration_since(inner.global_window_start) >= WINDOW {
            inner.global_count = 0;
            inner.global_window_start = now;
        }
        inner.global_count = inner.global_count.saturating_add(1);

        if inner.global_count > self.limits.global_per_minute {
            inner.blocked_requests = inner.blocked_requests.saturating_add(1);
            let elapsed = now.saturating_duration_since(inner.global_window_start);
            warn!(
                count = inner.global_count,
                "global rate limit exceeded"
            );
            return Admission::reject(RejectReason::Global, WINDOW.saturating_sub(elapsed));
        }

        let window = inner.clients.entry(identity.to_owned()).or_default();
        while window
            .front()
            .is_some_and(|ts| now.saturating_duration_since(*ts) >= WINDOW)
        {
            window.pop_front();
        }

        if window.len() >= self.limits.per_client_per_minute as usize {
            let oldest = window.front().copied().unwrap_or(now);
            let remaining = WINDOW.saturating_sub(now.saturating_duration_since(oldest));
            let count = window.len();
            inner.blocked_requests = inner.blocked_requests.saturating_add(1);
            warn!(identity, count, "client rate limit exceeded");
            return Admission::reject(RejectReason::PerClient, remaining);
        }

        let recent: Vec<Instant> = window
            .iter()
            .copied()
            .filter(|ts| now.saturating_duration_since(*ts) < BURST_WINDOW)
            .collect();
        if recent.len() >= self.limits.burst_size as usize {
            let oldest = recent.first().copied().unwrap_or(now);
            let remaining = BURST_WINDOW.saturating_sub(now.saturating_duration_since(oldest));
            inner.blocked_requests = inner.blocked_requests.saturating_add(1);
            debug!(identity, "client burst limit exceeded");
            return Admission::reject(RejectReason::Burst, remaining);
        }

        window.push_back(now);
        Admission::allow()
    }

    /// Drop identities with no admitted request in the last two minutes.
    /// Returns how many were dropped.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let before = inner.clients.len();
        inner.clients.retain(|_, window| {
            window
                .back()
                .is_some_and(|last| now.saturating_duration_since(*last) <= IDLE_CUTOFF)
        });
        let removed = before.saturating_sub(inner.clients.len());
        if removed > 0 {
            debug!(removed, "cleaned up inactive rate limit identities");
        }
        removed
    }

    /// Snapshot of counters.
    pub fn stats(&self) -> RateLimitStats {
        let inner = self.lock();
        RateLimitStats {
            total_requests: inner.total_requests,
            blocked_requests: inner.blocked_requests,
            block_rate: percent(inner.blocked_requests, inner.total_requests),
            unique_clients: inner.clients.len(),
            global_count_current_minute: inner.global_count,
            limits: self.limits,
        }
    }
}

/// Per-connection message counter over one-second windows.
///
/// Owned by a single connection; not shared.
#[derive(Debug, Clone)]
pub struct MessageWindow {
    max_per_second: u32,
    count: u32,
    window_start: Instant,
    last_message: Instant,
}

impl MessageWindow {
    /// A window allowing `max_per_second` messages per second.
    pub fn new(max_per_second: u32) -> Self {
        let now = Instant::now();
        Self {
            max_per_second,
            count: 0,
            window_start: now,
            last_message: now,
        }
    }

    /// Record one inbound message. Returns whether it is within the cap.
    pub fn check(&mut self) -> bool {
        let now = Instant::now();
        if now.saturating_duration_since(self.window_start) >= Duration::from_secs(1) {
            self.count = 0;
            self.window_start = now;
        }
        self.count = self.count.saturating_add(1);
        self.last_message = now;
        self.count <= self.max_per_second
    }

    /// When the last message was recorded.
    pub const fn last_message(&self) -> Instant {
        self.last_message
    }
}
