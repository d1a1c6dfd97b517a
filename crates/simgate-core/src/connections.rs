//! Registry of live push subscriptions.
//!
//! Each subscription is bound to one simulation id at connect time and
//! owns a bounded outbound queue. The socket task drains the queue; the
//! registry only ever enqueues. Broadcasts snapshot the subscriber list
//! under the lock and enqueue outside it, so a slow socket never stalls
//! the registry. A closed or full queue is a transport fault: the
//! subscription is pruned after the pass and the rest still receive the
//! payload.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use simgate_types::ConnectionId;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::rate_limiter::MessageWindow;

/// Close code sent to every subscriber on shutdown.
pub const SHUTDOWN_CLOSE_CODE: u16 = 1001;

/// Close reason sent to every subscriber on shutdown.
pub const SHUTDOWN_CLOSE_REASON: &str = "Server shutdown";

/// A message queued for one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A JSON text frame, shared between all recipients of a broadcast.
    Text(Arc<str>),
    /// Close the connection.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Why a queued send failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransportFault {
    /// The socket task has gone away.
    #[error("connection closed")]
    Closed,
    /// The socket is not keeping up with its queue.
    #[error("outbound queue full")]
    Full,
}

impl<T> From<mpsc::error::TrySendError<T>> for TransportFault {
    fn from(err: mpsc::error::TrySendError<T>) -> Self {
        match err {
            mpsc::error::TrySendError::Full(_) => Self::Full,
            mpsc::error::TrySendError::Closed(_) => Self::Closed,
        }
    }
}

/// The subscriber's side of a registration: identity plus its inbound
/// message window. Owned by the socket task.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sim_id: Arc<str>,
    connected_at: DateTime<Utc>,
    window: MessageWindow,
}

impl ConnectionHandle {
    /// Connection identifier.
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Simulation this connection subscribed to.
    pub fn sim_id(&self) -> &str {
        &self.sim_id
    }

    /// When the connection was registered.
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// When the last inbound message was counted.
    pub const fn last_message_at(&self) -> tokio::time::Instant {
        self.window.last_message()
    }
}

#[derive(Debug)]
struct Subscriber {
    id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
}

/// Snapshot of registry counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    /// Live subscriptions.
    pub active_connections: usize,
    /// Simulations with at least one subscriber.
    pub simulations_active: usize,
    /// Subscriptions ever registered.
    pub total_connections_served: u64,
    /// Inbound messages counted by the rate check.
    pub total_messages: u64,
    /// Live subscriptions per simulation.
    pub connections_by_simulation: BTreeMap<String, usize>,
}

/// Thread-safe registry of push subscriptions keyed by simulation id.
pub struct ConnectionRegistry {
    queue_capacity: usize,
    max_messages_per_second: u32,
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
    total_connections: AtomicU64,
    total_messages: AtomicU64,
}

impl ConnectionRegistry {
    /// Create a registry whose subscribers buffer up to `queue_capacity`
    /// outbound frames and may send `max_messages_per_second` inbound.
    pub fn new(queue_capacity: usize, max_messages_per_second: u32) -> Self {
        Self {
            queue_capacity: queue_capacity.max(1),
            max_messages_per_second,
            subscribers: Mutex::new(HashMap::new()),
            total_connections: AtomicU64::new(0),
            total_messages: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Subscriber>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a subscription to `sim_id`. Returns the handle and the
    /// receiving end of its outbound queue.
    pub fn connect(&self, sim_id: &str) -> (ConnectionHandle, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let handle = ConnectionHandle {
            id: ConnectionId::new(),
            sim_id: Arc::from(sim_id),
            connected_at: Utc::now(),
            window: MessageWindow::new(self.max_messages_per_second),
        };
        let total = {
            let mut subs = self.lock();
            subs.entry(sim_id.to_owned()).or_default().push(Subscriber { id: handle.id, tx });
            subs.values().map(Vec::len).sum::<usize>()
        };
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        info!(sim_id, connection_id = %handle.id, total, "push subscriber connected");
        (handle, rx)
    }

    /// Remove a subscription. Removing an unknown one is a no-op.
    pub fn disconnect(&self, handle: &ConnectionHandle) {
        let removed = self.remove(handle.sim_id(), &[handle.id]);
        if removed > 0 {
            info!(
                sim_id = handle.sim_id(),
                connection_id = %handle.id,
                total = self.connection_count(),
                "push subscriber disconnected"
            );
        }
    }

    fn remove(&self, sim_id: &str, ids: &[ConnectionId]) -> usize {
        let mut subs = self.lock();
        let Some(list) = subs.get_mut(sim_id) else {
            return 0;
        };
        let before = list.len();
        list.retain(|s| !ids.contains(&s.id));
        let removed = before.saturating_sub(list.len());
        if list.is_empty() {
            subs.remove(sim_id);
        }
        removed
    }

    /// Count one inbound message against the connection's per-second cap.
    /// Returns whether it is within the cap.
    pub fn check_rate_limit(&self, handle: &mut ConnectionHandle) -> bool {
        self.total_messages.fetch_add(1, Ordering::Relaxed);
        handle.window.check()
    }

    /// Send `payload` to every subscriber of `sim_id`. Returns how many
    /// subscribers it was queued for.
    pub fn broadcast(&self, sim_id: &str, payload: &serde_json::Value) -> usize {
        self.fan_out(sim_id, payload, None)
    }

    /// Like [`broadcast`](Self::broadcast), skipping `origin`.
    pub fn broadcast_except(
        &self,
        sim_id: &str,
        payload: &serde_json::Value,
        origin: ConnectionId,
    ) -> usize {
        self.fan_out(sim_id, payload, Some(origin))
    }

    fn fan_out(
        &self,
        sim_id: &str,
        payload: &serde_json::Value,
        skip: Option<ConnectionId>,
    ) -> usize {
        let targets: Vec<(ConnectionId, mpsc::Sender<Outbound>)> = {
            let subs = self.lock();
            let Some(list) = subs.get(sim_id) else {
                return 0;
            };
            list.iter()
                .filter(|s| Some(s.id) != skip)
                .map(|s| (s.id, s.tx.clone()))
                .collect()
        };
        if targets.is_empty() {
            return 0;
        }

        let text: Arc<str> = Arc::from(payload.to_string());
        let mut delivered = 0_usize;
        let mut faulted = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(Outbound::Text(Arc::clone(&text))) {
                Ok(()) => delivered = delivered.saturating_add(1),
                Err(err) => {
                    let fault = TransportFault::from(err);
                    debug!(sim_id, connection_id = %id, %fault, "pruning push subscriber");
                    faulted.push(id);
                }
            }
        }
        if !faulted.is_empty() {
            self.remove(sim_id, &faulted);
        }
        delivered
    }

    /// Close every subscription with code 1001 and forget them all.
    pub fn close_all(&self) {
        let drained: Vec<Subscriber> = {
            let mut subs = self.lock();
            subs.drain().flat_map(|(_, list)| list).collect()
        };
        let count = drained.len();
        for sub in drained {
            // A subscriber whose queue is gone or full is already leaving.
            let _ = sub.tx.try_send(Outbound::Close {
                code: SHUTDOWN_CLOSE_CODE,
                reason: String::from(SHUTDOWN_CLOSE_REASON),
            });
        }
        info!(count, "all push subscribers closed");
    }

    /// Live subscriptions across all simulations.
    pub fn connection_count(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    /// Snapshot of counters.
    pub fn stats(&self) -> ConnectionStats {
        let connections_by_simulation: BTreeMap<String, usize> = self
            .lock()
            .iter()
            .map(|(sim, list)| (sim.clone(), list.len()))
            .collect();
        ConnectionStats {
            active_connections: connections_by_simulation.values().sum(),
            simulations_active: connections_by_simulation.len(),
            total_connections_served: self.total_connections.load(Ordering::Relaxed),
            total_messages: self.total_messages.load(Ordering::Relaxed),
            connections_by_simulation,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let registry = ConnectionRegistry::new(8, 10);
        let (_a, mut rx_a) = registry.connect("rc");
        let (_b, mut rx_b) = registry.connect("rc");
        let (_c, mut rx_c) = registry.connect("dc_motor");

        assert_eq!(registry.broadcast("rc", &json!({"v": 1})), 2);
        assert_eq!(rx_a.recv().await, Some(Outbound::Text(Arc::from(r#"{"v":1}"#))));
        assert_eq!(rx_b.recv().await, Some(Outbound::Text(Arc::from(r#"{"v":1}"#))));
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn failing_subscriber_is_pruned_and_others_still_receive() {
        let registry = ConnectionRegistry::new(8, 10);
        let (_a, mut rx_a) = registry.connect("rc");
        let (_b, rx_b) = registry.connect("rc");
        let (_c, mut rx_c) = registry.connect("rc");
        drop(rx_b);

        assert_eq!(registry.broadcast("rc", &json!("state")), 2);
        assert!(rx_a.recv().await.is_some());
        assert!(rx_c.recv().await.is_some());
        assert_eq!(registry.connection_count(), 2);
    }

    #[tokio::test]
    async fn full_queue_counts_as_transport_fault() {
        let registry = ConnectionRegistry::new(1, 10);
        let (_a, _rx_a) = registry.connect("rc");
        assert_eq!(registry.broadcast("rc", &json!(1)), 1);
        assert_eq!(registry.broadcast("rc", &json!(2)), 0);
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn broadcast_except_skips_origin() {
        let registry = ConnectionRegistry::new(8, 10);
        let (a, mut rx_a) = registry.connect("rc");
        let (_b, mut rx_b) = registry.connect("rc");

        assert_eq!(registry.broadcast_except("rc", &json!(1), a.id()), 1);
        assert!(rx_b.recv().await.is_some());
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_removes_empty_simulations() {
        let registry = ConnectionRegistry::new(8, 10);
        let (a, _rx) = registry.connect("rc");
        assert_eq!(registry.stats().simulations_active, 1);
        registry.disconnect(&a);
        registry.disconnect(&a);
        let stats = registry.stats();
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.simulations_active, 0);
        assert_eq!(stats.total_connections_served, 1);
    }

    #[tokio::test]
    async fn close_all_sends_shutdown_code() {
        let registry = ConnectionRegistry::new(8, 10);
        let (_a, mut rx) = registry.connect("rc");
        registry.close_all();
        assert_eq!(
            rx.recv().await,
            Some(Outbound::Close {
                code: 1001,
                reason: String::from("Server shutdown"),
            })
        );
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn per_connection_rate_limit() {
        let registry = ConnectionRegistry::new(8, 3);
        let (mut handle, _rx) = registry.connect("rc");
        assert!(registry.check_rate_limit(&mut handle));
        assert!(registry.check_rate_limit(&mut handle));
        assert!(registry.check_rate_limit(&mut handle));
        assert!(!registry.check_rate_limit(&mut handle));
        tokio::time::advance(std::time::Duration::from_secs(1)).await;
        assert!(registry.check_rate_limit(&mut handle));
        assert_eq!(registry.stats().total_messages, 5);
    }
}
