//! `WebSocket` push subscriptions.
//!
//! A client connects to `GET /api/simulations/{id}/ws`, is registered with
//! the [`ConnectionRegistry`](simgate_core::connections::ConnectionRegistry)
//! and immediately receives the `initial` state. Inbound messages are
//! `{action, params}` with `update` (the default), `reset`, or `ping`.
//! The requester gets the result as an `update`/`reset` frame; every other
//! subscriber of the simulation gets it as a `broadcast` frame.
//!
//! The socket task multiplexes the registry's outbound queue, inbound
//! frames, and a ping timer. A client silent for longer than the idle
//! timeout is dropped at the next ping tick. While a client's own request
//! is being computed the outbound queue keeps draining, so broadcasts from
//! other subscribers cannot fill it and get the requester pruned.

use std::sync::Arc;
use std::time::Instant as StdInstant;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::Extension;
use simgate_core::connections::{ConnectionHandle, Outbound};
use simgate_types::{
    ErrorCode, FrameKind, ParameterSet, PushFrame, PushRequest, RequestMetric,
};
use tokio::sync::mpsc;
use tokio::time::{Instant, interval};
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::middleware::ClientIdentity;
use crate::state::AppState;

/// Method label recorded for push messages.
const WS_METHOD: &str = "WS";

/// Endpoint label recorded for push messages.
const WS_ENDPOINT: &str = "/api/simulations/{id}/ws";

/// Upgrade to a `WebSocket` subscribed to one simulation.
///
/// # Route
///
/// `GET /api/simulations/{id}/ws`
pub async fn subscribe(
    ws: WebSocketUpgrade,
    Path(sim_id): Path<String>,
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ClientIdentity>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, sim_id, identity))
}

/// Send one frame. Returns `false` once the client is gone.
async fn send_frame(socket: &mut WebSocket, frame: &PushFrame) -> bool {
    let text = match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize push frame: {e}");
            return true;
        }
    };
    socket.send(Message::Text(text.into())).await.is_ok()
}

/// Forward one frame queued by the registry. Returns `false` once the
/// session must end.
async fn forward(socket: &mut WebSocket, queued: Option<Outbound>) -> bool {
    match queued {
        Some(Outbound::Text(text)) => {
            let msg = Message::Text(text.to_string().into());
            if socket.send(msg).await.is_err() {
                debug!("WebSocket client disconnected (send failed)");
                return false;
            }
            true
        }
        Some(Outbound::Close { code, reason }) => {
            let frame = CloseFrame { code, reason: reason.into() };
            let _ = socket.send(Message::Close(Some(frame))).await;
            false
        }
        None => false,
    }
}

/// Await `reply` while handing queued frames to `deliver`. Returns `None`
/// when `deliver` ends the session first.
async fn drain_until<R>(
    outbound: &mut mpsc::Receiver<Outbound>,
    reply: R,
    mut deliver: impl AsyncFnMut(Option<Outbound>) -> bool,
) -> Option<PushFrame>
where
    R: Future<Output = PushFrame>,
{
    tokio::pin!(reply);
    loop {
        tokio::select! {
            frame = &mut reply => return Some(frame),
            queued = outbound.recv() => {
                if !deliver(queued).await {
                    return None;
                }
            }
        }
    }
}

/// Handle the `WebSocket` lifecycle for one subscriber.
async fn handle_socket(
    mut socket: WebSocket,
    state: Arc<AppState>,
    sim_id: String,
    identity: ClientIdentity,
) {
    let gateway = &state.gateway;

    if let Err(e) = gateway.simulator(&sim_id) {
        let _ = send_frame(&mut socket, &PushFrame::error(e.code(), e.to_string())).await;
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    let (mut handle, mut outbound) = gateway.connections().connect(&sim_id);
    gateway.sync_connection_gauge();
    debug!(sim_id, connection_id = %handle.id(), "WebSocket client subscribed");

    let initial = match gateway.state(&sim_id, &ParameterSet::new()).await {
        Ok(outcome) => PushFrame::state(
            FrameKind::Initial,
            serde_json::Value::clone(&outcome.data),
            outcome.cache_hit,
        ),
        Err(e) => PushFrame::error(e.code(), e.to_string()),
    };

    if send_frame(&mut socket, &initial).await {
        run_session(&mut socket, &state, &mut handle, &mut outbound, &identity).await;
    }

    gateway.connections().disconnect(&handle);
    gateway.sync_connection_gauge();
    debug!(sim_id, connection_id = %handle.id(), "WebSocket client disconnected");
}

async fn run_session(
    socket: &mut WebSocket,
    state: &AppState,
    handle: &mut ConnectionHandle,
    outbound: &mut mpsc::Receiver<Outbound>,
    identity: &ClientIdentity,
) {
    let period = state.websocket.ping_interval();
    let idle_timeout = state.websocket.idle_timeout();
    let mut ping = interval(period);
    // The first tick completes immediately.
    ping.tick().await;
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            // Frames queued by the registry: broadcasts and shutdown.
            queued = outbound.recv() => {
                if !forward(socket, queued).await {
                    return;
                }
            }
            // Frames from the client.
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_seen = Instant::now();
                        let pending = handle_message(state, handle, identity, text.as_str());
                        let Some(reply) = drain_until(outbound, pending, async |queued| {
                            forward(socket, queued).await
                        })
                        .await
                        else {
                            return;
                        };
                        if !send_frame(socket, &reply).await {
                            debug!("WebSocket client disconnected (send failed)");
                            return;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        last_seen = Instant::now();
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("WebSocket client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Ok(Message::Pong(_) | Message::Binary(_))) => {
                        last_seen = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        return;
                    }
                }
            }
            // Keepalive and idle detection.
            _ = ping.tick() => {
                if last_seen.elapsed() >= idle_timeout {
                    debug!(idle_secs = last_seen.elapsed().as_secs(), "WebSocket client idle, closing");
                    let _ = socket.send(Message::Close(None)).await;
                    return;
                }
                if socket.send(Message::Ping(Bytes::new())).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Process one inbound text message and produce the reply frame.
async fn handle_message(
    state: &AppState,
    handle: &mut ConnectionHandle,
    identity: &ClientIdentity,
    text: &str,
) -> PushFrame {
    let gateway = &state.gateway;
    let started = StdInstant::now();

    if !gateway.connections().check_rate_limit(handle) {
        return PushFrame::error(
            ErrorCode::RateLimited,
            format!(
                "Rate limit exceeded (max {} msg/sec)",
                state.websocket.max_messages_per_second
            ),
        );
    }

    let request: PushRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(e) => {
            return PushFrame::error(ErrorCode::InvalidParameter, format!("malformed message: {e}"));
        }
    };

    let sim_id = handle.sim_id().to_owned();
    let (kind, result) = match request.action.as_str() {
        "ping" => return PushFrame::pong(),
        "update" => (
            FrameKind::Update,
            match ParameterSet::from_json_map(&request.params) {
                Ok(params) => gateway.state(&sim_id, &params).await,
                Err(e) => Err(GatewayError::from(e)),
            },
        ),
        "reset" => (
            FrameKind::Reset,
            gateway.state(&sim_id, &ParameterSet::new()).await,
        ),
        other => {
            let err = GatewayError::UnknownAction(other.to_owned());
            return PushFrame::error(err.code(), err.to_string());
        }
    };

    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    match result {
        Ok(outcome) => {
            gateway.publish(&sim_id, &outcome, Some(handle.id()));
            let metric =
                RequestMetric::new(WS_ENDPOINT, WS_METHOD, 200, duration_ms, identity.as_str())
                    .with_simulation(sim_id.as_str(), outcome.cache_hit);
            gateway.monitor().record(&metric);
            PushFrame::state(
                kind,
                serde_json::Value::clone(&outcome.data),
                outcome.cache_hit,
            )
        }
        Err(e) => {
            let metric = RequestMetric::new(
                WS_ENDPOINT,
                WS_METHOD,
                e.code().http_status(),
                duration_ms,
                identity.as_str(),
            );
            gateway.monitor().record(&metric);
            PushFrame::error(e.code(), e.to_string())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use simgate_core::connections::ConnectionRegistry;

    use super::*;

    #[tokio::test]
    async fn queue_drains_while_reply_is_computed() {
        let registry = ConnectionRegistry::new(4, 100);
        let (_busy, mut outbound) = registry.connect("rc");
        let (other, _other_rx) = registry.connect("rc");

        let reply = async {
            for i in 0..20 {
                registry.broadcast_except("rc", &serde_json::json!({ "n": i }), other.id());
                tokio::task::yield_now().await;
            }
            PushFrame::pong()
        };

        let mut forwarded: Vec<Arc<str>> = Vec::new();
        let frame = drain_until(&mut outbound, reply, async |queued| {
            if let Some(Outbound::Text(text)) = queued {
                forwarded.push(text);
                true
            } else {
                false
            }
        })
        .await
        .unwrap();

        assert_eq!(frame.kind, FrameKind::Pong);
        assert_eq!(registry.connection_count(), 2);
        while let Ok(Outbound::Text(text)) = outbound.try_recv() {
            forwarded.push(text);
        }
        assert_eq!(forwarded.len(), 20);
        assert_eq!(forwarded.first().unwrap().as_ref(), r#"{"n":0}"#);
    }

    #[tokio::test]
    async fn close_while_waiting_ends_session() {
        let registry = ConnectionRegistry::new(4, 100);
        let (_handle, mut outbound) = registry.connect("rc");
        registry.close_all();

        let reply = std::future::pending::<PushFrame>();
        let result = drain_until(&mut outbound, reply, async |queued| {
            matches!(queued, Some(Outbound::Text(_)))
        })
        .await;
        assert!(result.is_none());
    }
}
