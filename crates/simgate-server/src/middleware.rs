//! Request metrics and client identification.
//!
//! [`track_requests`] runs around every routed request. It resolves the
//! caller's [`ClientIdentity`] and stores it in the request extensions for
//! the handlers, then records a [`RequestMetric`] once the response is
//! ready. Handlers that served a simulation state attach a
//! [`SimulationTag`] to the response so the metric carries the simulation
//! id and cache outcome.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, MatchedPath, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use simgate_types::RequestMetric;

use crate::state::AppState;

/// Header carrying the original client address behind a proxy.
const FORWARDED_FOR: &str = "x-forwarded-for";

/// Identity used when the peer address is unavailable.
const UNKNOWN_IDENTITY: &str = "unknown";

/// The key a request is rate limited and logged under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(pub String);

impl ClientIdentity {
    /// Resolve the identity: the first `X-Forwarded-For` hop when
    /// `trust_forwarded_for` is set, otherwise the peer IP.
    pub fn resolve(
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        trust_forwarded_for: bool,
    ) -> Self {
        let forwarded = headers
            .get(FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| trust_forwarded_for && !v.is_empty());
        if let Some(first) = forwarded {
            return Self(first.to_owned());
        }
        peer.map_or_else(
            || Self(String::from(UNKNOWN_IDENTITY)),
            |addr| Self(addr.ip().to_string()),
        )
    }

    /// The identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Response extension naming the simulation a response served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationTag {
    /// Simulation id.
    pub sim_id: String,
    /// Whether the state came from the cache.
    pub cache_hit: bool,
}

/// Resolve the client identity and record a metric for the request.
pub async fn track_requests(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let identity = ClientIdentity::resolve(request.headers(), peer, state.trust_forwarded_for);
    let endpoint = request.extensions().get::<MatchedPath>().map_or_else(
        || request.uri().path().to_owned(),
        |path| path.as_str().to_owned(),
    );
    let method = request.method().to_string();
    request.extensions_mut().insert(identity.clone());

    let response = next.run(request).await;

    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    let mut metric = RequestMetric::new(
        endpoint,
        method,
        response.status().as_u16(),
        duration_ms,
        identity.0,
    );
    if let Some(tag) = response.extensions().get::<SimulationTag>() {
        metric = metric.with_simulation(tag.sim_id.clone(), tag.cache_hit);
    }
    state.gateway.monitor().record(&metric);
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn peer() -> Option<SocketAddr> {
        Some("192.168.1.20:51000".parse().unwrap())
    }

    #[test]
    fn peer_ip_without_proxy_trust() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("1.2.3.4"));
        let id = ClientIdentity::resolve(&headers, peer(), false);
        assert_eq!(id.as_str(), "192.168.1.20");
    }

    #[test]
    fn first_forwarded_hop_when_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_FOR,
            HeaderValue::from_static(" 1.2.3.4 , 10.0.0.1"),
        );
        let id = ClientIdentity::resolve(&headers, peer(), true);
        assert_eq!(id.as_str(), "1.2.3.4");
    }

    #[test]
    fn unknown_without_peer() {
        let id = ClientIdentity::resolve(&HeaderMap::new(), None, true);
        assert_eq!(id.as_str(), UNKNOWN_IDENTITY);
    }
}
