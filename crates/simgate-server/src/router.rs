//! Axum router construction for the gateway API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with request metrics, security headers, and permissive CORS.

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::http::header::{
    HeaderName, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION,
};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::track_requests;
use crate::state::AppState;
use crate::ws;

/// Set `name` to a fixed `value` on every response.
fn security_header(name: HeaderName, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(name, HeaderValue::from_static(value))
}

/// Build the complete Axum router for the gateway server.
///
/// The router includes:
/// - `GET /` -- API information
/// - `GET /health`, `GET /health/ready` -- liveness and readiness
/// - `GET /api/analytics` -- component counters
/// - `GET /api/simulations` -- catalog
/// - `GET /api/categories` -- catalog categories
/// - `GET /api/simulations/{id}` -- one catalog entry
/// - `GET /api/simulations/{id}/state` -- default state
/// - `POST /api/simulations/{id}/execute` -- run an action
/// - `POST /api/simulations/{id}/update` -- recompute with parameters
/// - `GET /api/simulations/{id}/export/csv` -- CSV export
/// - `GET /api/simulations/{id}/ws` -- `WebSocket` subscription
///
/// Every routed request is recorded by the monitor.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Info and health
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/health/ready", get(handlers::ready))
        .route("/api/analytics", get(handlers::analytics))
        // Catalog
        .route("/api/simulations", get(handlers::list_simulations))
        .route("/api/categories", get(handlers::list_categories))
        .route("/api/simulations/{id}", get(handlers::get_simulation))
        // Simulation pipeline
        .route("/api/simulations/{id}/state", get(handlers::get_state))
        .route("/api/simulations/{id}/execute", post(handlers::execute))
        .route("/api/simulations/{id}/update", post(handlers::update))
        .route("/api/simulations/{id}/export/csv", get(handlers::export_csv))
        // WebSocket
        .route("/api/simulations/{id}/ws", get(ws::subscribe))
        .route_layer(from_fn_with_state(Arc::clone(&state), track_requests))
        .layer(security_header(X_CONTENT_TYPE_OPTIONS, "nosniff"))
        .layer(security_header(X_FRAME_OPTIONS, "DENY"))
        .layer(security_header(X_XSS_PROTECTION, "1; mode=block"))
        .layer(security_header(
            REFERRER_POLICY,
            "strict-origin-when-cross-origin",
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
