//! REST API endpoint handlers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | API information |
//! | `GET` | `/health` | Liveness |
//! | `GET` | `/health/ready` | Readiness and headline counters |
//! | `GET` | `/api/analytics` | Monitor, cache, limiter, and push stats |
//! | `GET` | `/api/simulations` | Catalog (`?category=`) |
//! | `GET` | `/api/simulations/{id}` | One catalog entry with its parameters |
//! | `GET` | `/api/simulations/{id}/state` | State for default parameters |
//! | `POST` | `/api/simulations/{id}/execute` | Run an action |
//! | `POST` | `/api/simulations/{id}/update` | Recompute with new parameters |
//! | `GET` | `/api/simulations/{id}/export/csv` | Plot traces as CSV |

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use simgate_core::simulator::ParameterSchema;
use simgate_types::{ApiResponse, ParameterSet, SimulationInfo, SimulationRequest, UpdateRequest};

use crate::error::GatewayError;
use crate::export::plots_to_csv;
use crate::gateway::{Action, Outcome};
use crate::middleware::{ClientIdentity, SimulationTag};
use crate::state::AppState;

/// Version reported by the info endpoint.
const API_VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// Query and response shapes
// ---------------------------------------------------------------------------

/// Query parameters for `GET /api/simulations`.
#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    /// Restrict the catalog to one category.
    pub category: Option<String>,
}

/// A catalog entry together with its declared parameters.
#[derive(Debug, Serialize)]
pub struct SimulationDetail<'a> {
    /// Catalog metadata.
    #[serde(flatten)]
    pub info: &'a SimulationInfo,
    /// Declared parameters.
    pub parameters: &'a ParameterSchema,
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

/// Build the response for a pipeline result, tagging successes with the
/// simulation they served.
fn respond(sim_id: &str, result: Result<Outcome, GatewayError>) -> Response {
    match result {
        Ok(outcome) => {
            let body = ApiResponse::ok(serde_json::Value::clone(&outcome.data), outcome.cache_hit);
            let mut response = (StatusCode::OK, Json(body)).into_response();
            response.extensions_mut().insert(SimulationTag {
                sim_id: sim_id.to_owned(),
                cache_hit: outcome.cache_hit,
            });
            response
        }
        Err(err) => err.into_response(),
    }
}

fn no_cache(mut response: Response) -> Response {
    response.headers_mut().insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, must-revalidate"),
    );
    response
}

fn body_params(
    body: Result<Json<SimulationRequest>, JsonRejection>,
) -> Result<(Action, ParameterSet), GatewayError> {
    let Json(request) = body.map_err(|e| GatewayError::InvalidParameter(e.body_text()))?;
    let action = request.action.parse::<Action>()?;
    let params = ParameterSet::from_json_map(&request.params)?;
    Ok((action, params))
}

// ---------------------------------------------------------------------------
// Info and health
// ---------------------------------------------------------------------------

/// `GET /` -- API information.
pub async fn index() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "Simgate Simulation API",
        "version": API_VERSION,
        "features": [
            "Real-time WebSocket updates",
            "In-memory result cache (LRU + TTL)",
            "Rate limiting",
            "Performance monitoring",
        ],
        "endpoints": {
            "health": "/health",
            "ready": "/health/ready",
            "analytics": "/api/analytics",
            "simulations": "/api/simulations",
            "categories": "/api/categories",
            "websocket": "ws://host/api/simulations/{sim_id}/ws",
        },
    }))
}

/// `GET /health` -- liveness.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `GET /health/ready` -- readiness with headline counters.
pub async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let gateway = &state.gateway;
    let cache = gateway.cache().stats();
    Json(serde_json::json!({
        "status": "ready",
        "uptime_seconds": (gateway.monitor().uptime_seconds() * 100.0).round() / 100.0,
        "cache_size": cache.size,
        "cache_hit_rate": format!("{:.1}%", cache.hit_rate_percent),
        "ws_connections": gateway.connections().connection_count(),
        "active_simulators": gateway.registry().initialized_count(),
    }))
}

/// `GET /api/analytics` -- every component's counters.
pub async fn analytics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let gateway = &state.gateway;
    Json(serde_json::json!({
        "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        "performance": gateway.monitor().stats(),
        "cache": gateway.cache().stats(),
        "rate_limiter": gateway.limiter().stats(),
        "websocket": gateway.connections().stats(),
    }))
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// `GET /api/simulations` -- the catalog, optionally by category.
pub async fn list_simulations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CatalogQuery>,
) -> Response {
    let catalog = state
        .gateway
        .registry()
        .catalog(query.category.as_deref());
    no_cache(Json(catalog).into_response())
}

/// `GET /api/categories` -- distinct catalog categories.
pub async fn list_categories(State(state): State<Arc<AppState>>) -> Response {
    let mut response = Json(state.gateway.registry().categories()).into_response();
    response.headers_mut().insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=3600"),
    );
    response
}

/// `GET /api/simulations/{id}` -- one catalog entry.
pub async fn get_simulation(
    State(state): State<Arc<AppState>>,
    Path(sim_id): Path<String>,
) -> Result<Response, GatewayError> {
    let handle = state.gateway.simulator(&sim_id)?;
    let detail = SimulationDetail {
        info: handle.info(),
        parameters: handle.schema(),
    };
    Ok(no_cache(Json(detail).into_response()))
}

// ---------------------------------------------------------------------------
// Simulation pipeline
// ---------------------------------------------------------------------------

/// `GET /api/simulations/{id}/state` -- state for default parameters.
pub async fn get_state(
    State(state): State<Arc<AppState>>,
    Path(sim_id): Path<String>,
    Extension(identity): Extension<ClientIdentity>,
) -> Response {
    let result = match state.gateway.admit(identity.as_str()) {
        Ok(()) => state.gateway.state(&sim_id, &ParameterSet::new()).await,
        Err(e) => Err(e),
    };
    respond(&sim_id, result)
}

/// `POST /api/simulations/{id}/execute` -- run `{action, params}`.
pub async fn execute(
    State(state): State<Arc<AppState>>,
    Path(sim_id): Path<String>,
    Extension(identity): Extension<ClientIdentity>,
    body: Result<Json<SimulationRequest>, JsonRejection>,
) -> Response {
    let result = run_action(&state, &sim_id, identity.as_str(), body).await;
    respond(&sim_id, result)
}

async fn run_action(
    state: &AppState,
    sim_id: &str,
    identity: &str,
    body: Result<Json<SimulationRequest>, JsonRejection>,
) -> Result<Outcome, GatewayError> {
    state.gateway.admit(identity)?;
    let (action, params) = body_params(body)?;
    let outcome = state.gateway.execute(sim_id, action, &params).await?;
    if action.publishes() {
        state.gateway.publish(sim_id, &outcome, None);
    }
    Ok(outcome)
}

/// `POST /api/simulations/{id}/update` -- recompute with `{params}`.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(sim_id): Path<String>,
    Extension(identity): Extension<ClientIdentity>,
    body: Result<Json<UpdateRequest>, JsonRejection>,
) -> Response {
    let result = run_update(&state, &sim_id, identity.as_str(), body).await;
    respond(&sim_id, result)
}

async fn run_update(
    state: &AppState,
    sim_id: &str,
    identity: &str,
    body: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Outcome, GatewayError> {
    state.gateway.admit(identity)?;
    let Json(request) = body.map_err(|e| GatewayError::InvalidParameter(e.body_text()))?;
    let params = ParameterSet::from_json_map(&request.params)?;
    let outcome = state.gateway.state(sim_id, &params).await?;
    state.gateway.publish(sim_id, &outcome, None);
    Ok(outcome)
}

/// `GET /api/simulations/{id}/export/csv` -- plot traces of the default
/// state as a CSV attachment.
pub async fn export_csv(
    State(state): State<Arc<AppState>>,
    Path(sim_id): Path<String>,
    Extension(identity): Extension<ClientIdentity>,
) -> Result<Response, GatewayError> {
    state.gateway.admit(identity.as_str())?;
    let outcome = state.gateway.state(&sim_id, &ParameterSet::new()).await?;
    let csv = plots_to_csv(&outcome.data).map_err(|e| GatewayError::Internal(e.to_string()))?;

    let disposition = HeaderValue::from_str(&format!("attachment; filename={sim_id}_data.csv"))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    let mut response = (
        [(CONTENT_TYPE, HeaderValue::from_static("text/csv"))],
        csv,
    )
        .into_response();
    response.headers_mut().insert(CONTENT_DISPOSITION, disposition);
    response.extensions_mut().insert(SimulationTag {
        sim_id,
        cache_hit: outcome.cache_hit,
    });
    Ok(response)
}
