//! Integration tests for the gateway API endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. This validates handler logic, routing, and the
//! full request pipeline without needing a live network connection.

#![allow(clippy::unwrap_used, clippy::float_cmp, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use serde_json::{Value, json};
use simgate_core::config::SimgateConfig;
use simgate_core::monitor::Monitor;
use simgate_core::simulator::{ParameterSchema, Simulator, SimulatorError, SimulatorRegistry};
use simgate_server::router::build_router;
use simgate_server::state::AppState;
use simgate_types::{ParameterSet, SimulationInfo};
use tower::ServiceExt;

// =========================================================================
// Fixtures
// =========================================================================

/// Sleeps past any one-second deadline.
struct Sluggish;

impl Simulator for Sluggish {
    fn info(&self) -> SimulationInfo {
        SimulationInfo {
            id: String::from("sluggish"),
            name: String::from("Sluggish"),
            description: String::from("Never finishes in time"),
            category: String::from("test"),
        }
    }

    fn schema(&self) -> ParameterSchema {
        ParameterSchema::new()
    }

    fn get_state(&self, _params: &ParameterSet) -> Result<simgate_types::Value, SimulatorError> {
        std::thread::sleep(Duration::from_millis(1500));
        Ok(simgate_types::Value::Null)
    }
}

/// Always fails with an unclassified error.
struct Faulty;

impl Simulator for Faulty {
    fn info(&self) -> SimulationInfo {
        SimulationInfo {
            id: String::from("faulty"),
            name: String::from("Faulty"),
            description: String::from("Always fails"),
            category: String::from("test"),
        }
    }

    fn schema(&self) -> ParameterSchema {
        ParameterSchema::new()
    }

    fn get_state(&self, _params: &ParameterSet) -> Result<simgate_types::Value, SimulatorError> {
        Err(anyhow::anyhow!("matrix is singular")
            .context("solving state equations")
            .into())
    }
}

fn registry() -> SimulatorRegistry {
    simgate_sims::registry().with(Sluggish).with(Faulty)
}

fn make_state(config: &SimgateConfig) -> Arc<AppState> {
    Arc::new(AppState::new(config, registry(), Monitor::new(100, None)))
}

fn make_router() -> Router {
    build_router(make_state(&SimgateConfig::default()))
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get(router: &Router, uri: &str) -> Response<Body> {
    router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post_json(router: &Router, uri: &str, body: &Value) -> Response<Body> {
    router
        .clone()
        .oneshot(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

// =========================================================================
// Info, health, and headers
// =========================================================================

#[tokio::test]
async fn test_health_returns_ok() {
    let router = make_router();
    let response = get(&router, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let router = make_router();

    for uri in ["/health", "/api/simulations/missing", "/no/such/route"] {
        let response = get(&router, uri).await;
        let headers = response.headers();
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(headers["x-xss-protection"], "1; mode=block");
        assert_eq!(
            headers["referrer-policy"],
            "strict-origin-when-cross-origin"
        );
    }
}

#[tokio::test]
async fn test_index_lists_endpoints() {
    let router = make_router();
    let response = get(&router, "/").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["endpoints"]["health"], "/health");
}

#[tokio::test]
async fn test_ready_reports_counters() {
    let router = make_router();
    let response = get(&router, "/health/ready").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "ready");
    assert_eq!(json["cache_size"], 0);
    assert_eq!(json["ws_connections"], 0);
    assert_eq!(json["cache_hit_rate"], "0.0%");
}

// =========================================================================
// Catalog
// =========================================================================

#[tokio::test]
async fn test_catalog_filters_by_category() {
    let router = make_router();

    let all = body_to_json(get(&router, "/api/simulations").await.into_body()).await;
    assert_eq!(all.as_array().unwrap().len(), 3);

    let response = get(&router, "/api/simulations?category=circuits").await;
    assert_eq!(response.headers()["cache-control"], "no-cache, must-revalidate");
    let circuits = body_to_json(response.into_body()).await;
    let ids: Vec<&str> = circuits
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["rc_filter"]);
}

#[tokio::test]
async fn test_categories_lists_distinct_categories() {
    let router = make_router();
    let response = get(&router, "/api/categories").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["cache-control"], "public, max-age=3600");
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json, json!(["circuits", "test"]));
}

#[tokio::test]
async fn test_get_simulation_includes_parameters() {
    let router = make_router();
    let response = get(&router, "/api/simulations/rc_filter").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["id"], "rc_filter");
    let names: Vec<&str> = json["parameters"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["freq", "rc_ms", "amplitude"]);
}

#[tokio::test]
async fn test_unknown_simulation_returns_404() {
    let router = make_router();
    let response = get(&router, "/api/simulations/nope").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["code"], "not_found");
}

// =========================================================================
// Simulation pipeline
// =========================================================================

#[tokio::test]
async fn test_rc_filter_second_request_hits_cache() {
    let router = make_router();
    let uri = "/api/simulations/rc_filter/execute";

    let first = post_json(
        &router,
        uri,
        &json!({"action": "update", "params": {"freq": 100, "rc_ms": 1.0}}),
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);
    let first = body_to_json(first.into_body()).await;
    assert_eq!(first["success"], true);
    assert_eq!(first["cache_hit"], false);
    assert_eq!(first["error"], Value::Null);

    // Same parameters, different key order and numeric form.
    let second = post_json(
        &router,
        uri,
        &json!({"action": "update", "params": {"rc_ms": 1.0, "freq": 100.0}}),
    )
    .await;
    let second = body_to_json(second.into_body()).await;
    assert_eq!(second["cache_hit"], true);
    assert_eq!(first["data"], second["data"]);

    let plots = first["data"]["plots"].as_array().unwrap();
    assert_eq!(plots.len(), 2);
    assert_eq!(first["data"]["metadata"]["status"], "TRANSITIONING");
}

#[tokio::test]
async fn test_state_uses_defaults_and_is_cached() {
    let router = make_router();

    let first = body_to_json(get(&router, "/api/simulations/rc_filter/state").await.into_body()).await;
    let second =
        body_to_json(get(&router, "/api/simulations/rc_filter/state").await.into_body()).await;

    assert_eq!(first["data"]["parameters"]["freq"], 100.0);
    assert_eq!(first["cache_hit"], false);
    assert_eq!(second["cache_hit"], true);
}

#[tokio::test]
async fn test_update_endpoint_accepts_params() {
    let router = make_router();
    let response = post_json(
        &router,
        "/api/simulations/rc_filter/update",
        &json!({"params": {"freq": 200}}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["data"]["parameters"]["freq"], 200.0);
    assert_eq!(json["data"]["metadata"]["status"], "TRANSITIONING");
}

#[tokio::test]
async fn test_stepping_is_never_cached() {
    let router = make_router();
    let uri = "/api/simulations/rc_filter/execute";
    let body = json!({"action": "advance", "params": {}});

    for _ in 0..2 {
        let json = body_to_json(post_json(&router, uri, &body).await.into_body()).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["cache_hit"], false);
    }
}

#[tokio::test]
async fn test_unknown_action_returns_400() {
    let router = make_router();
    let response = post_json(
        &router,
        "/api/simulations/rc_filter/execute",
        &json!({"action": "teleport", "params": {}}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["code"], "unknown_action");
}

#[tokio::test]
async fn test_nested_parameter_is_rejected() {
    let router = make_router();
    let response = post_json(
        &router,
        "/api/simulations/rc_filter/execute",
        &json!({"action": "update", "params": {"freq": [1, 2]}}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["code"], "invalid_parameter");
    assert_eq!(json["error"], "Invalid parameters provided");
    assert!(json["details"].as_str().unwrap().contains("freq"));
}

#[tokio::test]
async fn test_malformed_body_is_structured_400() {
    let router = make_router();
    let response = router
        .clone()
        .oneshot(
            Request::post("/api/simulations/rc_filter/execute")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["code"], "invalid_parameter");
}

#[tokio::test]
async fn test_simulator_fault_returns_500_with_details() {
    let router = make_router();
    let response = get(&router, "/api/simulations/faulty/state").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["code"], "simulator_fault");
    assert_eq!(json["error"], "Execution failed");
    assert_eq!(json["details"], "solving state equations");
    assert!(!json.to_string().contains("matrix is singular"));
}

#[tokio::test]
async fn test_slow_simulation_times_out_with_504() {
    let mut config = SimgateConfig::default();
    config.executor.timeout_seconds = 1;
    let router = build_router(make_state(&config));

    let started = std::time::Instant::now();
    let response = get(&router, "/api/simulations/sluggish/state").await;

    assert!(started.elapsed() < Duration::from_millis(1450));
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["code"], "execution_timeout");
    assert!(json["details"].as_str().is_some());
}

// =========================================================================
// Admission control
// =========================================================================

#[tokio::test]
async fn test_burst_limit_returns_429_with_retry_after() {
    let mut config = SimgateConfig::default();
    config.rate_limit.burst_size = 2;
    let router = build_router(make_state(&config));

    for _ in 0..2 {
        let response = get(&router, "/api/simulations/rc_filter/state").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = get(&router, "/api/simulations/rc_filter/state").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_header: u64 = response.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_header >= 1);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["code"], "rate_limited");
    assert!(json["retry_after"].as_f64().unwrap() >= 1.0);

    // Health checks are not subject to admission control.
    assert_eq!(get(&router, "/health").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_forwarded_for_separates_clients_when_trusted() {
    let mut config = SimgateConfig::default();
    config.rate_limit.burst_size = 1;
    config.server.trust_forwarded_for = true;
    let router = build_router(make_state(&config));

    for client in ["10.0.0.1", "10.0.0.2"] {
        let response = router
            .clone()
            .oneshot(
                Request::get("/api/simulations/rc_filter/state")
                    .header("x-forwarded-for", client)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

// =========================================================================
// Export and analytics
// =========================================================================

#[tokio::test]
async fn test_export_csv_has_trace_columns() {
    let router = make_router();
    let response = get(&router, "/api/simulations/rc_filter/export/csv").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/csv");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=rc_filter_data.csv"
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let header = text.lines().next().unwrap();
    assert!(header.starts_with("index,Input (Square Wave)_x,Input (Square Wave)_y"));
    // Header plus one row per time sample.
    assert_eq!(text.lines().count(), 1001);
}

#[tokio::test]
async fn test_analytics_reflects_requests() {
    let state = make_state(&SimgateConfig::default());
    let router = build_router(Arc::clone(&state));

    get(&router, "/api/simulations/rc_filter/state").await;
    get(&router, "/api/simulations/rc_filter/state").await;
    get(&router, "/api/simulations/nope").await;

    let json = body_to_json(get(&router, "/api/analytics").await.into_body()).await;
    let performance = &json["performance"];
    assert_eq!(performance["total_requests"], 3);
    assert_eq!(performance["total_errors"], 1);
    assert_eq!(performance["cache_hits"], 1);
    assert_eq!(performance["cache_misses"], 1);
    assert_eq!(
        performance["requests_by_endpoint"]["/api/simulations/{id}/state"],
        2
    );
    assert_eq!(json["cache"]["size"], 1);
    assert_eq!(json["rate_limiter"]["total_requests"], 2);
    assert_eq!(json["websocket"]["active_connections"], 0);
}
