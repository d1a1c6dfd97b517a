//! Gateway API server for the Simgate simulation backend.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **REST endpoints** for the simulation catalog, state queries,
//!   one-shot actions, parameter updates, and CSV export
//! - **`WebSocket` endpoint** (`/api/simulations/{id}/ws`) for live
//!   parameter updates pushed to every subscriber of a simulation
//! - **Health and analytics endpoints** reporting uptime, latency
//!   percentiles, cache, rate limiter, and connection counters
//!
//! # Architecture
//!
//! The [`Gateway`] owns one instance of every serving component and
//! drives each request through admission control, the result cache,
//! bounded execution, and serialization. Handlers are thin: they extract
//! the request, call the gateway, and shape the response. A route layer
//! records a metric for every request, and every response carries the
//! security headers.
//!
//! [`Gateway`]: gateway::Gateway

pub mod error;
pub mod export;
pub mod gateway;
pub mod handlers;
pub mod maintenance;
pub mod middleware;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use error::GatewayError;
pub use gateway::{Action, Gateway, Outcome};
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use state::AppState;
