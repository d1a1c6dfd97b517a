//! Serving components for the Simgate simulation backend.
//!
//! Each component here is independent and owns its own state behind a
//! single short-lived lock. The gateway in `simgate-server` composes them
//! into the request pipeline.
//!
//! # Modules
//!
//! - [`cache`] -- LRU result cache with TTL expiry.
//! - [`config`] -- Configuration loading from `simgate.yaml` into
//!   strongly-typed structs.
//! - [`connections`] -- Push subscription registry and broadcast.
//! - [`downsample`] -- Peak-preserving series reduction.
//! - [`executor`] -- Deadline-bounded execution of simulator jobs.
//! - [`monitor`] -- Latency percentiles, counters, and the request log.
//! - [`plot`] -- Plotly-shaped trace and layout builders.
//! - [`rate_limiter`] -- Sliding-window admission control.
//! - [`serializer`] -- Raw result to JSON-safe tree conversion.
//! - [`simulator`] -- The [`Simulator`] contract, parameter schemas, and
//!   the registry.
//!
//! [`Simulator`]: simulator::Simulator

pub mod cache;
pub mod config;
pub mod connections;
pub mod downsample;
pub mod executor;
pub mod monitor;
pub mod plot;
pub mod rate_limiter;
pub mod serializer;
pub mod simulator;
