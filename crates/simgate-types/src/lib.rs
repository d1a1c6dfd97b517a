//! Shared type definitions for the Simgate simulation-serving backend.
//!
//! This crate is the single source of truth for the data that crosses
//! crate boundaries: client parameters, raw simulator results, execution
//! outcomes, request metrics, and the gateway's wire shapes. Wire types
//! flow downstream to `TypeScript` via `ts-rs` for the web frontend.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers
//! - [`params`] -- Caller-supplied scalar parameter sets
//! - [`value`] -- Raw simulator result sum type
//! - [`execution`] -- Bounded execution outcomes
//! - [`api`] -- REST and push request/response bodies
//! - [`metric`] -- Per-request observability records

pub mod api;
pub mod execution;
pub mod ids;
pub mod metric;
pub mod params;
pub mod value;

// Re-export all public types at crate root for convenience.
pub use api::{
    ApiResponse, ErrorCode, FrameKind, PushFrame, PushRequest, SimulationInfo, SimulationRequest,
    UpdateRequest,
};
pub use execution::{ExecutionResult, FaultKind};
pub use ids::ConnectionId;
pub use metric::RequestMetric;
pub use params::{ParamError, ParamValue, ParameterSet};
pub use value::{Complex, ComplexArray, NdArray, Opaque, Value};
