//! Gateway request and response shapes.
//!
//! These are the JSON bodies exchanged with clients over REST and the
//! `WebSocket` push channel. Every rejection carries a machine-readable
//! [`ErrorCode`] and, where it applies, a numeric retry hint.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Machine-readable reason attached to every failed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// A caller-supplied value failed type or range validation.
    InvalidParameter,
    /// The bounded computation exceeded its deadline.
    ExecutionTimeout,
    /// The simulator raised during computation.
    SimulatorFault,
    /// Admission was denied by the rate limiter.
    RateLimited,
    /// The requested simulation is not registered.
    NotFound,
    /// The requested action is not recognized.
    UnknownAction,
    /// An unexpected server-side failure.
    Internal,
}

impl ErrorCode {
    /// HTTP status code conventionally associated with this reason.
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidParameter | Self::UnknownAction => 400,
            Self::NotFound => 404,
            Self::RateLimited => 429,
            Self::ExecutionTimeout => 504,
            Self::SimulatorFault | Self::Internal => 500,
        }
    }
}

/// Structured response returned for every simulation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ApiResponse {
    /// Whether the request succeeded.
    pub success: bool,
    /// The serialized simulation state on success.
    pub data: Option<serde_json::Value>,
    /// Short error summary on failure.
    pub error: Option<String>,
    /// Additional detail (retry suggestion, validation message).
    pub details: Option<String>,
    /// Whether `data` was served from the result cache.
    pub cache_hit: bool,
    /// Machine-readable failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub code: Option<ErrorCode>,
    /// Seconds to wait before retrying, for rate-limited requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub retry_after: Option<f64>,
}

impl ApiResponse {
    /// A successful response carrying `data`.
    pub const fn ok(data: serde_json::Value, cache_hit: bool) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            details: None,
            cache_hit,
            code: None,
            retry_after: None,
        }
    }

    /// A failed response.
    pub fn failure(code: ErrorCode, error: impl Into<String>, details: Option<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            details,
            cache_hit: false,
            code: Some(code),
            retry_after: None,
        }
    }

    /// Attach a retry hint in seconds.
    #[must_use]
    pub const fn with_retry_after(mut self, seconds: f64) -> Self {
        self.retry_after = Some(seconds);
        self
    }
}

/// One-shot simulation request body: `{action, params}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SimulationRequest {
    /// Action name (`init`, `update`, `run`, `reset`, `advance`, ...).
    pub action: String,
    /// Raw parameter object; validated by the gateway.
    #[serde(default)]
    #[ts(type = "Record<string, unknown>")]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// Parameter update body: `{params}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct UpdateRequest {
    /// Raw parameter object; validated by the gateway.
    #[serde(default)]
    #[ts(type = "Record<string, unknown>")]
    pub params: serde_json::Map<String, serde_json::Value>,
}

fn default_push_action() -> String {
    String::from("update")
}

/// Inbound message on a push subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PushRequest {
    /// `update` (default), `reset`, or `ping`.
    #[serde(default = "default_push_action")]
    pub action: String,
    /// Parameter updates.
    #[serde(default)]
    #[ts(type = "Record<string, unknown>")]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// Kind of an outbound push frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// State sent right after subscribing.
    Initial,
    /// Reply to the requester's own parameter update.
    Update,
    /// Reply to a reset request.
    Reset,
    /// State computed for another subscriber of the same simulation.
    Broadcast,
    /// Reply to an application-level ping.
    Pong,
    /// A rejected or failed inbound message.
    Error,
}

/// Outbound message on a push subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PushFrame {
    /// Whether the frame reports success.
    pub success: bool,
    /// Frame kind.
    #[serde(rename = "type")]
    pub kind: FrameKind,
    /// Serialized simulation state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub data: Option<serde_json::Value>,
    /// Error summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub error: Option<String>,
    /// Machine-readable failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub code: Option<ErrorCode>,
    /// Whether `data` came from the result cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub cache_hit: Option<bool>,
}

impl PushFrame {
    /// A successful state frame.
    pub const fn state(kind: FrameKind, data: serde_json::Value, cache_hit: bool) -> Self {
        Self {
            success: true,
            kind,
            data: Some(data),
            error: None,
            code: None,
            cache_hit: Some(cache_hit),
        }
    }

    /// An error frame.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            kind: FrameKind::Error,
            data: None,
            error: Some(message.into()),
            code: Some(code),
            cache_hit: None,
        }
    }

    /// A pong frame.
    pub const fn pong() -> Self {
        Self {
            success: true,
            kind: FrameKind::Pong,
            data: None,
            error: None,
            code: None,
            cache_hit: None,
        }
    }
}

/// Catalog metadata describing one registered simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SimulationInfo {
    /// Stable simulation identifier used in URLs and cache keys.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// One-line description.
    pub description: String,
    /// Catalog category.
    pub category: String,
}
