//! Error types for the gateway.
//!
//! [`GatewayError`] covers every way a simulation request can fail. It
//! converts into the structured [`ApiResponse`] body that clients always
//! receive, and into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use simgate_types::{ApiResponse, ErrorCode, FaultKind, ParamError};

/// Hint returned with every execution timeout.
const TIMEOUT_HINT: &str = "Try reducing simulation complexity or parameters";

/// Errors that can occur while serving a simulation request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    /// Admission control rejected the request.
    #[error("rate limit exceeded, retry after {retry_after:.0}s")]
    RateLimited {
        /// Seconds until the client may retry.
        retry_after: f64,
    },

    /// No simulator is registered under the requested id.
    #[error("simulation '{0}' not found")]
    NotFound(String),

    /// The requested action is not recognized.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// The request body or its parameters were rejected.
    #[error("invalid parameters: {0}")]
    InvalidParameter(String),

    /// The computation exceeded its deadline.
    #[error("execution timed out after {deadline_ms} ms")]
    Timeout {
        /// The deadline that was applied.
        deadline_ms: u64,
    },

    /// The simulator failed during computation.
    #[error("{message}")]
    SimulatorFault {
        /// Client-facing summary.
        message: String,
        /// Top-level cause shown to the client. The full chain is only logged.
        detail: Option<String>,
    },

    /// An unexpected server-side failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Machine-readable reason.
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::RateLimited { .. } => ErrorCode::RateLimited,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::UnknownAction(_) => ErrorCode::UnknownAction,
            Self::InvalidParameter(_) => ErrorCode::InvalidParameter,
            Self::Timeout { .. } => ErrorCode::ExecutionTimeout,
            Self::SimulatorFault { .. } => ErrorCode::SimulatorFault,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code().http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Map an executor fault onto the gateway taxonomy.
    ///
    /// Simulator faults keep only the first line of the diagnostic, which is
    /// the outermost error context. Panic payloads are dropped entirely.
    pub fn from_fault(kind: FaultKind, message: String, detail: Option<String>) -> Self {
        if kind.is_caller_fault() {
            return Self::InvalidParameter(detail.unwrap_or(message));
        }
        let detail = if matches!(kind, FaultKind::Panicked) {
            None
        } else {
            detail
                .as_deref()
                .and_then(|d| d.lines().next())
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_owned)
        };
        Self::SimulatorFault { message, detail }
    }

    /// The structured body sent to the client.
    pub fn to_api_response(&self) -> ApiResponse {
        let code = self.code();
        match self {
            Self::RateLimited { retry_after } => {
                ApiResponse::failure(code, "Rate limit exceeded", Some(self.to_string()))
                    .with_retry_after(*retry_after)
            }
            Self::NotFound(_) | Self::UnknownAction(_) | Self::Internal(_) => {
                ApiResponse::failure(code, self.to_string(), None)
            }
            Self::InvalidParameter(detail) => ApiResponse::failure(
                code,
                "Invalid parameters provided",
                Some(detail.clone()),
            ),
            Self::Timeout { .. } => {
                ApiResponse::failure(code, self.to_string(), Some(String::from(TIMEOUT_HINT)))
            }
            Self::SimulatorFault { message, detail } => {
                ApiResponse::failure(code, message.clone(), detail.clone())
            }
        }
    }
}

impl From<ParamError> for GatewayError {
    fn from(err: ParamError) -> Self {
        Self::InvalidParameter(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, axum::Json(self.to_api_response())).into_response();
        if let Self::RateLimited { retry_after } = self {
            let secs = format!("{:.0}", retry_after.ceil());
            if let Ok(value) = HeaderValue::from_str(&secs) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_error_code() {
        assert_eq!(
            GatewayError::NotFound(String::from("x")).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::Timeout { deadline_ms: 30_000 }.status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GatewayError::RateLimited { retry_after: 2.0 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            GatewayError::UnknownAction(String::from("fly")).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn caller_faults_become_invalid_parameter() {
        let err = GatewayError::from_fault(
            FaultKind::InvalidValue,
            String::from("Invalid value in parameters"),
            Some(String::from("rc_ms must be positive")),
        );
        assert_eq!(
            err,
            GatewayError::InvalidParameter(String::from("rc_ms must be positive"))
        );

        let err = GatewayError::from_fault(FaultKind::Panicked, String::from("boom"), None);
        assert_eq!(err.code(), ErrorCode::SimulatorFault);
    }

    #[test]
    fn simulator_fault_shows_only_outer_context() {
        let chain = format!(
            "{:?}",
            anyhow::anyhow!("matrix is singular").context("solving state equations")
        );
        let body = GatewayError::from_fault(
            FaultKind::Unclassified,
            String::from("Execution failed"),
            Some(chain),
        )
        .to_api_response();
        assert_eq!(body.error.as_deref(), Some("Execution failed"));
        assert_eq!(body.details.as_deref(), Some("solving state equations"));

        let body = GatewayError::from_fault(
            FaultKind::Panicked,
            String::from("Execution failed: simulator panicked"),
            Some(String::from("index out of range")),
        )
        .to_api_response();
        assert_eq!(body.details, None);
    }

    #[test]
    fn rate_limited_response_carries_retry_hint() {
        let response = GatewayError::RateLimited { retry_after: 1.2 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "2");

        let body = GatewayError::RateLimited { retry_after: 1.2 }.to_api_response();
        assert!(!body.success);
        assert_eq!(body.code, Some(ErrorCode::RateLimited));
        assert_eq!(body.retry_after, Some(1.2));
    }

    #[test]
    fn timeout_response_suggests_retry() {
        let body = GatewayError::Timeout { deadline_ms: 50 }.to_api_response();
        assert_eq!(body.details.as_deref(), Some(TIMEOUT_HINT));
        assert!(!body.cache_hit);
    }
}
