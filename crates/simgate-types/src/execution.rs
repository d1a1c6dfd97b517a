//! Outcome of one bounded simulator execution.
//!
//! [`ExecutionResult`] is produced exactly once per executor run and is
//! never mutated afterwards. Every failure mode -- a classified simulator
//! fault, a panic, or an elapsed deadline -- is a variant here, so no
//! error escapes the executor boundary untyped.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Classification of a simulator fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// A caller-supplied parameter had the wrong type or shape.
    InvalidParameter,
    /// A caller-supplied parameter had a well-typed but unusable value.
    InvalidValue,
    /// Any other fault; `detail` carries the full diagnostic chain.
    Unclassified,
    /// The worker panicked.
    Panicked,
}

impl FaultKind {
    /// Whether the fault was caused by the caller's input.
    pub const fn is_caller_fault(self) -> bool {
        matches!(self, Self::InvalidParameter | Self::InvalidValue)
    }
}

/// Result of a bounded execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult<T> {
    /// The job finished before its deadline.
    Success {
        /// The job's return value.
        value: T,
    },
    /// The deadline elapsed first; the job was abandoned.
    Timeout {
        /// The deadline that was applied, in milliseconds.
        deadline_ms: u64,
    },
    /// The job failed.
    Error {
        /// Fault classification.
        kind: FaultKind,
        /// Short human-readable summary.
        message: String,
        /// Diagnostic detail for operators (error chain, panic payload).
        detail: Option<String>,
    },
}

impl<T> ExecutionResult<T> {
    /// Whether the job completed successfully.
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Whether the deadline elapsed.
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The fault classification, if this is an error.
    pub const fn fault_kind(&self) -> Option<FaultKind> {
        match self {
            Self::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Transform the success value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ExecutionResult<U> {
        match self {
            Self::Success { value } => ExecutionResult::Success { value: f(value) },
            Self::Timeout { deadline_ms } => ExecutionResult::Timeout { deadline_ms },
            Self::Error {
                kind,
                message,
                detail,
            } => ExecutionResult::Error {
                kind,
                message,
                detail,
            },
        }
    }

    /// The success value, if any.
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Success { value } => Some(value),
            _ => None,
        }
    }
}
