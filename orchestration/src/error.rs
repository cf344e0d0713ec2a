//! Error taxonomy for the workflow pipeline.
//!
//! The split matters for propagation:
//! - [`ValidationError`] — rejected before the run starts; the only error a
//!   caller ever sees raw.
//! - [`StageError`] — produced by a stage client for a single invocation.
//!   Transient variants are retried inside the client and never escape it;
//!   what escapes is the terminal outcome of the whole call.
//! - [`StageFailure`] — a stage's retries are exhausted or a non-retryable
//!   error occurred. Terminal for that stage, recorded in the trace, and
//!   folded into the WorkflowResult status rather than thrown.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::StageId;

/// Malformed or missing input on the inbound report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("required field `{field}` is missing or empty")]
    MissingField { field: &'static str },
    #[error("field `{field}` is outside its domain: {value}")]
    OutOfDomain { field: &'static str, value: String },
}

/// Error from a single stage invocation attempt.
#[derive(Debug, Clone, Error)]
pub enum StageError {
    /// Could not reach the stage endpoint.
    #[error("connection failed: {0}")]
    Connect(String),
    /// The stage did not answer within its timeout.
    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    /// The stage asked us to back off (HTTP 429).
    #[error("rate limited by stage endpoint")]
    RateLimited,
    /// The stage reported a server-side fault (HTTP 5xx).
    #[error("stage returned server error {status}")]
    Server { status: u16 },
    /// The stage rejected the request (HTTP 4xx other than 429).
    #[error("stage rejected request with status {status}: {detail}")]
    Rejected { status: u16, detail: String },
    /// The response arrived but failed schema or domain validation.
    /// A malformed response is an error, not a degraded success.
    #[error("invalid stage response: {0}")]
    InvalidResponse(String),
}

impl StageError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Connection failures, timeouts, 5xx and 429 are transient; everything
    /// else surfaces immediately without retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::Timeout { .. } | Self::RateLimited | Self::Server { .. }
        )
    }
}

/// How a stage ultimately failed, collapsed to the categories the HTTP
/// surface cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Exhausted retries on timeouts.
    Timeout,
    /// Endpoint unreachable.
    Unavailable,
    /// The stage answered, but unusably (5xx, rejection, bad payload).
    Upstream,
}

/// Terminal failure of one stage, after retry policy has been applied.
///
/// Carried inside the WorkflowResult (never thrown past the orchestrator)
/// so callers always receive a structured result.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("stage {stage} failed after {attempts} attempt(s): {message}")]
pub struct StageFailure {
    pub stage: StageId,
    pub kind: FailureKind,
    /// Attempts made, including the first.
    pub attempts: u32,
    /// Human-readable description of the final error.
    pub message: String,
}

impl StageFailure {
    /// Build from the last error a stage client observed.
    pub fn from_stage_error(stage: StageId, attempts: u32, err: &StageError) -> Self {
        let kind = match err {
            StageError::Timeout { .. } => FailureKind::Timeout,
            StageError::Connect(_) => FailureKind::Unavailable,
            StageError::RateLimited
            | StageError::Server { .. }
            | StageError::Rejected { .. }
            | StageError::InvalidResponse(_) => FailureKind::Upstream,
        };
        Self {
            stage,
            kind,
            attempts,
            message: err.to_string(),
        }
    }
}
