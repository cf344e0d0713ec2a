//! Deterministic pipeline logic for exception-resolution workflows.
//!
//! This library holds everything about the workflow that is decidable
//! without a network:
//! - the domain types flowing between stages
//! - the per-run state machine and its legal-transition table
//! - the confidence gate and escalation policy (pure decision functions)
//! - the append-only execution trace
//! - the retry/backoff policy applied by stage clients
//! - the idempotency cache shared across runs
//!
//! The stage clients, orchestrator loop, and HTTP surface live in the
//! `workflow-agents` crate and build on these pieces.

pub mod error;
pub mod gates;
pub mod idempotency;
pub mod result;
pub mod retry;
pub mod state_machine;
pub mod trace;
pub mod types;

// Re-export the error taxonomy
pub use error::{FailureKind, StageError, StageFailure, ValidationError};

// Re-export the gate types
pub use gates::{
    ConfidenceGate, EscalationConfig, EscalationPolicy, GateConfig, GateDecision, PolicyDecision,
};

// Re-export the idempotency types
pub use idempotency::{Admission, IdempotencyCache, PendingResult, RunGuard};

// Re-export the run result
pub use result::WorkflowResult;

// Re-export the retry policy
pub use retry::RetryPolicy;

// Re-export the state machine types
pub use state_machine::{IllegalTransition, StateMachine, TransitionRecord, WorkflowState};

// Re-export the trace types
pub use trace::{ExecutionTrace, StageOutcome, StageRecord};

// Re-export the domain types
pub use types::{
    ActionResult, ClassificationResult, DecisionResult, ExceptionReport, PackageScanResult,
    RankedLabel, RetrievalResult, StageId, TimeOfDay, WeatherCondition, WorkflowStatus,
};
