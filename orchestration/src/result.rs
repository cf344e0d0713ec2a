//! The aggregate result of one workflow run.
//!
//! Callers always receive a `WorkflowResult` — including on stage failure
//! and on low-confidence routing. The only exception is report validation,
//! which rejects before the run starts.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StageFailure;
use crate::trace::ExecutionTrace;
use crate::types::{
    ActionResult, ClassificationResult, DecisionResult, RetrievalResult, StageId, WorkflowStatus,
};

/// Aggregate of every stage's output plus run metadata.
///
/// Partial results are kept: whatever stages completed before a failure or
/// a routing decision are present, the rest are `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    /// Idempotency and trace-association key for this run.
    pub correlation_id: Uuid,
    pub status: WorkflowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<ClassificationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<RetrievalResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<DecisionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionResult>,
    /// Stages that completed successfully, in pipeline order.
    pub stages_executed: Vec<StageId>,
    /// True when the confidence gate stopped the run for manual handling.
    pub routed_to_human: bool,
    /// True when the run was cancelled between stages. Cancellation never
    /// interrupts Execute once it has begun.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
    /// Terminal stage failure, when one ended the run early.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StageFailure>,
    /// Append-only audit record of every stage that ran.
    pub trace: ExecutionTrace,
}

impl WorkflowResult {
    /// Whether every pipeline stage ran and succeeded.
    pub fn is_complete(&self) -> bool {
        self.status == WorkflowStatus::Success && self.stages_executed == StageId::all()
    }
}
