//! Execution trace — append-only audit record of one workflow run.
//!
//! One record is written immediately after each stage reaches its terminal
//! outcome (success or failure), including the stage's wall-clock duration.
//! The trace is owned exclusively by the run's orchestrator while the run is
//! live and is frozen into the WorkflowResult when the run completes; it is
//! never rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::StageId;

/// Terminal outcome tag for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Succeeded,
    Failed { reason: String },
}

impl StageOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// One audit record: which stage ran, when, for how long, and how it ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageId,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: StageOutcome,
}

/// Append-only list of stage records for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionTrace {
    records: Vec<StageRecord>,
}

impl ExecutionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record. Records are never modified or removed afterwards.
    pub fn record(&mut self, record: StageRecord) {
        tracing::debug!(
            stage = %record.stage,
            duration_ms = record.duration_ms,
            success = record.outcome.is_success(),
            "Stage recorded"
        );
        self.records.push(record);
    }

    /// Read-only view of the records, in append order.
    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    /// Stages that completed successfully, in execution order.
    pub fn stages_succeeded(&self) -> Vec<StageId> {
        self.records
            .iter()
            .filter(|r| r.outcome.is_success())
            .map(|r| r.stage)
            .collect()
    }

    /// The record for `stage`, if that stage ran.
    pub fn for_stage(&self, stage: StageId) -> Option<&StageRecord> {
        self.records.iter().find(|r| r.stage == stage)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
