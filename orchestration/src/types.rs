//! Domain types shared across the workflow pipeline.
//!
//! These are the *internal* representations — stage clients normalize the
//! remote services' wire formats into these types at the transport boundary,
//! so everything downstream of a stage client works with validated data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Identifier for one of the four ordered pipeline stages.
///
/// Stage order is total: Classify < Retrieve < Decide < Execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Classify,
    Retrieve,
    Decide,
    Execute,
}

impl StageId {
    /// All stages in pipeline order.
    pub fn all() -> &'static [StageId] {
        &[
            Self::Classify,
            Self::Retrieve,
            Self::Decide,
            Self::Execute,
        ]
    }

    /// Stable lowercase name, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Classify => "classify",
            Self::Retrieve => "retrieve",
            Self::Decide => "decide",
            Self::Execute => "execute",
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall outcome of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Every invoked stage succeeded.
    Success,
    /// Classification succeeded but a later stage failed, or the run was
    /// routed to a human before completing the pipeline.
    Partial,
    /// Classification itself failed — nothing downstream ran.
    Failed,
}

/// Weather at the time of the delivery exception.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeatherCondition {
    #[default]
    Clear,
    Rain,
    Snow,
    Storm,
}

/// Result of the package barcode scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageScanResult {
    #[default]
    Ok,
    Unreadable,
    Damaged,
}

/// Coarse time-of-day bucket for the exception event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeOfDay {
    #[default]
    Morning,
    Afternoon,
    Evening,
}

fn default_attempts() -> u32 {
    1
}

/// Inbound exception report — the single input to a workflow run.
///
/// Immutable once accepted. `correlation_id` is caller-supplied or assigned
/// by the orchestrator before the run enters the state machine; it is the
/// idempotency and trace-association key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionReport {
    /// Free-text note from the driver. Required non-empty.
    pub driver_note: String,
    /// GPS deviation from the planned route, in kilometers.
    #[serde(default)]
    pub gps_deviation_km: f64,
    /// Weather at the time of the exception.
    #[serde(default)]
    pub weather_condition: WeatherCondition,
    /// Number of delivery attempts made so far.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Delay accumulated at the hub, in minutes.
    #[serde(default)]
    pub hub_delay_minutes: i64,
    /// Package scan outcome.
    #[serde(default)]
    pub package_scan_result: PackageScanResult,
    /// Time-of-day bucket.
    #[serde(default)]
    pub time_of_day: TimeOfDay,
    /// Caller-supplied correlation identifier. Assigned by the orchestrator
    /// when absent; stable across retries of the same logical exception.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

impl ExceptionReport {
    /// Validate the report before it is admitted to the pipeline.
    ///
    /// Rejection here happens *before* INIT — it is the only path on which
    /// a caller receives an error instead of a structured WorkflowResult.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.driver_note.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "driver_note",
            });
        }
        if !self.gps_deviation_km.is_finite() || self.gps_deviation_km < 0.0 {
            return Err(ValidationError::OutOfDomain {
                field: "gps_deviation_km",
                value: self.gps_deviation_km.to_string(),
            });
        }
        if self.hub_delay_minutes < 0 {
            return Err(ValidationError::OutOfDomain {
                field: "hub_delay_minutes",
                value: self.hub_delay_minutes.to_string(),
            });
        }
        Ok(())
    }
}

/// One (label, confidence) pair from the classifier's ranked output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedLabel {
    pub label: String,
    pub confidence: f64,
}

/// Normalized output of the Classify stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Top exception label.
    pub label: String,
    /// Probability in [0, 1] — enforced by the stage client.
    pub confidence: f64,
    /// Remaining candidates, ordered by descending confidence.
    pub ranked_alternatives: Vec<RankedLabel>,
}

/// Normalized output of the Retrieve stage.
///
/// `found = false` is a valid non-error outcome: no matching policy document
/// exists for the classified exception type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub found: bool,
    /// Identifier of the matched policy document, when found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    /// Full text of the matched policy document, when found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_text: Option<String>,
    /// Similarity score in [0, 1], when found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f64>,
}

impl RetrievalResult {
    /// The empty result: no matching policy document.
    pub fn not_found() -> Self {
        Self {
            found: false,
            document_id: None,
            document_text: None,
            relevance: None,
        }
    }
}

/// Normalized output of the Decide stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionResult {
    pub recommended_action: String,
    pub driver_instruction: String,
    pub customer_message: String,
    /// When true, automatic remediation must be short-circuited in Execute:
    /// the audit log is still written, the notify/auto-close branch is not.
    pub requires_escalation: bool,
    /// Decision confidence in [0, 1] — enforced by the stage client.
    pub confidence: f64,
    pub reasoning_summary: String,
}

/// Normalized output of the Execute stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    /// Whether the operational log record was written.
    pub log_written: bool,
    /// Whether the customer/dispatcher notification was sent.
    pub notification_sent: bool,
    /// Whether the case was flagged for human handling.
    pub escalated: bool,
    /// When the action executor performed its side effects.
    pub executed_at: DateTime<Utc>,
}
