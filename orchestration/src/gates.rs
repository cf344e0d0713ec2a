//! Confidence gate and escalation policy — deterministic decision functions.
//!
//! Both gates are pure: they read their inputs and a fixed configuration and
//! produce a branch decision. No side effects, no per-run state. The
//! orchestrator is the only caller and acts on the decisions.

use serde::{Deserialize, Serialize};

use crate::types::{ClassificationResult, DecisionResult, ExceptionReport};

/// Decision of the confidence gate, evaluated after Classify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    /// Confidence is sufficient — continue down the pipeline.
    Proceed,
    /// Confidence is too low to drive irreversible downstream actions —
    /// stop here and flag the case for manual handling.
    RouteToHuman { confidence: f64, threshold: f64 },
}

/// Configuration for the confidence gate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GateConfig {
    /// Classification confidence below this routes the case to a human.
    pub low_confidence_threshold: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            low_confidence_threshold: 0.5,
        }
    }
}

/// The confidence gate: maps a classification result to proceed/route.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceGate {
    config: GateConfig,
}

impl ConfidenceGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    /// Evaluate the gate for a classification result.
    pub fn decide(&self, classification: &ClassificationResult) -> GateDecision {
        if classification.confidence < self.config.low_confidence_threshold {
            GateDecision::RouteToHuman {
                confidence: classification.confidence,
                threshold: self.config.low_confidence_threshold,
            }
        } else {
            GateDecision::Proceed
        }
    }
}

/// Decision of the escalation policy, evaluated after Decide.
///
/// The branch never skips Execute — it only changes which sub-actions
/// Execute performs (audit log always, notify/auto-close only on
/// `AutoResolve`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecision {
    /// Resolve automatically: log, notify, close.
    AutoResolve,
    /// Route to a human: log and flag, suppress notify/auto-close.
    Escalate { reason: String },
}

impl PolicyDecision {
    pub fn is_escalation(&self) -> bool {
        matches!(self, Self::Escalate { .. })
    }
}

/// Configuration for the escalation policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Decision confidence below this escalates even without an explicit
    /// escalation request from the decision stage.
    pub decision_confidence_threshold: f64,
    /// Delivery attempts at or beyond this cap are treated as a
    /// safety-relevant condition and escalate.
    pub max_attempts: u32,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            decision_confidence_threshold: 0.6,
            max_attempts: 3,
        }
    }
}

/// The escalation policy: combines the decision-stage output with business
/// rules over the raw report.
#[derive(Debug, Clone, Default)]
pub struct EscalationPolicy {
    config: EscalationConfig,
}

impl EscalationPolicy {
    pub fn new(config: EscalationConfig) -> Self {
        Self { config }
    }

    /// Evaluate the policy for a decision result and the raw report.
    pub fn decide(&self, decision: &DecisionResult, report: &ExceptionReport) -> PolicyDecision {
        if decision.requires_escalation {
            return PolicyDecision::Escalate {
                reason: "decision stage requested escalation".into(),
            };
        }
        if decision.confidence < self.config.decision_confidence_threshold {
            return PolicyDecision::Escalate {
                reason: format!(
                    "decision confidence {:.2} below threshold {:.2}",
                    decision.confidence, self.config.decision_confidence_threshold
                ),
            };
        }
        if report.attempts >= self.config.max_attempts {
            return PolicyDecision::Escalate {
                reason: format!(
                    "{} delivery attempts at or above cap {}",
                    report.attempts, self.config.max_attempts
                ),
            };
        }
        PolicyDecision::AutoResolve
    }
}
