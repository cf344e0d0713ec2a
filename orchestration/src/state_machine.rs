//! Workflow state machine — explicit states and legal transition guards.
//!
//! Provides a typed state model for one workflow run so that:
//! 1. Every state transition is auditable and logged.
//! 2. Illegal transitions are caught by the `advance()` guard.
//! 3. The final result carries the exact sequence of states traversed.
//!
//! The orchestrator calls `advance()` to move between states. Each call
//! validates that the transition is legal and records it in the log.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// The set of workflow states.
///
/// Every run starts at `Init` and terminates at `Done`, `Routed`, or
/// `Failed`. The bracketed stages only run when the confidence gate
/// proceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Report accepted, correlation identifier assigned.
    Init,
    /// Calling the classifier stage.
    Classifying,
    /// Calling the policy-document retriever stage.
    Retrieving,
    /// Calling the decision synthesizer stage.
    Deciding,
    /// Calling the action executor stage.
    Executing,
    /// Pipeline completed — terminal state.
    Done,
    /// Confidence gate routed the case to a human — terminal state.
    Routed,
    /// A stage exhausted retries or failed permanently — terminal state.
    Failed,
}

impl WorkflowState {
    /// Whether this is a terminal state (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Routed | Self::Failed)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "Init"),
            Self::Classifying => write!(f, "Classifying"),
            Self::Retrieving => write!(f, "Retrieving"),
            Self::Deciding => write!(f, "Deciding"),
            Self::Executing => write!(f, "Executing"),
            Self::Done => write!(f, "Done"),
            Self::Routed => write!(f, "Routed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Legal transitions between workflow states.
///
/// The transition table encodes the valid edges in the state graph:
/// ```text
/// Init → Classifying | Failed
/// Classifying → Retrieving | Routed | Failed
/// Retrieving → Deciding | Failed
/// Deciding → Executing | Failed
/// Executing → Done | Failed
/// ```
/// `Routed` is reachable only from `Classifying` (the confidence gate fires
/// on the classification result). `Failed` is reachable from any
/// non-terminal state.
fn is_legal_transition(from: WorkflowState, to: WorkflowState) -> bool {
    use WorkflowState::*;

    // Any non-terminal state can transition to Failed.
    if to == Failed && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Init, Classifying)
            // Gate: proceed downstream or route to a human
            | (Classifying, Retrieving)
            | (Classifying, Routed)
            // found=false still proceeds to Deciding
            | (Retrieving, Deciding)
            // Escalation policy only changes what Execute does, not whether
            | (Deciding, Executing)
            | (Executing, Done)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// The state transitioned from.
    pub from: WorkflowState,
    /// The state transitioned to.
    pub to: WorkflowState,
    /// Milliseconds since the state machine was created.
    pub elapsed_ms: u64,
    /// Optional context about why this transition happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone)]
pub struct IllegalTransition {
    pub from: WorkflowState,
    pub to: WorkflowState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal state transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// The per-run state machine.
///
/// Tracks the current state, enforces legal transitions, and maintains a
/// complete log of all transitions for audit and diagnostics. One instance
/// per workflow run; never shared across runs.
pub struct StateMachine {
    current: WorkflowState,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl StateMachine {
    /// Create a new state machine starting at `Init`.
    pub fn new() -> Self {
        Self {
            current: WorkflowState::Init,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    /// Get the current state.
    pub fn current(&self) -> WorkflowState {
        self.current
    }

    /// Attempt to advance to the next state.
    ///
    /// Returns `Ok(())` if the transition is legal, or `Err(IllegalTransition)`
    /// if the transition would violate the state graph.
    pub fn advance(
        &mut self,
        to: WorkflowState,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        let record = TransitionRecord {
            from: self.current,
            to,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        };

        tracing::debug!(
            from = %self.current,
            to = %to,
            "State transition"
        );

        self.transitions.push(record);
        self.current = to;
        Ok(())
    }

    /// Transition to `Failed` from any non-terminal state.
    ///
    /// Convenience method — always legal from non-terminal states.
    pub fn fail(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(WorkflowState::Failed, Some(reason))
    }

    /// Whether the state machine is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    /// Get the full transition log.
    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
