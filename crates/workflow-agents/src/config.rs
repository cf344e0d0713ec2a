//! Runtime configuration for the workflow orchestrator.
//!
//! Built once at startup from environment variables and passed into the
//! orchestrator by value — never mutable global state. Each of the four
//! stage services gets a named address binding plus its own timeout;
//! thresholds and retry parameters feed the gates and stage clients.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variable overrides (e.g. `WORKFLOW_CLASSIFY_URL`)
//! 2. Built-in defaults (local stage services on ports 8000/8001/8003/8004)

use std::env;
use std::time::Duration;

use orchestration::{EscalationConfig, GateConfig, RetryPolicy};
use serde::Deserialize;

/// Default stage endpoints — the ports the stage services bind locally.
const DEFAULT_CLASSIFY_URL: &str = "http://localhost:8000";
const DEFAULT_RETRIEVE_URL: &str = "http://localhost:8001";
const DEFAULT_DECIDE_URL: &str = "http://localhost:8003";
const DEFAULT_EXECUTE_URL: &str = "http://localhost:8004";

/// Default per-stage timeout. The decision stage gets a longer budget —
/// its backend is a generative model and routinely runs long.
const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 60;
const DEFAULT_DECIDE_TIMEOUT_SECS: u64 = 90;

/// Default idempotency window for completed results.
const DEFAULT_IDEMPOTENCY_TTL_SECS: u64 = 300;

/// Default listen address for the orchestrator's own HTTP surface.
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8002";

/// Environment-variable names for endpoint and tuning overrides.
const ENV_CLASSIFY_URL: &str = "WORKFLOW_CLASSIFY_URL";
const ENV_RETRIEVE_URL: &str = "WORKFLOW_RETRIEVE_URL";
const ENV_DECIDE_URL: &str = "WORKFLOW_DECIDE_URL";
const ENV_EXECUTE_URL: &str = "WORKFLOW_EXECUTE_URL";
const ENV_BIND_ADDR: &str = "WORKFLOW_BIND_ADDR";
const ENV_LOW_CONFIDENCE: &str = "WORKFLOW_LOW_CONFIDENCE_THRESHOLD";
const ENV_DECISION_CONFIDENCE: &str = "WORKFLOW_DECISION_CONFIDENCE_THRESHOLD";
const ENV_MAX_ATTEMPTS: &str = "WORKFLOW_MAX_DELIVERY_ATTEMPTS";
const ENV_RETRY_MAX_ATTEMPTS: &str = "WORKFLOW_STAGE_RETRY_ATTEMPTS";
const ENV_IDEMPOTENCY_TTL_SECS: &str = "WORKFLOW_IDEMPOTENCY_TTL_SECS";

/// Named address binding for one remote stage.
#[derive(Debug, Clone, Deserialize)]
pub struct StageEndpoint {
    /// Base URL of the stage service (no trailing slash).
    pub url: String,
    /// Timeout for a single invocation attempt.
    pub timeout: Duration,
}

impl StageEndpoint {
    fn from_env(var: &str, default_url: &str, timeout_secs: u64) -> Self {
        let url = env::var(var).unwrap_or_else(|_| default_url.to_string());
        Self {
            url: url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

/// Top-level orchestrator configuration.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Classifier stage (label + confidence + ranked alternatives).
    pub classify: StageEndpoint,
    /// Policy-document retriever stage.
    pub retrieve: StageEndpoint,
    /// Decision synthesizer stage (generative backend, longer timeout).
    pub decide: StageEndpoint,
    /// Action executor stage (side-effecting).
    pub execute: StageEndpoint,
    /// Confidence gate threshold (τ_low).
    pub gate: GateConfig,
    /// Escalation policy thresholds (τ_decision, attempt cap).
    pub escalation: EscalationConfig,
    /// Retry budget and backoff for every stage client.
    pub retry: RetryPolicy,
    /// How long completed results stay in the idempotency cache.
    pub idempotency_ttl: Duration,
    /// Listen address for the orchestrator's HTTP surface.
    pub bind_addr: String,
}

fn env_f64(var: &str) -> Option<f64> {
    env::var(var).ok()?.parse().ok()
}

fn env_u32(var: &str) -> Option<u32> {
    env::var(var).ok()?.parse().ok()
}

fn env_u64(var: &str) -> Option<u64> {
    env::var(var).ok()?.parse().ok()
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        let mut gate = GateConfig::default();
        if let Some(t) = env_f64(ENV_LOW_CONFIDENCE) {
            gate.low_confidence_threshold = t;
        }

        let mut escalation = EscalationConfig::default();
        if let Some(t) = env_f64(ENV_DECISION_CONFIDENCE) {
            escalation.decision_confidence_threshold = t;
        }
        if let Some(cap) = env_u32(ENV_MAX_ATTEMPTS) {
            escalation.max_attempts = cap;
        }

        let mut retry = RetryPolicy::default();
        if let Some(n) = env_u32(ENV_RETRY_MAX_ATTEMPTS) {
            retry.max_attempts = n.max(1);
        }

        Self {
            classify: StageEndpoint::from_env(
                ENV_CLASSIFY_URL,
                DEFAULT_CLASSIFY_URL,
                DEFAULT_STAGE_TIMEOUT_SECS,
            ),
            retrieve: StageEndpoint::from_env(
                ENV_RETRIEVE_URL,
                DEFAULT_RETRIEVE_URL,
                DEFAULT_STAGE_TIMEOUT_SECS,
            ),
            decide: StageEndpoint::from_env(
                ENV_DECIDE_URL,
                DEFAULT_DECIDE_URL,
                DEFAULT_DECIDE_TIMEOUT_SECS,
            ),
            execute: StageEndpoint::from_env(
                ENV_EXECUTE_URL,
                DEFAULT_EXECUTE_URL,
                DEFAULT_STAGE_TIMEOUT_SECS,
            ),
            gate,
            escalation,
            retry,
            idempotency_ttl: Duration::from_secs(
                env_u64(ENV_IDEMPOTENCY_TTL_SECS).unwrap_or(DEFAULT_IDEMPOTENCY_TTL_SECS),
            ),
            bind_addr: env::var(ENV_BIND_ADDR).unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
        }
    }
}
