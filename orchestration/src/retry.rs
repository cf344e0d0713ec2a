//! Retry policy for stage invocations.
//!
//! Transient stage errors are retried with exponential backoff and full
//! jitter; non-retryable errors surface immediately. The policy only
//! computes attempt budgets and delays — the stage transport owns the loop,
//! so every invocation still emits exactly one terminal outcome.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Attempt budget and backoff parameters for one stage client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per invocation, including the first.
    pub max_attempts: u32,
    /// Base delay before the first retry.
    pub base_delay_ms: u64,
    /// Upper bound on any single backoff delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Whether another attempt is allowed after `attempt` attempts have
    /// already been made.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Backoff delay before retry number `attempt` (1-based: the delay
    /// taken after the `attempt`-th failure).
    ///
    /// Exponential in the attempt number, capped at `max_delay_ms`, with
    /// full jitter: the actual delay is uniform in `[0, capped]`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ceiling = self
            .base_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms);
        if ceiling == 0 {
            return Duration::ZERO;
        }
        let jittered = rand::thread_rng().gen_range(0..=ceiling);
        Duration::from_millis(jittered)
    }
}
