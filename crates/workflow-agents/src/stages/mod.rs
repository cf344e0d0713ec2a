//! Stage clients — typed HTTP boundaries around the four remote services.
//!
//! Each stage client is a pure transport/normalization layer: it POSTs the
//! stage's wire request, applies the retry policy to transient failures
//! (connect errors, timeouts, 5xx, 429), validates the response against the
//! stage's declared domains, and converts it into the internal result type.
//! Nothing here holds per-run state — one client instance serves every
//! concurrent run.
//!
//! ```text
//! invoke(request)
//!   ├─ attempt n fails transiently, budget left → backoff + jitter, retry
//!   ├─ attempt n fails permanently (4xx, bad payload) → terminal error now
//!   └─ budget exhausted → terminal error carrying the last failure
//! ```

pub mod classify;
pub mod decide;
pub mod execute;
pub mod retrieve;

use std::time::Duration;

use orchestration::{RetryPolicy, StageError, StageId};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::StageEndpoint;

pub use classify::{ClassifyStage, HttpClassifyClient};
pub use decide::{DecideStage, HttpDecideClient};
pub use execute::{ExecuteStage, HttpExecuteClient};
pub use retrieve::{HttpRetrieveClient, RetrieveStage};

/// Terminal outcome of one stage invocation, after the retry policy ran.
///
/// Exactly one of these (or a success) is emitted per `invoke` call.
#[derive(Debug, Clone)]
pub struct StageCallError {
    pub error: StageError,
    /// Attempts made, including the first.
    pub attempts: u32,
}

impl StageCallError {
    /// A failure discovered after transport succeeded (response validation).
    pub fn invalid(detail: impl Into<String>) -> Self {
        Self {
            error: StageError::InvalidResponse(detail.into()),
            attempts: 1,
        }
    }
}

/// Shared HTTP transport for one stage endpoint.
///
/// Owns the endpoint binding, per-attempt timeout, and retry policy. The
/// typed stage clients wrap this with their wire schemas.
#[derive(Debug, Clone)]
pub struct StageTransport {
    client: reqwest::Client,
    stage: StageId,
    invoke_url: String,
    health_url: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl StageTransport {
    pub fn new(
        client: reqwest::Client,
        stage: StageId,
        endpoint: &StageEndpoint,
        path: &str,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            stage,
            invoke_url: format!("{}{}", endpoint.url, path),
            health_url: format!("{}/health", endpoint.url),
            timeout: endpoint.timeout,
            retry,
        }
    }

    /// POST `request` and decode the response, retrying transient failures
    /// with exponential backoff and jitter.
    pub async fn invoke<Req, Resp>(&self, request: &Req) -> Result<Resp, StageCallError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.try_once(request).await {
                Ok(response) => {
                    tracing::debug!(stage = %self.stage, attempt, "Stage call succeeded");
                    return Ok(response);
                }
                Err(error) => {
                    if error.is_transient() && self.retry.allows_retry(attempt) {
                        let delay = self.retry.backoff_delay(attempt);
                        tracing::warn!(
                            stage = %self.stage,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            %error,
                            "Transient stage error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    tracing::error!(stage = %self.stage, attempt, %error, "Stage call failed");
                    return Err(StageCallError {
                        error,
                        attempts: attempt,
                    });
                }
            }
        }
    }

    async fn try_once<Req, Resp>(&self, request: &Req) -> Result<Resp, StageError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let response = self
            .client
            .post(&self.invoke_url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(StageError::RateLimited);
        }
        if status.is_server_error() {
            return Err(StageError::Server {
                status: status.as_u16(),
            });
        }
        if status.is_client_error() {
            let detail = response.text().await.unwrap_or_default();
            return Err(StageError::Rejected {
                status: status.as_u16(),
                detail: truncate(&detail, 200),
            });
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| StageError::InvalidResponse(e.to_string()))
    }

    fn transport_error(&self, err: reqwest::Error) -> StageError {
        if err.is_timeout() {
            StageError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            StageError::Connect(err.to_string())
        }
    }

    /// Whether the stage's `/health` endpoint answers 2xx.
    pub async fn healthy(&self) -> bool {
        match self
            .client
            .get(&self.health_url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

/// Validate that a probability-like field is within [0, 1].
pub(crate) fn check_unit_interval(
    stage: StageId,
    field: &str,
    value: f64,
) -> Result<f64, StageCallError> {
    if (0.0..=1.0).contains(&value) && value.is_finite() {
        Ok(value)
    } else {
        Err(StageCallError::invalid(format!(
            "{stage}: {field} outside [0, 1]: {value}"
        )))
    }
}
