//! Execute stage client — wraps the action executor's `/execute` endpoint.
//!
//! The only side-effecting stage: the remote service writes the operational
//! log record and, unless the case is escalated, sends the customer
//! notification. The effective escalation flag passed here is the
//! escalation policy's decision, which may be stricter than the decision
//! stage's own `requires_escalation` — the executor always writes the log,
//! and suppresses the notify/auto-close branch when the flag is set.

use async_trait::async_trait;
use orchestration::{
    ActionResult, ClassificationResult, DecisionResult, ExceptionReport, PackageScanResult,
    RetrievalResult, RetryPolicy, StageId, TimeOfDay, WeatherCondition,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::StageEndpoint;

use super::{StageCallError, StageTransport};

/// The action executor stage boundary.
///
/// `escalate` is the escalation policy's verdict for this run; it must be
/// honored per correlation identifier even across retries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecuteStage: Send + Sync {
    async fn execute(
        &self,
        report: &ExceptionReport,
        classification: &ClassificationResult,
        retrieval: &RetrievalResult,
        decision: &DecisionResult,
        escalate: bool,
    ) -> Result<ActionResult, StageCallError>;

    async fn healthy(&self) -> bool;
}

#[derive(Debug, Serialize)]
struct PredictionItem<'a> {
    label: &'a str,
    confidence: f64,
}

#[derive(Debug, Serialize)]
struct DecisionPayload<'a> {
    recommended_action: &'a str,
    driver_instruction: &'a str,
    customer_message: &'a str,
    /// The *effective* escalation flag — policy verdict folded in.
    requires_escalation: bool,
    confidence: f64,
    reasoning_summary: &'a str,
}

/// Wire request for `/execute`. Carries the whole run context so the
/// executor can write one complete operational log row.
#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    driver_note: &'a str,
    gps_deviation_km: f64,
    weather_condition: WeatherCondition,
    attempts: u32,
    hub_delay_minutes: i64,
    package_scan_result: PackageScanResult,
    time_of_day: TimeOfDay,
    predicted_label: &'a str,
    confidence: f64,
    top_predictions: Vec<PredictionItem<'a>>,
    sop_retrieved: bool,
    sop_id: Option<&'a str>,
    decision: DecisionPayload<'a>,
}

/// Wire response from `/execute`.
#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    sheet_updated: bool,
    email_simulated: bool,
    escalated: bool,
    timestamp: DateTime<Utc>,
}

/// HTTP client for the action executor stage.
pub struct HttpExecuteClient {
    transport: StageTransport,
}

impl HttpExecuteClient {
    pub fn new(client: reqwest::Client, endpoint: &StageEndpoint, retry: RetryPolicy) -> Self {
        Self {
            transport: StageTransport::new(client, StageId::Execute, endpoint, "/execute", retry),
        }
    }
}

#[async_trait]
impl ExecuteStage for HttpExecuteClient {
    async fn execute(
        &self,
        report: &ExceptionReport,
        classification: &ClassificationResult,
        retrieval: &RetrievalResult,
        decision: &DecisionResult,
        escalate: bool,
    ) -> Result<ActionResult, StageCallError> {
        let request = ExecuteRequest {
            driver_note: &report.driver_note,
            gps_deviation_km: report.gps_deviation_km,
            weather_condition: report.weather_condition,
            attempts: report.attempts,
            hub_delay_minutes: report.hub_delay_minutes,
            package_scan_result: report.package_scan_result,
            time_of_day: report.time_of_day,
            predicted_label: &classification.label,
            confidence: classification.confidence,
            top_predictions: classification
                .ranked_alternatives
                .iter()
                .map(|alt| PredictionItem {
                    label: &alt.label,
                    confidence: alt.confidence,
                })
                .collect(),
            sop_retrieved: retrieval.found,
            sop_id: retrieval.document_id.as_deref(),
            decision: DecisionPayload {
                recommended_action: &decision.recommended_action,
                driver_instruction: &decision.driver_instruction,
                customer_message: &decision.customer_message,
                requires_escalation: escalate || decision.requires_escalation,
                confidence: decision.confidence,
                reasoning_summary: &decision.reasoning_summary,
            },
        };

        let response: ExecuteResponse = self.transport.invoke(&request).await?;
        Ok(ActionResult {
            log_written: response.sheet_updated,
            notification_sent: response.email_simulated,
            escalated: response.escalated,
            executed_at: response.timestamp,
        })
    }

    async fn healthy(&self) -> bool {
        self.transport.healthy().await
    }
}
