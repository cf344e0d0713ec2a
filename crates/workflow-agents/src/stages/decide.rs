//! Decide stage client — wraps the decision synthesizer's `/decide`
//! endpoint.
//!
//! The decision backend is generative and reasons over the classification,
//! the retrieved policy document (when one exists), and the raw report
//! fields. This client only ships that context and validates the structured
//! decision coming back.

use async_trait::async_trait;
use orchestration::{
    ClassificationResult, DecisionResult, ExceptionReport, PackageScanResult, RetrievalResult,
    RetryPolicy, StageId, TimeOfDay, WeatherCondition,
};
use serde::{Deserialize, Serialize};

use crate::config::StageEndpoint;

use super::{check_unit_interval, StageCallError, StageTransport};

/// The decision stage boundary.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DecideStage: Send + Sync {
    async fn decide(
        &self,
        classification: &ClassificationResult,
        retrieval: &RetrievalResult,
        report: &ExceptionReport,
    ) -> Result<DecisionResult, StageCallError>;

    async fn healthy(&self) -> bool;
}

#[derive(Debug, Serialize)]
struct PredictionItem<'a> {
    label: &'a str,
    confidence: f64,
}

/// Wire request for `/decide`.
#[derive(Debug, Serialize)]
struct DecideRequest<'a> {
    predicted_label: &'a str,
    confidence: f64,
    top_predictions: Vec<PredictionItem<'a>>,
    driver_note: &'a str,
    gps_deviation_km: f64,
    weather_condition: WeatherCondition,
    attempts: u32,
    hub_delay_minutes: i64,
    package_scan_result: PackageScanResult,
    time_of_day: TimeOfDay,
    /// Grounding document text; `None` when no matching policy was found.
    sop_content: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct DecisionWire {
    recommended_action: String,
    driver_instruction: String,
    customer_message: String,
    requires_escalation: bool,
    confidence: f64,
    reasoning_summary: String,
}

/// Wire response from `/decide`.
#[derive(Debug, Deserialize)]
struct DecideResponse {
    decision: DecisionWire,
}

/// HTTP client for the decision stage.
pub struct HttpDecideClient {
    transport: StageTransport,
}

impl HttpDecideClient {
    pub fn new(client: reqwest::Client, endpoint: &StageEndpoint, retry: RetryPolicy) -> Self {
        Self {
            transport: StageTransport::new(client, StageId::Decide, endpoint, "/decide", retry),
        }
    }
}

#[async_trait]
impl DecideStage for HttpDecideClient {
    async fn decide(
        &self,
        classification: &ClassificationResult,
        retrieval: &RetrievalResult,
        report: &ExceptionReport,
    ) -> Result<DecisionResult, StageCallError> {
        let request = DecideRequest {
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
            driver_note: &report.driver_note,
            gps_deviation_km: report.gps_deviation_km,
            weather_condition: report.weather_condition,
            attempts: report.attempts,
            hub_delay_minutes: report.hub_delay_minutes,
            package_scan_result: report.package_scan_result,
            time_of_day: report.time_of_day,
            sop_content: retrieval.document_text.as_deref(),
        };

        let response: DecideResponse = self.transport.invoke(&request).await?;
        normalize(response.decision)
    }

    async fn healthy(&self) -> bool {
        self.transport.healthy().await
    }
}

fn normalize(wire: DecisionWire) -> Result<DecisionResult, StageCallError> {
    if wire.recommended_action.trim().is_empty() {
        return Err(StageCallError::invalid("decide: empty recommended_action"));
    }
    let confidence = check_unit_interval(StageId::Decide, "confidence", wire.confidence)?;

    Ok(DecisionResult {
        recommended_action: wire.recommended_action,
        driver_instruction: wire.driver_instruction,
        customer_message: wire.customer_message,
        requires_escalation: wire.requires_escalation,
        confidence,
        reasoning_summary: wire.reasoning_summary,
    })
}
