//! Classify stage client — wraps the classifier service's `/predict`
//! endpoint and normalizes its ranked predictions.

use async_trait::async_trait;
use orchestration::{
    ClassificationResult, ExceptionReport, PackageScanResult, RankedLabel, RetryPolicy, StageId,
    TimeOfDay, WeatherCondition,
};
use serde::{Deserialize, Serialize};

use crate::config::StageEndpoint;

use super::{check_unit_interval, StageCallError, StageTransport};

/// How many ranked predictions to request from the classifier.
const TOP_K: u32 = 3;

/// The classifier stage boundary.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClassifyStage: Send + Sync {
    async fn classify(&self, report: &ExceptionReport)
        -> Result<ClassificationResult, StageCallError>;

    async fn healthy(&self) -> bool;
}

/// Wire request for `/predict`.
#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    driver_note: &'a str,
    gps_deviation_km: f64,
    weather_condition: WeatherCondition,
    attempts: u32,
    hub_delay_minutes: i64,
    package_scan_result: PackageScanResult,
    time_of_day: TimeOfDay,
    top_k: u32,
}

#[derive(Debug, Deserialize)]
struct PredictionItem {
    label: String,
    confidence: f64,
}

/// Wire response from `/predict`.
#[derive(Debug, Deserialize)]
struct PredictResponse {
    predicted_label: String,
    confidence: f64,
    #[serde(default)]
    top_predictions: Vec<PredictionItem>,
}

/// HTTP client for the classifier stage.
pub struct HttpClassifyClient {
    transport: StageTransport,
}

impl HttpClassifyClient {
    pub fn new(client: reqwest::Client, endpoint: &StageEndpoint, retry: RetryPolicy) -> Self {
        Self {
            transport: StageTransport::new(client, StageId::Classify, endpoint, "/predict", retry),
        }
    }
}

#[async_trait]
impl ClassifyStage for HttpClassifyClient {
    async fn classify(
        &self,
        report: &ExceptionReport,
    ) -> Result<ClassificationResult, StageCallError> {
        let request = PredictRequest {
            driver_note: &report.driver_note,
            gps_deviation_km: report.gps_deviation_km,
            weather_condition: report.weather_condition,
            attempts: report.attempts,
            hub_delay_minutes: report.hub_delay_minutes,
            package_scan_result: report.package_scan_result,
            time_of_day: report.time_of_day,
            top_k: TOP_K,
        };

        let response: PredictResponse = self.transport.invoke(&request).await?;
        normalize(response)
    }

    async fn healthy(&self) -> bool {
        self.transport.healthy().await
    }
}

fn normalize(response: PredictResponse) -> Result<ClassificationResult, StageCallError> {
    if response.predicted_label.trim().is_empty() {
        return Err(StageCallError::invalid("classify: empty predicted_label"));
    }
    let confidence = check_unit_interval(StageId::Classify, "confidence", response.confidence)?;

    let mut alternatives: Vec<RankedLabel> = Vec::new();
    let mut top_seen = false;
    for item in response.top_predictions {
        let item_confidence =
            check_unit_interval(StageId::Classify, "top_predictions.confidence", item.confidence)?;
        // The ranked list echoes the winning label; keep only the alternatives.
        if !top_seen && item.label == response.predicted_label {
            top_seen = true;
            continue;
        }
        alternatives.push(RankedLabel {
            label: item.label,
            confidence: item_confidence,
        });
    }
    alternatives.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(ClassificationResult {
        label: response.predicted_label,
        confidence,
        ranked_alternatives: alternatives,
    })
}
