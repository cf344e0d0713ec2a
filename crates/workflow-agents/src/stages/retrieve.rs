//! Retrieve stage client — wraps the policy-document retriever's
//! `/retrieve` endpoint.
//!
//! An empty result set is a valid outcome, not an error: it becomes
//! `RetrievalResult::not_found()` and the pipeline proceeds to Decide
//! without a grounding document.

use async_trait::async_trait;
use orchestration::{ClassificationResult, ExceptionReport, RetrievalResult, RetryPolicy, StageId};
use serde::{Deserialize, Serialize};

use crate::config::StageEndpoint;

use super::{check_unit_interval, StageCallError, StageTransport};

/// The retriever stage boundary.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RetrieveStage: Send + Sync {
    async fn retrieve(
        &self,
        classification: &ClassificationResult,
        report: &ExceptionReport,
    ) -> Result<RetrievalResult, StageCallError>;

    async fn healthy(&self) -> bool;
}

/// Wire request for `/retrieve`. The remote side builds its search query
/// from the exception type and the driver note.
#[derive(Debug, Serialize)]
struct RetrieveRequest<'a> {
    exception_type: &'a str,
    driver_note: &'a str,
    num_results: u32,
}

#[derive(Debug, Deserialize)]
struct SopResult {
    datapoint_id: String,
    score: f64,
    #[serde(default)]
    content: Option<String>,
}

/// Wire response from `/retrieve`. Only the result list matters here; the
/// echoed query metadata is ignored.
#[derive(Debug, Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    sops: Vec<SopResult>,
}

/// HTTP client for the retriever stage.
pub struct HttpRetrieveClient {
    transport: StageTransport,
}

impl HttpRetrieveClient {
    pub fn new(client: reqwest::Client, endpoint: &StageEndpoint, retry: RetryPolicy) -> Self {
        Self {
            transport: StageTransport::new(client, StageId::Retrieve, endpoint, "/retrieve", retry),
        }
    }
}

#[async_trait]
impl RetrieveStage for HttpRetrieveClient {
    async fn retrieve(
        &self,
        classification: &ClassificationResult,
        report: &ExceptionReport,
    ) -> Result<RetrievalResult, StageCallError> {
        let request = RetrieveRequest {
            exception_type: &classification.label,
            driver_note: &report.driver_note,
            num_results: 1,
        };

        let response: RetrieveResponse = self.transport.invoke(&request).await?;
        normalize(response)
    }

    async fn healthy(&self) -> bool {
        self.transport.healthy().await
    }
}

fn normalize(response: RetrieveResponse) -> Result<RetrievalResult, StageCallError> {
    let Some(top) = response.sops.into_iter().next() else {
        return Ok(RetrievalResult::not_found());
    };
    if top.datapoint_id.trim().is_empty() {
        return Err(StageCallError::invalid("retrieve: empty datapoint_id"));
    }
    let relevance = check_unit_interval(StageId::Retrieve, "score", top.score)?;

    Ok(RetrievalResult {
        found: true,
        document_id: Some(top.datapoint_id),
        document_text: top.content,
        relevance: Some(relevance),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_results_normalize_to_not_found() {
        let result = normalize(RetrieveResponse { sops: Vec::new() }).unwrap();
        assert!(!result.found);
        assert!(result.document_text.is_none());
        assert!(result.relevance.is_none());
    }

    #[test]
    fn test_top_result_is_taken() {
        let result = normalize(RetrieveResponse {
            sops: vec![
                SopResult {
                    datapoint_id: "sop-access-01".into(),
                    score: 0.81,
                    content: Some("Verify gate code with the customer.".into()),
                },
                SopResult {
                    datapoint_id: "sop-access-02".into(),
                    score: 0.55,
                    content: None,
                },
            ],
        })
        .unwrap();

        assert!(result.found);
        assert_eq!(result.document_id.as_deref(), Some("sop-access-01"));
        assert_eq!(result.relevance, Some(0.81));
        assert!(result.document_text.is_some());
    }

    #[test]
    fn test_out_of_range_score_is_rejected() {
        let response = RetrieveResponse {
            sops: vec![SopResult {
                datapoint_id: "sop-1".into(),
                score: 1.7,
                content: None,
            }],
        };
        assert!(normalize(response).is_err());
    }

    #[test]
    fn test_empty_document_id_is_rejected() {
        let response = RetrieveResponse {
            sops: vec![SopResult {
                datapoint_id: "".into(),
                score: 0.5,
                content: None,
            }],
        };
        assert!(normalize(response).is_err());
    }

    #[test]
    fn test_wire_request_shape() {
        let request = RetrieveRequest {
            exception_type: "Access Issue",
            driver_note: "customer gate locked",
            num_results: 1,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["exception_type"], "Access Issue");
        assert_eq!(json["num_results"], 1);
    }
}
