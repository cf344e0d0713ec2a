//! HTTP surface of the orchestrator.
//!
//! Three routes:
//! - `POST /workflow` — submit an exception report, receive the run result
//! - `GET /health` — liveness of this service plus the four stage services
//! - `GET /` — service descriptor
//!
//! The response code reflects the run outcome: `success` and `partial`
//! results are 200 (the caller received a usable, structured result), while
//! a `failed` run maps the failing stage's terminal error onto the gateway
//! status family (504 timeout, 503 unreachable, 502 upstream fault).
//! Validation rejections are the only 400s.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use orchestration::{ExceptionReport, FailureKind, WorkflowStatus};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::WorkflowOrchestrator;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<WorkflowOrchestrator>,
    /// Parent token; each run gets a child so shutdown cancels in-flight
    /// runs at their next between-stage checkpoint.
    pub shutdown: CancellationToken,
}

/// Build the router with all routes bound to `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(describe))
        .route("/health", get(health))
        .route("/workflow", post(submit_workflow))
        .with_state(state)
}

/// Bind and serve until the shutdown token fires.
pub async fn serve(bind_addr: &str, state: AppState) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Workflow orchestrator listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn describe() -> impl IntoResponse {
    Json(json!({
        "service": "workflow-agents",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/workflow", "/health"],
    }))
}

async fn health(State(state): State<AppState>) -> Response {
    let stages = state.orchestrator.stage_health().await;
    let code = if stages.all_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = json!({
        "status": if stages.all_healthy() { "healthy" } else { "degraded" },
        "stages": stages,
    });
    (code, Json(body)).into_response()
}

async fn submit_workflow(
    State(state): State<AppState>,
    Json(report): Json<ExceptionReport>,
) -> Response {
    match state
        .orchestrator
        .submit(report, state.shutdown.child_token())
        .await
    {
        Ok(result) => {
            let code = match result.status {
                WorkflowStatus::Success | WorkflowStatus::Partial => StatusCode::OK,
                WorkflowStatus::Failed => match result.failure.as_ref().map(|f| f.kind) {
                    Some(FailureKind::Timeout) => StatusCode::GATEWAY_TIMEOUT,
                    Some(FailureKind::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
                    Some(FailureKind::Upstream) | None => StatusCode::BAD_GATEWAY,
                },
            };
            (code, Json(&*result)).into_response()
        }
        Err(err) => {
            tracing::warn!(%err, "Rejected malformed exception report");
            let body = json!({ "error": err.to_string() });
            (StatusCode::BAD_REQUEST, Json(body)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowConfig;
    use crate::orchestrator::StageClients;
    use crate::stages::classify::MockClassifyStage;
    use crate::stages::decide::MockDecideStage;
    use crate::stages::execute::MockExecuteStage;
    use crate::stages::retrieve::MockRetrieveStage;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use orchestration::{ClassificationResult, StageError};
    use tower::util::ServiceExt;

    fn state(mocks: (MockClassifyStage, MockRetrieveStage, MockDecideStage, MockExecuteStage)) -> AppState {
        let stages = StageClients {
            classify: Arc::new(mocks.0),
            retrieve: Arc::new(mocks.1),
            decide: Arc::new(mocks.2),
            execute: Arc::new(mocks.3),
        };
        AppState {
            orchestrator: Arc::new(WorkflowOrchestrator::new(
                stages,
                &WorkflowConfig::default(),
            )),
            shutdown: CancellationToken::new(),
        }
    }

    fn workflow_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/workflow")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_routed_run_returns_200_partial() {
        let mut classify = MockClassifyStage::new();
        classify.expect_classify().returning(|_| {
            Ok(ClassificationResult {
                label: "Address Problem".into(),
                confidence: 0.2,
                ranked_alternatives: Vec::new(),
            })
        });
        let app = router(state((
            classify,
            MockRetrieveStage::new(),
            MockDecideStage::new(),
            MockExecuteStage::new(),
        )));

        let response = app
            .oneshot(workflow_request(json!({"driver_note": "no such street number"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "partial");
        assert_eq!(body["routed_to_human"], true);
        assert_eq!(body["stages_executed"], json!(["classify"]));
    }

    #[tokio::test]
    async fn test_empty_driver_note_returns_400() {
        let app = router(state((
            MockClassifyStage::new(),
            MockRetrieveStage::new(),
            MockDecideStage::new(),
            MockExecuteStage::new(),
        )));

        let response = app
            .oneshot(workflow_request(json!({"driver_note": "   "})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("driver_note"));
    }

    #[tokio::test]
    async fn test_classify_timeout_returns_504() {
        let mut classify = MockClassifyStage::new();
        classify.expect_classify().returning(|_| {
            Err(crate::stages::StageCallError {
                error: StageError::Timeout { timeout_ms: 60_000 },
                attempts: 3,
            })
        });
        let app = router(state((
            classify,
            MockRetrieveStage::new(),
            MockDecideStage::new(),
            MockExecuteStage::new(),
        )));

        let response = app
            .oneshot(workflow_request(json!({"driver_note": "gate locked"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let body = body_json(response).await;
        assert_eq!(body["status"], "failed");
        assert_eq!(body["failure"]["kind"], "timeout");
    }

    #[tokio::test]
    async fn test_classify_unreachable_returns_503() {
        let mut classify = MockClassifyStage::new();
        classify.expect_classify().returning(|_| {
            Err(crate::stages::StageCallError {
                error: StageError::Connect("connection refused".into()),
                attempts: 3,
            })
        });
        let app = router(state((
            classify,
            MockRetrieveStage::new(),
            MockDecideStage::new(),
            MockExecuteStage::new(),
        )));

        let response = app
            .oneshot(workflow_request(json!({"driver_note": "gate locked"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_health_reports_per_stage_status() {
        let mut classify = MockClassifyStage::new();
        classify.expect_healthy().returning(|| true);
        let mut retrieve = MockRetrieveStage::new();
        retrieve.expect_healthy().returning(|| false);
        let mut decide = MockDecideStage::new();
        decide.expect_healthy().returning(|| true);
        let mut execute = MockExecuteStage::new();
        execute.expect_healthy().returning(|| true);

        let app = router(state((classify, retrieve, decide, execute)));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["stages"]["retrieve"], false);
        assert_eq!(body["stages"]["classify"], true);
    }

    #[tokio::test]
    async fn test_descriptor_route() {
        let app = router(state((
            MockClassifyStage::new(),
            MockRetrieveStage::new(),
            MockDecideStage::new(),
            MockExecuteStage::new(),
        )));
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["service"], "workflow-agents");
    }
}
