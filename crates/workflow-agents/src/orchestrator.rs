//! The workflow orchestrator — drives one exception report through the
//! four-stage pipeline as a single atomic transaction.
//!
//! One orchestrator instance serves every run. Per-run state (the state
//! machine and the execution trace) is created inside `submit` and frozen
//! into the `WorkflowResult`; the only state shared across runs is the
//! idempotency cache.
//!
//! Failure containment: a stage failure never propagates as an error to the
//! caller. It is recorded in the trace, collapsed into the result's status
//! (`failed` only when Classify itself failed, `partial` otherwise), and the
//! outputs of the stages that did complete are kept.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use orchestration::{
    Admission, ClassificationResult, ConfidenceGate, EscalationPolicy, ExceptionReport,
    ExecutionTrace, GateDecision, IdempotencyCache, PolicyDecision, StageFailure, StageId,
    StageOutcome, StageRecord, StateMachine, ValidationError, WorkflowResult, WorkflowState,
    WorkflowStatus,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::WorkflowConfig;
use crate::stages::{
    ClassifyStage, DecideStage, ExecuteStage, HttpClassifyClient, HttpDecideClient,
    HttpExecuteClient, HttpRetrieveClient, RetrieveStage, StageCallError,
};

/// The four stage boundaries the orchestrator sequences.
///
/// Held as trait objects so tests can substitute in-process stages for the
/// HTTP clients.
#[derive(Clone)]
pub struct StageClients {
    pub classify: Arc<dyn ClassifyStage>,
    pub retrieve: Arc<dyn RetrieveStage>,
    pub decide: Arc<dyn DecideStage>,
    pub execute: Arc<dyn ExecuteStage>,
}

impl StageClients {
    /// Build the HTTP stage clients from configuration, sharing one
    /// connection pool across all four stages.
    pub fn http(config: &WorkflowConfig) -> Self {
        let client = reqwest::Client::new();
        Self {
            classify: Arc::new(HttpClassifyClient::new(
                client.clone(),
                &config.classify,
                config.retry,
            )),
            retrieve: Arc::new(HttpRetrieveClient::new(
                client.clone(),
                &config.retrieve,
                config.retry,
            )),
            decide: Arc::new(HttpDecideClient::new(
                client.clone(),
                &config.decide,
                config.retry,
            )),
            execute: Arc::new(HttpExecuteClient::new(client, &config.execute, config.retry)),
        }
    }
}

/// Sequences Classify → Retrieve → Decide → Execute for each submission.
pub struct WorkflowOrchestrator {
    stages: StageClients,
    gate: ConfidenceGate,
    policy: EscalationPolicy,
    cache: IdempotencyCache,
}

impl WorkflowOrchestrator {
    pub fn new(stages: StageClients, config: &WorkflowConfig) -> Self {
        Self {
            stages,
            gate: ConfidenceGate::new(config.gate),
            policy: EscalationPolicy::new(config.escalation),
            cache: IdempotencyCache::new(config.idempotency_ttl),
        }
    }

    /// Submit one exception report.
    ///
    /// Validation failures reject before the run starts — the only error
    /// path. Everything after admission resolves to a `WorkflowResult`,
    /// including stage failures and low-confidence routing.
    ///
    /// Concurrent submissions with the same correlation identifier execute
    /// side effects exactly once: one submission wins the idempotency slot
    /// and runs the pipeline, the rest adopt the winner's result.
    pub async fn submit(
        &self,
        report: ExceptionReport,
        cancel: CancellationToken,
    ) -> Result<Arc<WorkflowResult>, ValidationError> {
        report.validate()?;
        let correlation_id = report.correlation_id.unwrap_or_else(Uuid::new_v4);

        loop {
            match self.cache.admit(correlation_id) {
                Admission::Winner(guard) => {
                    tracing::info!(%correlation_id, "Workflow run admitted");
                    let result =
                        Arc::new(self.run_pipeline(correlation_id, &report, &cancel).await);
                    guard.complete(Arc::clone(&result));
                    return Ok(result);
                }
                Admission::Duplicate(pending) => {
                    tracing::info!(%correlation_id, "Awaiting in-flight run with same identifier");
                    match pending.wait().await {
                        Some(result) => return Ok(result),
                        // Winner abandoned without publishing; contend again.
                        None => continue,
                    }
                }
                Admission::Cached(result) => {
                    tracing::info!(%correlation_id, "Returning cached result");
                    return Ok(result);
                }
            }
        }
    }

    async fn run_pipeline(
        &self,
        correlation_id: Uuid,
        report: &ExceptionReport,
        cancel: &CancellationToken,
    ) -> WorkflowResult {
        let mut sm = StateMachine::new();
        let mut trace = ExecutionTrace::new();
        let mut run = RunOutputs::new(correlation_id);

        // Classify. A failure here is the only one that yields status
        // `failed` — nothing downstream ran.
        advance(&mut sm, WorkflowState::Classifying, None);
        let classification = match timed_stage(
            &mut trace,
            StageId::Classify,
            self.stages.classify.classify(report),
        )
        .await
        {
            Ok(classification) => classification,
            Err(failure) => {
                fail(&mut sm, &failure);
                return run.finish(WorkflowStatus::Failed, Some(failure), trace);
            }
        };
        run.classification = Some(classification.clone());

        // Confidence gate: too weak a classification stops the pipeline
        // before any irreversible action.
        if let GateDecision::RouteToHuman {
            confidence,
            threshold,
        } = self.gate.decide(&classification)
        {
            let reason = format!("confidence {confidence:.2} below threshold {threshold:.2}");
            tracing::info!(%correlation_id, %reason, "Routing to human");
            advance(&mut sm, WorkflowState::Routed, Some(&reason));
            run.routed_to_human = true;
            return run.finish(WorkflowStatus::Partial, None, trace);
        }

        if cancelled(&mut sm, cancel) {
            run.cancelled = true;
            return run.finish(WorkflowStatus::Partial, None, trace);
        }

        // Retrieve. An empty result set already normalized to a
        // found=false success inside the stage client.
        advance(&mut sm, WorkflowState::Retrieving, Some("gate: proceed"));
        let retrieval = match timed_stage(
            &mut trace,
            StageId::Retrieve,
            self.stages.retrieve.retrieve(&classification, report),
        )
        .await
        {
            Ok(retrieval) => retrieval,
            Err(failure) => {
                fail(&mut sm, &failure);
                return run.finish(WorkflowStatus::Partial, Some(failure), trace);
            }
        };
        run.retrieval = Some(retrieval.clone());

        if cancelled(&mut sm, cancel) {
            run.cancelled = true;
            return run.finish(WorkflowStatus::Partial, None, trace);
        }

        // Decide.
        advance(&mut sm, WorkflowState::Deciding, None);
        let decision = match timed_stage(
            &mut trace,
            StageId::Decide,
            self.stages.decide.decide(&classification, &retrieval, report),
        )
        .await
        {
            Ok(decision) => decision,
            Err(failure) => {
                fail(&mut sm, &failure);
                return run.finish(WorkflowStatus::Partial, Some(failure), trace);
            }
        };

        // Escalation policy. Either branch still executes — escalation
        // only changes which sub-actions the executor performs.
        let policy_decision = self.policy.decide(&decision, report);
        let escalate = policy_decision.is_escalation();
        let branch_reason = match &policy_decision {
            PolicyDecision::AutoResolve => "policy: auto_resolve".to_string(),
            PolicyDecision::Escalate { reason } => {
                tracing::info!(%correlation_id, %reason, "Escalation policy fired");
                format!("policy: escalate ({reason})")
            }
        };
        run.decision = Some(decision.clone());

        if cancelled(&mut sm, cancel) {
            run.cancelled = true;
            return run.finish(WorkflowStatus::Partial, None, trace);
        }

        // Execute. Once this stage begins, cancellation is ignored: the
        // remote side may have already written its log record, and
        // abandoning the call would leave the transaction ambiguous.
        advance(&mut sm, WorkflowState::Executing, Some(&branch_reason));
        let action = match timed_stage(
            &mut trace,
            StageId::Execute,
            self.stages
                .execute
                .execute(report, &classification, &retrieval, &decision, escalate),
        )
        .await
        {
            Ok(action) => action,
            Err(failure) => {
                fail(&mut sm, &failure);
                return run.finish(WorkflowStatus::Partial, Some(failure), trace);
            }
        };
        run.action = Some(action);

        advance(&mut sm, WorkflowState::Done, None);
        tracing::info!(%correlation_id, "Workflow run completed");
        run.finish(WorkflowStatus::Success, None, trace)
    }

    /// Liveness of the four stage endpoints, probed concurrently.
    pub async fn stage_health(&self) -> StageHealth {
        let (classify, retrieve, decide, execute) = tokio::join!(
            self.stages.classify.healthy(),
            self.stages.retrieve.healthy(),
            self.stages.decide.healthy(),
            self.stages.execute.healthy(),
        );
        StageHealth {
            classify,
            retrieve,
            decide,
            execute,
        }
    }
}

/// Health of each remote stage endpoint.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct StageHealth {
    pub classify: bool,
    pub retrieve: bool,
    pub decide: bool,
    pub execute: bool,
}

impl StageHealth {
    pub fn all_healthy(&self) -> bool {
        self.classify && self.retrieve && self.decide && self.execute
    }
}

/// Accumulates stage outputs for one run until it is frozen into the result.
struct RunOutputs {
    correlation_id: Uuid,
    classification: Option<ClassificationResult>,
    retrieval: Option<orchestration::RetrievalResult>,
    decision: Option<orchestration::DecisionResult>,
    action: Option<orchestration::ActionResult>,
    routed_to_human: bool,
    cancelled: bool,
}

impl RunOutputs {
    fn new(correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            classification: None,
            retrieval: None,
            decision: None,
            action: None,
            routed_to_human: false,
            cancelled: false,
        }
    }

    fn finish(
        self,
        status: WorkflowStatus,
        failure: Option<StageFailure>,
        trace: ExecutionTrace,
    ) -> WorkflowResult {
        WorkflowResult {
            correlation_id: self.correlation_id,
            status,
            classification: self.classification,
            retrieval: self.retrieval,
            decision: self.decision,
            action: self.action,
            stages_executed: trace.stages_succeeded(),
            routed_to_human: self.routed_to_human,
            cancelled: self.cancelled,
            failure,
            trace,
        }
    }
}

/// Run one stage future and append its audit record to the trace.
async fn timed_stage<T, F>(
    trace: &mut ExecutionTrace,
    stage: StageId,
    call: F,
) -> Result<T, StageFailure>
where
    F: std::future::Future<Output = Result<T, StageCallError>>,
{
    let started_at = Utc::now();
    let start = Instant::now();
    let outcome = call.await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(value) => {
            trace.record(StageRecord {
                stage,
                started_at,
                duration_ms,
                outcome: StageOutcome::Succeeded,
            });
            Ok(value)
        }
        Err(call_error) => {
            let failure =
                StageFailure::from_stage_error(stage, call_error.attempts, &call_error.error);
            trace.record(StageRecord {
                stage,
                started_at,
                duration_ms,
                outcome: StageOutcome::Failed {
                    reason: failure.message.clone(),
                },
            });
            Err(failure)
        }
    }
}

// All transitions issued by the pipeline loop are legal by construction;
// an error here indicates a bug in the loop itself, so it is logged loudly
// rather than propagated into the caller's result.
fn advance(sm: &mut StateMachine, to: WorkflowState, reason: Option<&str>) {
    if let Err(err) = sm.advance(to, reason) {
        tracing::error!(%err, "Pipeline issued an illegal state transition");
    }
}

fn fail(sm: &mut StateMachine, failure: &StageFailure) {
    if let Err(err) = sm.fail(&failure.to_string()) {
        tracing::error!(%err, "Pipeline issued an illegal failure transition");
    }
}

/// Cancellation is only honored between stages; a run that is already
/// executing its final stage completes.
fn cancelled(sm: &mut StateMachine, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        if let Err(err) = sm.fail("cancelled between stages") {
            tracing::error!(%err, "Pipeline issued an illegal failure transition");
        }
        return true;
    }
    false
}
