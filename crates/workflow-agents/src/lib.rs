//! Workflow orchestrator service for delivery-exception resolution.
//!
//! Sequences four remote stage services — classifier, policy-document
//! retriever, decision synthesizer, action executor — into one atomic
//! transaction per exception report. The deterministic pipeline logic
//! (state machine, gates, trace, retry, idempotency) lives in the
//! `orchestration` crate; this crate adds the stage clients, the
//! orchestrator loop, and the HTTP surface.

pub mod config;
pub mod orchestrator;
pub mod server;
pub mod stages;

pub use config::WorkflowConfig;
pub use orchestrator::{StageClients, StageHealth, WorkflowOrchestrator};
pub use server::AppState;
