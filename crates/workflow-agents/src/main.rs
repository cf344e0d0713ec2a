use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;
use workflow_agents::{AppState, StageClients, WorkflowConfig, WorkflowOrchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = WorkflowConfig::default();
    info!(
        classify = %config.classify.url,
        retrieve = %config.retrieve.url,
        decide = %config.decide.url,
        execute = %config.execute.url,
        "Workflow orchestrator starting"
    );

    let stages = StageClients::http(&config);
    let orchestrator = Arc::new(WorkflowOrchestrator::new(stages, &config));

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    let state = AppState {
        orchestrator,
        shutdown,
    };
    workflow_agents::server::serve(&config.bind_addr, state).await
}
