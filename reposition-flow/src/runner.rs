//! AnalysisRunner - convenience wrapper that validates input, creates a
//! session, and spawns the workflow engine on its own task.
//!
//! Callers (web handlers, CLI demos) get a session id back immediately and
//! observe the run through the registry: subscribe for live progress,
//! `get_result` for a non-blocking status, `list_completed` for history.

use std::sync::Arc;
use tracing::{info, warn};

use crate::engine::{EngineConfig, WorkflowEngine};
use crate::error::{FlowError, Result};
use crate::reasoning::ReasoningClient;
use crate::session::SessionRegistry;

/// Front door for starting analyses.
///
/// Holds the live and simulated reasoning clients; `dry_run` picks the
/// simulated one, which answers deterministically without network I/O.
#[derive(Clone)]
pub struct AnalysisRunner {
    registry: Arc<SessionRegistry>,
    live_client: Arc<dyn ReasoningClient>,
    simulated_client: Arc<dyn ReasoningClient>,
    config: EngineConfig,
}

impl AnalysisRunner {
    pub fn new(
        registry: Arc<SessionRegistry>,
        live_client: Arc<dyn ReasoningClient>,
        simulated_client: Arc<dyn ReasoningClient>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            live_client,
            simulated_client,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Start one analysis and return its session id.
    ///
    /// Blank input fails synchronously with `EmptyInput` and no session is
    /// created. Everything else runs on a spawned task; stage failures land
    /// in the session as a terminal `Failed` state rather than here.
    pub fn start_analysis(&self, user_input: &str, dry_run: bool) -> Result<String> {
        let trimmed = user_input.trim();
        if trimmed.is_empty() {
            return Err(FlowError::EmptyInput);
        }

        let client = if dry_run {
            self.simulated_client.clone()
        } else {
            self.live_client.clone()
        };

        let session = self.registry.create_session(trimmed);
        let session_id = session.id.clone();
        info!(session_id = %session_id, dry_run, "analysis accepted");

        let engine = WorkflowEngine::new(client, self.config.clone());
        let registry = self.registry.clone();
        let input = trimmed.to_string();
        tokio::spawn(async move {
            match engine.run(&session, &input).await {
                Ok(result) => registry.record_completed(result),
                Err(e) => {
                    warn!(session_id = %session.id, error = %e, "analysis ended in failure")
                }
            }
        });

        Ok(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::SimulatedReasoningClient;
    use crate::session::AnalysisStatus;

    fn dry_runner() -> AnalysisRunner {
        let client = Arc::new(SimulatedReasoningClient::new());
        AnalysisRunner::new(
            Arc::new(SessionRegistry::new()),
            client.clone(),
            client,
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn blank_input_fails_synchronously_and_creates_no_session() {
        let runner = dry_runner();
        let err = runner.start_analysis("   ", true).unwrap_err();
        assert!(matches!(err, FlowError::EmptyInput));
        assert!(runner.registry().is_empty());
        assert!(runner.registry().list_completed().is_empty());
    }

    #[tokio::test]
    async fn completed_runs_are_recorded_in_history() {
        let runner = dry_runner();
        let session_id = runner.start_analysis("Parkinson's disease", true).unwrap();

        let (_, mut rx) = runner.registry().subscribe(&session_id).unwrap();
        while rx.recv().await.is_some() {}

        match runner.registry().get_result(&session_id).unwrap() {
            AnalysisStatus::Completed(result) => {
                assert_eq!(result.molecular_analysis.disease_name, "Parkinson's disease");
            }
            other => panic!("expected completed, got {other:?}"),
        }

        // History is recorded by the spawned task just after the terminal
        // event, so give it a moment.
        for _ in 0..50 {
            if !runner.registry().list_completed().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(runner.registry().list_completed().len(), 1);
    }
}
