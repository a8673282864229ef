pub mod engine;
pub mod error;
pub mod extractor;
pub mod generator;
pub mod model;
pub mod reasoning;
pub mod runner;
pub mod session;
pub mod validator;

// Re-export commonly used types
pub use engine::{DEFAULT_MAX_RETRIES, EngineConfig, WorkflowEngine, WorkflowState};
pub use error::{FlowError, Result};
pub use extractor::{MarkerExtractor, classify_input};
pub use generator::CandidateGenerator;
pub use model::{
    AnalysisResult, ApprovalStatus, DrugCandidate, MolecularProfile, RejectReason, Verdict,
};
pub use reasoning::{
    AdmissionFilter, ExtractionRequest, FilterVerdict, InputKind, ReasoningClient,
    SimulatedReasoningClient,
};
#[cfg(feature = "rig")]
pub use reasoning::rig::RigReasoningClient;
pub use runner::AnalysisRunner;
pub use session::{
    AnalysisStatus, FailureDetail, ObserverId, ProgressEvent, ProgressReceiver, Session,
    SessionRegistry,
};
pub use validator::{CandidateValidator, ValidationOutcome};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn dry_runner() -> AnalysisRunner {
        let client = Arc::new(SimulatedReasoningClient::new());
        AnalysisRunner::new(
            Arc::new(SessionRegistry::new()),
            client.clone(),
            client,
            EngineConfig::default(),
        )
    }

    async fn drain(mut rx: ProgressReceiver) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn dry_run_analysis_completes_end_to_end() {
        let runner = dry_runner();
        let session_id = runner.start_analysis("Parkinson's disease", true).unwrap();

        let (_, rx) = runner.registry().subscribe(&session_id).unwrap();
        let events = drain(rx).await;

        assert!(events.len() >= 4);
        assert!(events.windows(2).all(|w| w[0].percent <= w[1].percent));
        assert_eq!(events.last().unwrap().state, WorkflowState::Completed);
        assert_eq!(events.last().unwrap().percent, 100);

        match runner.registry().get_result(&session_id).unwrap() {
            AnalysisStatus::Completed(result) => {
                assert_eq!(result.molecular_analysis.disease_name, "Parkinson's disease");
                assert!(!result.candidates.is_empty());
                assert!(result.candidates.iter().all(|c| c.is_accepted()));
            }
            other => panic!("expected completed analysis, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn late_subscribers_see_full_history_without_gaps_or_duplicates() {
        let runner = dry_runner();
        let session_id = runner.start_analysis("Parkinson's disease", true).unwrap();

        // First observer follows the run live to completion.
        let (_, early_rx) = runner.registry().subscribe(&session_id).unwrap();
        let live_events = drain(early_rx).await;

        // Second observer arrives after the terminal event; the replay must
        // match the live sequence exactly.
        let (_, late_rx) = runner.registry().subscribe(&session_id).unwrap();
        let replayed = drain(late_rx).await;

        assert_eq!(live_events.len(), replayed.len());
        for (live, replay) in live_events.iter().zip(&replayed) {
            assert_eq!(live.percent, replay.percent);
            assert_eq!(live.message, replay.message);
        }
    }

    #[tokio::test]
    async fn concurrent_sessions_are_isolated() {
        let runner = dry_runner();
        let first = runner.start_analysis("Parkinson's disease", true).unwrap();
        let second = runner.start_analysis("Leigh syndrome", true).unwrap();
        assert_ne!(first, second);

        let (_, first_rx) = runner.registry().subscribe(&first).unwrap();
        let (_, second_rx) = runner.registry().subscribe(&second).unwrap();
        drain(first_rx).await;
        drain(second_rx).await;

        let first_result = match runner.registry().get_result(&first).unwrap() {
            AnalysisStatus::Completed(r) => r,
            other => panic!("expected completed, got {other:?}"),
        };
        let second_result = match runner.registry().get_result(&second).unwrap() {
            AnalysisStatus::Completed(r) => r,
            other => panic!("expected completed, got {other:?}"),
        };
        assert_eq!(first_result.molecular_analysis.disease_name, "Parkinson's disease");
        assert_eq!(second_result.molecular_analysis.disease_name, "Leigh syndrome");
    }
}
