use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use crate::error::{FlowError, Result};
use crate::extractor::MarkerExtractor;
use crate::generator::CandidateGenerator;
use crate::model::AnalysisResult;
use crate::reasoning::ReasoningClient;
use crate::session::{FailureDetail, ProgressEvent, Session};
use crate::validator::CandidateValidator;

/// Default bound on the validation -> generation back-edge.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Lifecycle state of an analysis session.
///
/// `Init` is the start state; `Completed` and `Failed` are terminal. The
/// only cycle is the conditional back-edge from `Validating` to
/// `GeneratingCandidates`, bounded by the retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Init,
    ExtractingMarkers,
    GeneratingCandidates,
    Validating,
    Completed,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowState::Completed | WorkflowState::Failed)
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Drives one analysis from user input to a terminal session state.
///
/// The engine sequences extraction, generation and validation, loops back
/// to generation while the validator signals retry, and writes every
/// progress event and the terminal outcome into the session. Each run is
/// single-threaded; concurrency exists only across sessions.
pub struct WorkflowEngine {
    extractor: MarkerExtractor,
    generator: CandidateGenerator,
    validator: CandidateValidator,
    max_retries: u32,
}

impl WorkflowEngine {
    pub fn new(client: Arc<dyn ReasoningClient>, config: EngineConfig) -> Self {
        Self {
            extractor: MarkerExtractor::new(client.clone()),
            generator: CandidateGenerator::new(client.clone()),
            validator: CandidateValidator::new(client),
            max_retries: config.max_retries,
        }
    }

    /// Execute the full workflow against `session`. On success the session
    /// is `Completed` with the returned result set; on any stage failure or
    /// cancellation it is `Failed` with the error recorded. Stage failures
    /// are never retried; the retry loop applies only to an admissible
    /// validation verdict with zero accepted candidates.
    pub async fn run(&self, session: &Session, user_input: &str) -> Result<AnalysisResult> {
        match self.drive(session, user_input).await {
            Ok(result) => Ok(result),
            Err(e) => {
                self.fail(session, &e);
                Err(e)
            }
        }
    }

    async fn drive(&self, session: &Session, user_input: &str) -> Result<AnalysisResult> {
        let mut cancel = session.cancel_signal();

        info!(session_id = %session.id, "starting analysis");
        session.emit(ProgressEvent::new(
            1,
            10,
            "Analyzing molecular pathology...",
            WorkflowState::ExtractingMarkers,
        ));

        let profile =
            Self::checked(&mut cancel, self.extractor.extract(user_input)).await?;

        session.emit(ProgressEvent::new(
            2,
            40,
            "Identifying drug candidates...",
            WorkflowState::GeneratingCandidates,
        ));

        let mut retries = 0u32;
        let mut excluded: HashSet<String> = HashSet::new();
        let mut filter_log: Vec<String> = Vec::new();

        loop {
            let candidates =
                Self::checked(&mut cancel, self.generator.generate(&profile, &excluded))
                    .await?;

            session.emit(ProgressEvent::new(
                3,
                70,
                "Filtering and validating...",
                WorkflowState::Validating,
            ));

            let outcome = Self::checked(
                &mut cancel,
                self.validator
                    .validate(&profile, candidates, retries < self.max_retries),
            )
            .await?;
            filter_log.push(outcome.rationale);

            if outcome.should_retry {
                retries += 1;
                excluded.extend(outcome.rejected.iter().map(|c| c.drug_name.clone()));
                info!(
                    session_id = %session.id,
                    retries,
                    excluded = excluded.len(),
                    "no candidate admitted, regenerating"
                );
                session.emit(ProgressEvent::new(
                    2,
                    70,
                    "Re-evaluating candidates...",
                    WorkflowState::GeneratingCandidates,
                ));
                continue;
            }

            let exhausted = outcome.accepted.is_empty();
            if exhausted {
                filter_log.push(format!(
                    "No qualifying repositioning candidates were found after {retries} \
                     regeneration attempts."
                ));
            }

            let result = AnalysisResult {
                molecular_analysis: profile,
                candidates: outcome.accepted,
                filter_analysis: filter_log.join("\n\n"),
                user_input: user_input.trim().to_string(),
                created_at: Utc::now(),
            };
            session.set_result(result.clone());
            session.emit(ProgressEvent::new(
                3,
                100,
                if exhausted {
                    "Analysis complete: no qualifying candidates were found"
                } else {
                    "Analysis complete"
                },
                WorkflowState::Completed,
            ));

            info!(
                session_id = %session.id,
                candidates = result.candidates.len(),
                retries,
                "analysis completed"
            );
            return Ok(result);
        }
    }

    /// Await one stage, abandoning the run as soon as cancellation is
    /// observed. An in-flight reasoning call is dropped, not awaited.
    async fn checked<T>(
        cancel: &mut watch::Receiver<bool>,
        stage: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            result = stage => result,
            _ = cancel.wait_for(|cancelled| *cancelled) => Err(FlowError::Cancelled),
        }
    }

    fn fail(&self, session: &Session, error: &FlowError) {
        let detail = FailureDetail {
            kind: error.kind().to_string(),
            message: error.to_string(),
        };
        error!(
            session_id = %session.id,
            kind = %detail.kind,
            "analysis failed: {}",
            detail.message
        );
        session.set_error(detail);

        // Percent stays where it was so the log remains non-decreasing.
        let stage = session.current_stage();
        let percent = session.last_percent();
        session.emit(ProgressEvent::new(
            stage,
            percent,
            error.to_string(),
            WorkflowState::Failed,
        ));
    }
}
