use std::sync::Arc;
use tracing::info;

use crate::error::{FlowError, Result};
use crate::model::{DrugCandidate, MolecularProfile, RejectReason, Verdict};
use crate::reasoning::{AdmissionFilter, ReasoningClient};

/// Outcome of one validation pass over a batch of candidates.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    /// Candidates that passed both admission filters, verdict = `Accepted`.
    pub accepted: Vec<DrugCandidate>,
    /// Candidates rejected by either filter, verdict = `Rejected`.
    pub rejected: Vec<DrugCandidate>,
    /// Per-candidate narration of why each was admitted or rejected. Used
    /// for display only, never for control flow.
    pub rationale: String,
    /// True iff nothing was accepted and the caller still has retry budget.
    pub should_retry: bool,
}

/// Applies the two ordered admission filters to each candidate.
///
/// Filter order matters: a drug already in use for the target disease is
/// rejected as `AlreadyInUse` without spending a plausibility check on it.
pub struct CandidateValidator {
    client: Arc<dyn ReasoningClient>,
}

impl CandidateValidator {
    pub fn new(client: Arc<dyn ReasoningClient>) -> Self {
        Self { client }
    }

    /// `can_retry` is the caller's retry-budget check (current retry count is
    /// below the maximum); the validator itself never tracks retries.
    pub async fn validate(
        &self,
        profile: &MolecularProfile,
        candidates: Vec<DrugCandidate>,
        can_retry: bool,
    ) -> Result<ValidationOutcome> {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let mut lines = Vec::new();

        if candidates.is_empty() {
            lines.push("No candidates were proposed for evaluation.".to_string());
        }

        for mut candidate in candidates {
            let in_use_check = self
                .check(profile, &candidate, AdmissionFilter::AlreadyInUse)
                .await?;
            if !in_use_check.0 {
                candidate.verdict = Verdict::Rejected {
                    reason: RejectReason::AlreadyInUse,
                };
                lines.push(format!(
                    "{}: rejected (already in use) - {}",
                    candidate.drug_name, in_use_check.1
                ));
                rejected.push(candidate);
                continue;
            }

            let plausibility_check = self
                .check(profile, &candidate, AdmissionFilter::MechanisticPlausibility)
                .await?;
            if !plausibility_check.0 {
                candidate.verdict = Verdict::Rejected {
                    reason: RejectReason::ImplausibleMechanism,
                };
                lines.push(format!(
                    "{}: rejected (implausible mechanism) - {}",
                    candidate.drug_name, plausibility_check.1
                ));
                rejected.push(candidate);
                continue;
            }

            candidate.verdict = Verdict::Accepted;
            lines.push(format!(
                "{}: accepted - {}",
                candidate.drug_name, plausibility_check.1
            ));
            accepted.push(candidate);
        }

        let should_retry = accepted.is_empty() && can_retry;
        info!(
            disease = %profile.disease_name,
            accepted = accepted.len(),
            rejected = rejected.len(),
            should_retry,
            "validation pass finished"
        );

        Ok(ValidationOutcome {
            accepted,
            rejected,
            rationale: lines.join("\n"),
            should_retry,
        })
    }

    async fn check(
        &self,
        profile: &MolecularProfile,
        candidate: &DrugCandidate,
        filter: AdmissionFilter,
    ) -> Result<(bool, String)> {
        let verdict = self
            .client
            .validate_candidate(profile, candidate, filter)
            .await
            .map_err(|e| FlowError::ValidationFailed(Box::new(e)))?;
        Ok((verdict.passed, verdict.comment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::{ExtractionRequest, InputKind, SimulatedReasoningClient};

    async fn profile_for(disease: &str) -> MolecularProfile {
        SimulatedReasoningClient::new()
            .extract_markers(&ExtractionRequest {
                input: disease.to_string(),
                kind: InputKind::DiseaseName,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn candidates_passing_both_filters_are_accepted() {
        let client = Arc::new(SimulatedReasoningClient::new());
        let profile = profile_for("Parkinson's disease").await;
        let candidates = client
            .generate_candidates(&profile, &Default::default())
            .await
            .unwrap();

        let validator = CandidateValidator::new(client);
        let outcome = validator.validate(&profile, candidates, true).await.unwrap();

        assert!(!outcome.accepted.is_empty());
        assert!(outcome.accepted.iter().all(|c| c.is_accepted()));
        assert!(!outcome.should_retry);
    }

    #[tokio::test]
    async fn already_in_use_rejection_short_circuits_plausibility() {
        let client = Arc::new(SimulatedReasoningClient::new());
        // Lithium's current application IS the target disease here.
        let profile = profile_for("Bipolar Disorder").await;
        let candidates = client
            .generate_candidates(&profile, &Default::default())
            .await
            .unwrap();

        let validator = CandidateValidator::new(client);
        let outcome = validator.validate(&profile, candidates, true).await.unwrap();

        let lithium = outcome
            .rejected
            .iter()
            .find(|c| c.drug_name == "Lithium")
            .expect("lithium should be rejected");
        assert_eq!(
            lithium.verdict,
            Verdict::Rejected {
                reason: RejectReason::AlreadyInUse
            }
        );
        assert!(outcome.rationale.contains("already in use"));
    }

    #[tokio::test]
    async fn empty_batch_yields_retry_signal_when_budget_remains() {
        let client = Arc::new(SimulatedReasoningClient::new());
        let profile = profile_for("Parkinson's disease").await;
        let validator = CandidateValidator::new(client);

        let outcome = validator.validate(&profile, Vec::new(), true).await.unwrap();
        assert!(outcome.should_retry);
        assert!(outcome.rationale.contains("No candidates"));

        let exhausted = validator.validate(&profile, Vec::new(), false).await.unwrap();
        assert!(!exhausted.should_retry);
    }
}
