use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::Result;
use crate::model::{ApprovalStatus, DrugCandidate, MolecularProfile};

#[cfg(feature = "rig")]
pub mod rig;

/// How the user's input was classified before extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// A bare disease name; the reasoning service is asked for the known
    /// molecular markers of that disease.
    DiseaseName,
    /// A molecular-pathology description; the reasoning service summarizes
    /// the input itself into a profile.
    PathologyDescription,
}

/// Structured input for the marker-extraction prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub input: String,
    pub kind: InputKind,
}

/// Which admission filter a validation call should apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionFilter {
    AlreadyInUse,
    MechanisticPlausibility,
}

/// Outcome of one admission-filter check against a single candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterVerdict {
    pub passed: bool,
    pub comment: String,
}

/// Typed capability boundary around the external reasoning service.
///
/// Implementations either call out to an LLM or answer deterministically
/// (see [`SimulatedReasoningClient`]). Every method maps transport and
/// malformed-output failures to `FlowError::ReasoningUnavailable`; callers
/// wrap that into the stage-specific error kind.
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// Turn user input into a molecular-pathology profile.
    async fn extract_markers(&self, request: &ExtractionRequest) -> Result<MolecularProfile>;

    /// Propose repositioning candidates for the profile. Names in `excluded`
    /// were rejected in earlier rounds of the same run and must not be
    /// re-proposed. An empty list is a legitimate answer.
    async fn generate_candidates(
        &self,
        profile: &MolecularProfile,
        excluded: &HashSet<String>,
    ) -> Result<Vec<DrugCandidate>>;

    /// Apply one admission filter to one candidate.
    async fn validate_candidate(
        &self,
        profile: &MolecularProfile,
        candidate: &DrugCandidate,
        filter: AdmissionFilter,
    ) -> Result<FilterVerdict>;
}

/// Deterministic reasoning client for demo and dry-run mode.
///
/// Returns canned data for every prompt kind, never fails, and performs no
/// network I/O. The extraction step echoes the caller's disease name so
/// dry-run output stays recognizable.
#[derive(Debug, Default, Clone)]
pub struct SimulatedReasoningClient;

impl SimulatedReasoningClient {
    pub fn new() -> Self {
        Self
    }

    fn canned_candidates() -> Vec<DrugCandidate> {
        vec![
            DrugCandidate {
                drug_name: "Metformin".to_string(),
                approval_status: ApprovalStatus::Approved,
                current_applications: vec!["Type 2 Diabetes".to_string()],
                molecular_rationale:
                    "Activates the AMPK pathway, reduces neuroinflammation and may \
                     dampen tau phosphorylation"
                        .to_string(),
                shared_pathology: "Metabolic dysfunction and oxidative stress".to_string(),
                verdict: Default::default(),
            },
            DrugCandidate {
                drug_name: "Lithium".to_string(),
                approval_status: ApprovalStatus::Approved,
                current_applications: vec!["Bipolar Disorder".to_string()],
                molecular_rationale:
                    "Inhibits GSK-3B, reduces tau phosphorylation, neuroprotective effects"
                        .to_string(),
                shared_pathology: "Tau pathway dysfunction".to_string(),
                verdict: Default::default(),
            },
            DrugCandidate {
                drug_name: "Rapamycin".to_string(),
                approval_status: ApprovalStatus::Approved,
                current_applications: vec![
                    "Immunosuppression".to_string(),
                    "Cancer".to_string(),
                ],
                molecular_rationale:
                    "mTOR inhibition enhances autophagy and clears protein aggregates"
                        .to_string(),
                shared_pathology: "Protein aggregation and autophagy dysfunction".to_string(),
                verdict: Default::default(),
            },
        ]
    }
}

#[async_trait]
impl ReasoningClient for SimulatedReasoningClient {
    async fn extract_markers(&self, request: &ExtractionRequest) -> Result<MolecularProfile> {
        let disease_name = match request.kind {
            InputKind::DiseaseName => request.input.trim().to_string(),
            InputKind::PathologyDescription => {
                format!("Pathology profile: {}", request.input.trim())
            }
        };

        let mut molecular_markers = BTreeMap::new();
        molecular_markers.insert(
            "mutations".to_string(),
            vec!["APOE4".to_string(), "APP".to_string(), "PSEN1".to_string()],
        );
        molecular_markers.insert(
            "cellular_abnormalities".to_string(),
            vec![
                "protein aggregation".to_string(),
                "mitochondrial dysfunction".to_string(),
                "neuroinflammation".to_string(),
            ],
        );
        molecular_markers.insert(
            "pathways".to_string(),
            vec![
                "autophagy".to_string(),
                "oxidative stress".to_string(),
                "tau phosphorylation".to_string(),
            ],
        );

        Ok(MolecularProfile {
            disease_name,
            molecular_markers,
            sources: vec!["PubMed".to_string(), "KEGG".to_string()],
        })
    }

    async fn generate_candidates(
        &self,
        _profile: &MolecularProfile,
        excluded: &HashSet<String>,
    ) -> Result<Vec<DrugCandidate>> {
        let lowered: HashSet<String> = excluded.iter().map(|n| n.to_lowercase()).collect();
        Ok(Self::canned_candidates()
            .into_iter()
            .filter(|c| !lowered.contains(&c.drug_name.to_lowercase()))
            .collect())
    }

    async fn validate_candidate(
        &self,
        profile: &MolecularProfile,
        candidate: &DrugCandidate,
        filter: AdmissionFilter,
    ) -> Result<FilterVerdict> {
        match filter {
            AdmissionFilter::AlreadyInUse => {
                let disease = profile.disease_name.to_lowercase();
                let in_use = candidate
                    .current_applications
                    .iter()
                    .any(|a| a.to_lowercase().contains(&disease) || disease.contains(&a.to_lowercase()));
                Ok(FilterVerdict {
                    passed: !in_use,
                    comment: if in_use {
                        format!("{} is already used for {}", candidate.drug_name, profile.disease_name)
                    } else {
                        format!("{} is not part of current care for {}", candidate.drug_name, profile.disease_name)
                    },
                })
            }
            AdmissionFilter::MechanisticPlausibility => {
                let plausible = !candidate.molecular_rationale.trim().is_empty();
                Ok(FilterVerdict {
                    passed: plausible,
                    comment: if plausible {
                        "mechanism coherently connects to the profile markers".to_string()
                    } else {
                        "no molecular rationale provided".to_string()
                    },
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulated_extraction_echoes_disease_name() {
        let client = SimulatedReasoningClient::new();
        let profile = client
            .extract_markers(&ExtractionRequest {
                input: "Parkinson's disease".to_string(),
                kind: InputKind::DiseaseName,
            })
            .await
            .unwrap();
        assert_eq!(profile.disease_name, "Parkinson's disease");
        assert!(!profile.molecular_markers.is_empty());
        assert!(!profile.sources.is_empty());
    }

    #[tokio::test]
    async fn simulated_generation_respects_exclusions() {
        let client = SimulatedReasoningClient::new();
        let profile = client
            .extract_markers(&ExtractionRequest {
                input: "ALS".to_string(),
                kind: InputKind::DiseaseName,
            })
            .await
            .unwrap();

        let excluded: HashSet<String> = ["metformin".to_string()].into_iter().collect();
        let candidates = client.generate_candidates(&profile, &excluded).await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.drug_name != "Metformin"));
    }

    #[tokio::test]
    async fn simulated_already_in_use_filter_rejects_standard_of_care() {
        let client = SimulatedReasoningClient::new();
        let profile = client
            .extract_markers(&ExtractionRequest {
                input: "Bipolar Disorder".to_string(),
                kind: InputKind::DiseaseName,
            })
            .await
            .unwrap();

        let lithium = SimulatedReasoningClient::canned_candidates()
            .into_iter()
            .find(|c| c.drug_name == "Lithium")
            .unwrap();

        let verdict = client
            .validate_candidate(&profile, &lithium, AdmissionFilter::AlreadyInUse)
            .await
            .unwrap();
        assert!(!verdict.passed);
    }
}
