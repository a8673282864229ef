use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::error::{FlowError, Result};
use crate::model::{DrugCandidate, MolecularProfile};
use crate::reasoning::ReasoningClient;

/// Proposes repositioning candidates for a molecular profile.
///
/// The exclusion set carries drug names rejected in earlier rounds of the
/// same run; the reasoning service is instructed not to re-propose them. An
/// empty proposal list is a legitimate outcome, not an error.
pub struct CandidateGenerator {
    client: Arc<dyn ReasoningClient>,
}

impl CandidateGenerator {
    pub fn new(client: Arc<dyn ReasoningClient>) -> Self {
        Self { client }
    }

    pub async fn generate(
        &self,
        profile: &MolecularProfile,
        excluded: &HashSet<String>,
    ) -> Result<Vec<DrugCandidate>> {
        let candidates = self
            .client
            .generate_candidates(profile, excluded)
            .await
            .map_err(|e| FlowError::GenerationFailed(Box::new(e)))?;

        info!(
            disease = %profile.disease_name,
            proposed = candidates.len(),
            excluded = excluded.len(),
            "candidate generation finished"
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::{ExtractionRequest, InputKind, SimulatedReasoningClient};

    #[tokio::test]
    async fn generation_excludes_rejected_names() {
        let client = Arc::new(SimulatedReasoningClient::new());
        let profile = client
            .extract_markers(&ExtractionRequest {
                input: "Leigh syndrome".to_string(),
                kind: InputKind::DiseaseName,
            })
            .await
            .unwrap();

        let generator = CandidateGenerator::new(client);
        let excluded: HashSet<String> =
            ["Lithium".to_string(), "Rapamycin".to_string()].into_iter().collect();
        let candidates = generator.generate(&profile, &excluded).await.unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].drug_name, "Metformin");
    }
}
