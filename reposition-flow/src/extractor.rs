use regex::Regex;
use std::sync::Arc;
use tracing::info;

use crate::error::{FlowError, Result};
use crate::model::MolecularProfile;
use crate::reasoning::{ExtractionRequest, InputKind, ReasoningClient};

/// Marker keywords that suggest the input is a pathology description rather
/// than a bare disease name.
const MARKER_KEYWORDS: &[&str] = &[
    "mutation",
    "pathway",
    "aggregation",
    "deficiency",
    "expression",
    "phenotype",
    "biomarker",
    "upregulat",
    "downregulat",
    "misfold",
];

/// Gene-symbol-shaped token: a run of capitals followed by a digit (APOE4,
/// PSEN1, SOD1). Misses digit-free symbols on purpose; ambiguous input is
/// treated as a disease name.
const GENE_TOKEN_PATTERN: &str = r"\b[A-Z]{2,6}[0-9][A-Z0-9]*\b";

/// Classify raw user input as a disease name or a pathology description.
///
/// This is a heuristic, not a guarantee: input that names a disease while
/// also mentioning a marker keyword is classified as a description, and
/// anything ambiguous falls back to a disease-name query. The reasoning
/// service handles both shapes, so misclassification degrades the prompt,
/// not the workflow.
pub fn classify_input(input: &str) -> InputKind {
    let lower = input.to_lowercase();
    if MARKER_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return InputKind::PathologyDescription;
    }

    let gene_token = Regex::new(GENE_TOKEN_PATTERN).expect("invalid gene token regex");
    if gene_token.is_match(input) {
        return InputKind::PathologyDescription;
    }

    InputKind::DiseaseName
}

/// Turns raw user input into a structured molecular-pathology profile.
pub struct MarkerExtractor {
    client: Arc<dyn ReasoningClient>,
}

impl MarkerExtractor {
    pub fn new(client: Arc<dyn ReasoningClient>) -> Self {
        Self { client }
    }

    pub async fn extract(&self, user_input: &str) -> Result<MolecularProfile> {
        let trimmed = user_input.trim();
        if trimmed.is_empty() {
            return Err(FlowError::EmptyInput);
        }

        let kind = classify_input(trimmed);
        info!(?kind, "classified analysis input");

        let request = ExtractionRequest {
            input: trimmed.to_string(),
            kind,
        };
        self.client
            .extract_markers(&request)
            .await
            .map_err(|e| FlowError::ExtractionFailed(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::SimulatedReasoningClient;

    #[test]
    fn bare_disease_names_classify_as_disease() {
        assert_eq!(classify_input("Parkinson's disease"), InputKind::DiseaseName);
        assert_eq!(classify_input("Leigh syndrome"), InputKind::DiseaseName);
        assert_eq!(classify_input("amyotrophic lateral sclerosis"), InputKind::DiseaseName);
    }

    #[test]
    fn marker_keywords_classify_as_description() {
        assert_eq!(
            classify_input("SNCA mutation with alpha-synuclein aggregation"),
            InputKind::PathologyDescription
        );
        assert_eq!(
            classify_input("complex I deficiency in the electron transport chain"),
            InputKind::PathologyDescription
        );
    }

    #[test]
    fn gene_tokens_classify_as_description() {
        assert_eq!(
            classify_input("elevated APOE4 and PSEN1 involvement"),
            InputKind::PathologyDescription
        );
    }

    #[tokio::test]
    async fn blank_input_is_rejected_without_a_reasoning_call() {
        let extractor = MarkerExtractor::new(Arc::new(SimulatedReasoningClient::new()));
        let err = extractor.extract("   ").await.unwrap_err();
        assert!(matches!(err, FlowError::EmptyInput));
    }

    #[tokio::test]
    async fn extraction_produces_a_profile() {
        let extractor = MarkerExtractor::new(Arc::new(SimulatedReasoningClient::new()));
        let profile = extractor.extract("Huntington's disease").await.unwrap();
        assert_eq!(profile.disease_name, "Huntington's disease");
        assert!(profile.molecular_markers.contains_key("pathways"));
    }
}
