//! Live reasoning client backed by an OpenRouter model via rig.

use async_trait::async_trait;
use rig::agent::Agent;
use rig::completion::Chat;
use rig::prelude::*;
use rig::providers::openrouter;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

use crate::error::{FlowError, Result};
use crate::model::{ApprovalStatus, DrugCandidate, MolecularProfile, Verdict};
use crate::reasoning::{
    AdmissionFilter, ExtractionRequest, FilterVerdict, InputKind, ReasoningClient,
};

const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Attempts per prompt before giving up with `ReasoningUnavailable`. Covers
/// transient transport errors and malformed JSON answers alike.
const MAX_ATTEMPTS: u32 = 2;

const EXTRACT_PREAMBLE: &str = r#"You are a molecular pathologist.
Identify the key molecular markers of the disease or pathology you are given:
genetic mutations, cellular abnormalities, affected molecular pathways,
protein expression changes and other molecular phenotypes.
Respond ONLY with JSON of the form
{ "disease_name": "...", "molecular_markers": { "category": ["marker", ...] }, "sources": ["...", ...] }"#;

const GENERATE_PREAMBLE: &str = r#"You are an expert in drug repositioning and molecular pathology.
Based on the molecular markers provided, identify existing drugs that could be repurposed.
Focus on drugs targeting similar molecular pathways, used for diseases with similar
molecular abnormalities, or affecting the same cellular processes.
Respond ONLY with JSON of the form
{ "candidates": [ { "drug_name": "...", "approval_status": "...", "current_applications": ["..."], "molecular_rationale": "...", "shared_pathology": "..." } ] }"#;

const VALIDATE_PREAMBLE: &str = r#"You are a strict drug repositioning reviewer.
Answer the single yes/no question you are asked about one drug candidate.
Respond ONLY with JSON of the form { "passed": true/false, "comment": "..." }"#;

#[derive(Debug, Deserialize)]
struct RawProfile {
    disease_name: String,
    molecular_markers: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    sources: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawCandidateList {
    candidates: Vec<RawCandidate>,
}

#[derive(Debug, Deserialize)]
struct RawCandidate {
    drug_name: String,
    #[serde(default)]
    approval_status: String,
    #[serde(default)]
    current_applications: Vec<String>,
    #[serde(default)]
    molecular_rationale: String,
    #[serde(default)]
    shared_pathology: String,
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    passed: bool,
    #[serde(default)]
    comment: String,
}

/// Reasoning client that prompts an OpenRouter-hosted model.
///
/// The agent is built per call, mirroring how short-lived completion agents
/// are used elsewhere in this codebase; the API key comes from
/// `OPENROUTER_API_KEY` at call time.
pub struct RigReasoningClient {
    model: String,
}

impl RigReasoningClient {
    pub fn new() -> Self {
        Self {
            model: std::env::var("OPENROUTER_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        }
    }

    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    fn agent(&self, preamble: &str) -> Result<Agent<openrouter::CompletionModel>> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| FlowError::ReasoningUnavailable("OPENROUTER_API_KEY not set".into()))?;
        let client = openrouter::Client::new(&api_key);
        Ok(client.agent(&self.model).preamble(preamble).build())
    }

    /// Prompt the model and parse its JSON answer, retrying a bounded number
    /// of times before reporting the service unavailable.
    async fn prompt_json<T: serde::de::DeserializeOwned>(
        &self,
        preamble: &str,
        prompt: &str,
    ) -> Result<T> {
        let agent = self.agent(preamble)?;
        let mut last_error = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            let raw = match agent.chat(prompt, vec![]).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(attempt, error = %e, "reasoning call failed");
                    last_error = e.to_string();
                    continue;
                }
            };

            match serde_json::from_str::<T>(strip_code_fences(&raw)) {
                Ok(parsed) => return Ok(parsed),
                Err(e) => {
                    warn!(attempt, error = %e, "reasoning response was not valid JSON");
                    last_error = format!("malformed response: {e}");
                }
            }
        }

        Err(FlowError::ReasoningUnavailable(last_error))
    }
}

impl Default for RigReasoningClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReasoningClient for RigReasoningClient {
    async fn extract_markers(&self, request: &ExtractionRequest) -> Result<MolecularProfile> {
        let prompt = match request.kind {
            InputKind::DiseaseName => format!(
                "Disease: {}\n\nIdentify its known molecular markers.",
                request.input
            ),
            InputKind::PathologyDescription => format!(
                "Molecular pathology observations:\n{}\n\nSummarize and categorize these \
                 observations into a molecular profile.",
                request.input
            ),
        };

        info!(kind = ?request.kind, "extracting molecular markers");
        let raw: RawProfile = self.prompt_json(EXTRACT_PREAMBLE, &prompt).await?;
        Ok(MolecularProfile {
            disease_name: raw.disease_name,
            molecular_markers: raw.molecular_markers,
            sources: raw.sources,
        })
    }

    async fn generate_candidates(
        &self,
        profile: &MolecularProfile,
        excluded: &HashSet<String>,
    ) -> Result<Vec<DrugCandidate>> {
        let mut prompt = format!(
            "Disease: {}\nMolecular markers: {}\n\nIdentify potential drug repositioning \
             candidates based on shared molecular pathology.",
            profile.disease_name,
            serde_json::to_string(&profile.molecular_markers).unwrap_or_default(),
        );
        if !excluded.is_empty() {
            let mut names: Vec<&str> = excluded.iter().map(String::as_str).collect();
            names.sort_unstable();
            prompt.push_str(&format!(
                "\n\nDo NOT propose any of these previously rejected drugs: {}.",
                names.join(", ")
            ));
        }

        info!(excluded = excluded.len(), "generating drug candidates");
        let raw: RawCandidateList = self.prompt_json(GENERATE_PREAMBLE, &prompt).await?;
        Ok(raw
            .candidates
            .into_iter()
            .map(|c| DrugCandidate {
                drug_name: c.drug_name,
                approval_status: ApprovalStatus::from_text(&c.approval_status),
                current_applications: c.current_applications,
                molecular_rationale: c.molecular_rationale,
                shared_pathology: c.shared_pathology,
                verdict: Verdict::Pending,
            })
            .collect())
    }

    async fn validate_candidate(
        &self,
        profile: &MolecularProfile,
        candidate: &DrugCandidate,
        filter: AdmissionFilter,
    ) -> Result<FilterVerdict> {
        let question = match filter {
            AdmissionFilter::AlreadyInUse => format!(
                "Target disease: {}\nDrug: {}\nCurrent applications: {}\n\nIs this drug NOT \
                 already approved or in trials for the target disease? Pass only drugs that \
                 would be genuinely novel for this disease.",
                profile.disease_name,
                candidate.drug_name,
                candidate.current_applications.join(", "),
            ),
            AdmissionFilter::MechanisticPlausibility => format!(
                "Target disease: {}\nMolecular markers: {}\nDrug: {}\nProposed rationale: {}\n\n\
                 Does the drug's known mechanism coherently connect to the disease's molecular \
                 markers? Pass only mechanistically sound proposals.",
                profile.disease_name,
                serde_json::to_string(&profile.molecular_markers).unwrap_or_default(),
                candidate.drug_name,
                candidate.molecular_rationale,
            ),
        };

        let raw: RawVerdict = self.prompt_json(VALIDATE_PREAMBLE, &question).await?;
        Ok(FilterVerdict {
            passed: raw.passed,
            comment: raw.comment,
        })
    }
}

/// Remove a Markdown code fence if the model wrapped its JSON in one.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_prefix = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_prefix
        .strip_suffix("```")
        .unwrap_or(without_prefix)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::strip_code_fences;

    #[test]
    fn strips_json_fences() {
        assert_eq!(
            strip_code_fences("```json\n{\"passed\": true}\n```"),
            "{\"passed\": true}"
        );
        assert_eq!(strip_code_fences("{\"passed\": false}"), "{\"passed\": false}");
    }
}
