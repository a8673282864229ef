use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structured summary of a disease's molecular pathology.
///
/// Produced once by marker extraction and treated as immutable by every
/// downstream stage. Markers are grouped by category name (for example
/// `mutations` or `pathways`), each holding an ordered list of marker
/// strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MolecularProfile {
    pub disease_name: String,
    pub molecular_markers: BTreeMap<String, Vec<String>>,
    pub sources: Vec<String>,
}

/// Regulatory approval status of a drug candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Approved,
    Investigational,
    Experimental,
    Unknown,
}

impl ApprovalStatus {
    /// Map free-form status text ("FDA Approved", "Phase II trial", ...)
    /// onto the closest enum value.
    pub fn from_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("approved") {
            ApprovalStatus::Approved
        } else if lower.contains("investigational") || lower.contains("trial") {
            ApprovalStatus::Investigational
        } else if lower.contains("experimental") || lower.contains("preclinical") {
            ApprovalStatus::Experimental
        } else {
            ApprovalStatus::Unknown
        }
    }
}

/// Why a candidate was rejected by an admission filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    AlreadyInUse,
    ImplausibleMechanism,
}

/// Admission verdict assigned by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pending,
    Accepted,
    Rejected { reason: RejectReason },
}

impl Default for Verdict {
    fn default() -> Self {
        Verdict::Pending
    }
}

/// One proposed repositioning candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrugCandidate {
    pub drug_name: String,
    pub approval_status: ApprovalStatus,
    pub current_applications: Vec<String>,
    pub molecular_rationale: String,
    pub shared_pathology: String,
    #[serde(default)]
    pub verdict: Verdict,
}

impl DrugCandidate {
    pub fn is_accepted(&self) -> bool {
        self.verdict == Verdict::Accepted
    }
}

/// Terminal artifact of a completed analysis.
///
/// Every candidate in `candidates` carries an `Accepted` verdict; an empty
/// list means no qualifying repositioning candidate was found, which is a
/// valid outcome, not a failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub molecular_analysis: MolecularProfile,
    pub candidates: Vec<DrugCandidate>,
    pub filter_analysis: String,
    pub user_input: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_status_from_text() {
        assert_eq!(
            ApprovalStatus::from_text("FDA Approved"),
            ApprovalStatus::Approved
        );
        assert_eq!(
            ApprovalStatus::from_text("Phase III trial"),
            ApprovalStatus::Investigational
        );
        assert_eq!(
            ApprovalStatus::from_text("preclinical research"),
            ApprovalStatus::Experimental
        );
        assert_eq!(ApprovalStatus::from_text("???"), ApprovalStatus::Unknown);
    }

    #[test]
    fn verdict_defaults_to_pending() {
        let json = serde_json::json!({
            "drug_name": "Metformin",
            "approval_status": "approved",
            "current_applications": ["Type 2 Diabetes"],
            "molecular_rationale": "AMPK activation",
            "shared_pathology": "metabolic dysfunction"
        });
        let candidate: DrugCandidate = serde_json::from_value(json).unwrap();
        assert_eq!(candidate.verdict, Verdict::Pending);
        assert!(!candidate.is_accepted());
    }
}
