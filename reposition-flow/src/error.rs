use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlowError>;

/// Errors produced by the analysis workflow.
///
/// The three stage failures (`ExtractionFailed`, `GenerationFailed`,
/// `ValidationFailed`) wrap the underlying cause, which is
/// `ReasoningUnavailable` whenever the reasoning service was unreachable or
/// kept returning malformed output. An exhausted retry budget is not an
/// error: the workflow completes with an empty candidate list instead.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("input is empty")]
    EmptyInput,

    #[error("reasoning service unavailable: {0}")]
    ReasoningUnavailable(String),

    #[error("marker extraction failed: {0}")]
    ExtractionFailed(#[source] Box<FlowError>),

    #[error("candidate generation failed: {0}")]
    GenerationFailed(#[source] Box<FlowError>),

    #[error("candidate validation failed: {0}")]
    ValidationFailed(#[source] Box<FlowError>),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("analysis cancelled")]
    Cancelled,
}

impl FlowError {
    /// Stable machine-readable name for this error kind, recorded in the
    /// session's failure detail.
    pub fn kind(&self) -> &'static str {
        match self {
            FlowError::EmptyInput => "empty_input",
            FlowError::ReasoningUnavailable(_) => "reasoning_unavailable",
            FlowError::ExtractionFailed(_) => "extraction_failed",
            FlowError::GenerationFailed(_) => "generation_failed",
            FlowError::ValidationFailed(_) => "validation_failed",
            FlowError::SessionNotFound(_) => "session_not_found",
            FlowError::Cancelled => "cancelled",
        }
    }
}
