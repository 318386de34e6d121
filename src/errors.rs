use thiserror::Error;

/// Raised only at pipeline construction, when declared stage dependencies do
/// not form a DAG over known stage names (spec.md §7). Fatal — construction
/// fails outright rather than producing a pipeline that could stall at run
/// time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineValidationError {
    #[error("stage `{stage}` depends on unknown stage `{depends_on}`")]
    UnknownDependency { stage: String, depends_on: String },

    #[error("stage `{stage}` depends on `{depends_on}`, which is declared later or is itself")]
    ForwardOrSelfDependency { stage: String, depends_on: String },

    #[error("duplicate stage name `{0}`")]
    DuplicateStageName(String),
}

/// Classification of LLM collaborator failures (spec.md §6: "errors
/// classified as retryable ... or terminal"). Retryable failures are worth a
/// bounded retry at the call site; terminal ones should fall straight
/// through to the deterministic fallback for that call.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM call timed out")]
    Timeout,
    #[error("LLM service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("LLM rate limited")]
    RateLimited,
    #[error("LLM call failed: {0}")]
    Terminal(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::Timeout | LlmError::ServiceUnavailable(_) | LlmError::RateLimited
        )
    }
}
