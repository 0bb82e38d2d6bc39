/// Error taxonomy for the run orchestrator.
///
/// Most variants are recovered locally (fed back into the loop as tool
/// observation text) rather than propagated; `Canceled` is the only one
/// guaranteed to unwind the whole engine.
#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("tool failure: {0}")]
    ToolFailure(String),

    #[error("failed to parse model output: {0}")]
    ParseFailure(String),

    #[error("model transport error (retryable): {0}")]
    ModelTransportFailure(String),

    #[error("model transport error (fatal): {0}")]
    ModelFatalFailure(String),

    #[error("verification failed: {0}")]
    VerificationFailure(String),

    #[error("clarification required before edits can proceed")]
    ClarificationRequired,

    #[error("run canceled")]
    Canceled,

    #[error("persistence degraded: {0}")]
    StorageDegraded(String),

    #[error("supervisor exhausted recovery cycles: {0}")]
    SupervisorExhaustion(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AgentError {
    /// Whether this error kind is recoverable within the current run (i.e.
    /// should be surfaced as observation text rather than terminate the
    /// cycle). Only `Canceled` and clarification-required always terminate.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            AgentError::Canceled
                | AgentError::ClarificationRequired
                | AgentError::ModelFatalFailure(_)
        )
    }
}
