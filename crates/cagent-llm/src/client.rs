use async_trait::async_trait;
use cagent_core::{AgentError, ChatMessage};

/// Abstract chat-completion capability. The engine depends only on this
/// trait, never on a concrete HTTP client, so the iteration loop and the
/// supervisor can be exercised against a scripted double.
#[async_trait]
pub trait ChatComplete: Send + Sync {
    /// Request one completion for the given message history. Implementors
    /// classify failures as `ModelTransportFailure` (the caller may retry)
    /// or `ModelFatalFailure` (retrying will not help).
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AgentError>;
}
