use std::sync::Mutex;

use async_trait::async_trait;
use cagent_core::{AgentError, ChatMessage};

use crate::client::ChatComplete;

/// Scripted chat client for tests and dry runs: returns each queued
/// response in order, then repeats the last one if the queue is drained.
pub struct NoopChatClient {
    responses: Mutex<Vec<String>>,
}

impl NoopChatClient {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses),
        }
    }
}

#[async_trait]
impl ChatComplete for NoopChatClient {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, AgentError> {
        let mut queue = self.responses.lock().expect("noop client mutex poisoned");
        if queue.len() > 1 {
            Ok(queue.remove(0))
        } else if let Some(last) = queue.first() {
            Ok(last.clone())
        } else {
            Err(AgentError::ModelFatalFailure("no scripted responses remaining".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_responses_in_order_then_repeats_last() {
        let client = NoopChatClient::new(vec!["a".into(), "b".into()]);
        assert_eq!(client.complete(&[]).await.unwrap(), "a");
        assert_eq!(client.complete(&[]).await.unwrap(), "b");
        assert_eq!(client.complete(&[]).await.unwrap(), "b");
    }

    #[tokio::test]
    async fn errors_when_empty() {
        let client = NoopChatClient::new(vec![]);
        assert!(client.complete(&[]).await.is_err());
    }
}
