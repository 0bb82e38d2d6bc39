use async_trait::async_trait;

/// Abstract external web search capability. The engine core never talks
/// to a search provider directly — it goes through this trait the same
/// way model access goes through `ChatComplete`, so the action can be
/// exercised in tests without network access.
#[async_trait]
pub trait WebSearchClient: Send + Sync {
    async fn search(&self, query: &str) -> String;
}

/// Default client for environments with no search provider configured.
/// Returns a plain-text notice rather than erroring, since `web_search`
/// is an optional enrichment action, not a required one.
pub struct NoopWebSearchClient;

#[async_trait]
impl WebSearchClient for NoopWebSearchClient {
    async fn search(&self, query: &str) -> String {
        format!("web search is not configured in this environment (query: \"{query}\")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_client_echoes_query_without_panicking() {
        let client = NoopWebSearchClient;
        let result = client.search("rust async traits").await;
        assert!(result.contains("rust async traits"));
    }
}
