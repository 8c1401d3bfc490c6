// Tavily web-search client with bounded retries

use super::SearchProvider;
use crate::config::{SearchConfig, TAVILY_API_KEY};
use crate::error::SearchError;
use crate::models::Snippet;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;

/// Retry only transient failures, waiting `backoff * attempt` between tries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, backoff: Duration) -> Self {
        Self { retries, backoff }
    }

    /// Delay before retry number `attempt + 1`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff * (attempt + 1)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error or the retries run out
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, SearchError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, SearchError>>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    let delay = self.delay_for(attempt);
                    log::warn!(
                        "Search attempt {} failed ({}), retrying in {:?}",
                        attempt + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(1))
    }
}

/// Client for `POST https://api.tavily.com/search`
pub struct TavilyClient {
    api_key: Option<String>,
    endpoint: String,
    timeout: Duration,
    policy: RetryPolicy,
}

impl TavilyClient {
    pub fn new(api_key: Option<String>, config: &SearchConfig) -> Self {
        Self {
            api_key,
            endpoint: config.endpoint.clone(),
            timeout: config.timeout(),
            policy: RetryPolicy::new(config.retries, config.backoff()),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn search_once(
        &self,
        client: &reqwest::Client,
        api_key: &str,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<Snippet>, SearchError> {
        let body = json!({
            "api_key": api_key,
            "query": query,
            "max_results": max_results,
        });

        let response = client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(SearchError::Http { status, body: text });
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;

        Ok(parse_results(&data, max_results))
    }
}

/// Map a search response onto snippets. Items without text are dropped.
pub fn parse_results(data: &Value, max_results: usize) -> Vec<Snippet> {
    let items = data["results"]
        .as_array()
        .or_else(|| data["items"].as_array())
        .cloned()
        .unwrap_or_default();

    let first_str = |item: &Value, keys: &[&str]| -> String {
        keys.iter()
            .filter_map(|k| item[*k].as_str())
            .find(|s| !s.trim().is_empty())
            .unwrap_or("")
            .to_string()
    };

    items
        .iter()
        .take(max_results)
        .filter_map(|item| {
            let text = first_str(item, &["content", "snippet", "summary", "text"]);
            if text.is_empty() {
                return None;
            }
            Some(Snippet::new(first_str(item, &["url", "link", "page_url"]), text))
        })
        .collect()
}

#[async_trait]
impl SearchProvider for TavilyClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Snippet>, SearchError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SearchError::NotConfigured(format!("{} not set", TAVILY_API_KEY)))?;

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| SearchError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        let snippets = self
            .policy
            .run(|_| self.search_once(&client, api_key, query, max_results))
            .await?;

        log::info!("Search returned {} snippets for '{}'", snippets.len(), query);
        Ok(snippets)
    }
}
