// External collaborators: text generation and web search
//
// The workflow only sees the two traits below. Concrete clients talk to
// the Gemini and Tavily HTTP APIs; scripted variants serve tests and
// offline runs.

pub mod gemini;
pub mod resilient;
pub mod scripted;
pub mod tavily;

use crate::error::{GenerationError, SearchError};
use crate::models::Snippet;
use async_trait::async_trait;

pub use gemini::GeminiClient;
pub use resilient::{minimal_snippet, ResilientSearch};
pub use scripted::{ScriptedGenerator, StaticSearch};
pub use tavily::{RetryPolicy, TavilyClient};

/// `generate(prompt) -> text`, possibly failing
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// `search(query, max_results) -> [{url, text}]`
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Snippet>, SearchError>;
}
