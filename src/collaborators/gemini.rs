// Gemini text-generation client

use super::TextGenerator;
use crate::config::{GenerationConfig, GEMINI_API_KEY};
use crate::error::GenerationError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

const SETUP_GUIDANCE: &str =
    "Set GEMINI_API_KEY in the environment or in ~/.innovation-flow/secrets.toml, \
     and GEMINI_MODEL to choose a model (default gemini-2.5-pro).";

/// Client for the Generative Language `generateContent` endpoint
pub struct GeminiClient {
    api_key: Option<String>,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, config: &GenerationConfig) -> Self {
        Self {
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

/// Concatenated text parts of the first candidate
pub fn candidate_text(response: &Value) -> Option<String> {
    let parts = response["candidates"][0]["content"]["parts"].as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect::<Vec<_>>()
        .join("");
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| GenerationError::NotConfigured {
            guidance: format!("{} is not set. {}", GEMINI_API_KEY, SETUP_GUIDANCE),
        })?;

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| GenerationError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        log::debug!("Calling {} ({} prompt chars)", self.model, prompt.chars().count());

        let response = client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(format!("{}. {}", e, SETUP_GUIDANCE)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Http { status, body: text });
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Transport(format!("Failed to parse response: {}", e)))?;

        candidate_text(&data).ok_or(GenerationError::EmptyResponse)
    }
}
