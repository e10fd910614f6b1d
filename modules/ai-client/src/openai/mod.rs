mod client;
pub(crate) mod types;

use anyhow::Result;

use crate::error::AiError;

use types::ChatRequest;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Chat-completion backend for any OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    model: String,
    max_tokens: u32,
    base_url: String,
    http: reqwest::Client,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            base_url: DEFAULT_BASE_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Point at a self-hosted or proxy endpoint, e.g. `http://localhost:11434/v1`.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One system prompt, one user message, temperature pinned to zero where
    /// the model allows it. Returns the first choice's text.
    pub async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let request = ChatRequest::single_turn(&self.model, system, prompt, self.max_tokens);
        let response = client::post_chat(&self.http, &self.base_url, &self.api_key, &request).await?;
        let text = response
            .into_text()
            .ok_or_else(|| AiError::EmptyResponse(self.model.clone()))?;
        Ok(text)
    }
}

impl std::fmt::Debug for OpenAi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAi")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}
