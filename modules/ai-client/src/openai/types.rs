//! Wire shapes for `/chat/completions`. Only the fields opsgraph reads or
//! writes are modeled.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest {
    pub model: String,
    pub messages: Vec<OutgoingMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct OutgoingMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatRequest {
    /// System + user pair. Reasoning models take `max_completion_tokens` and
    /// reject a temperature; everything else gets `max_tokens` and 0.0.
    pub fn single_turn(model: &str, system: &str, prompt: &str, token_limit: u32) -> Self {
        let reasoning = is_reasoning_model(model);
        Self {
            model: model.to_string(),
            messages: vec![
                OutgoingMessage {
                    role: "system",
                    content: system.to_string(),
                },
                OutgoingMessage {
                    role: "user",
                    content: prompt.to_string(),
                },
            ],
            temperature: (!reasoning).then_some(0.0),
            max_tokens: (!reasoning).then_some(token_limit),
            max_completion_tokens: reasoning.then_some(token_limit),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReplyMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ChatResponse {
    /// Text of the first choice, if it has any.
    pub fn into_text(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
    }
}

fn is_reasoning_model(model: &str) -> bool {
    const PREFIXES: [&str; 4] = ["o1", "o3", "o4", "gpt-5"];
    PREFIXES.iter().any(|p| model.starts_with(p)) || model.contains("-o1") || model.contains("-o3")
}
