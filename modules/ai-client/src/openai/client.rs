use reqwest::header::{HeaderValue, AUTHORIZATION};
use tracing::{debug, warn};

use super::types::{ChatRequest, ChatResponse};
use crate::error::AiError;

/// POST `{base_url}/chat/completions` and decode the reply. Non-2xx statuses
/// surface as `AiError::Api` carrying the raw body.
pub(super) async fn post_chat(
    http: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    request: &ChatRequest,
) -> Result<ChatResponse, AiError> {
    let auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|_| AiError::Config("API key is not a valid header value".into()))?;

    debug!(model = %request.model, "Sending chat completion");
    let response = http
        .post(format!("{base_url}/chat/completions"))
        .header(AUTHORIZATION, auth)
        .json(request)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), model = %request.model, "Chat completion rejected");
        return Err(AiError::Api {
            status: status.as_u16(),
            body,
        });
    }

    let decoded: ChatResponse = response.json().await?;
    if let Some(usage) = &decoded.usage {
        debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "Chat completion usage"
        );
    }
    Ok(decoded)
}
