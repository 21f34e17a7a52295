//! Anthropic Claude provider implementation.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::{Completion, CompletionProvider, ProviderError};

/// Anthropic Claude API provider.
pub struct AnthropicProvider {
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Creates a new Anthropic provider.
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [AnthropicMessage<'a>; 1],
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: i64,
    output_tokens: i64,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[async_trait::async_trait]
impl CompletionProvider for AnthropicProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
        model: &str,
        max_tokens: u32,
        deadline: Instant,
    ) -> Result<Completion, ProviderError> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        let request = AnthropicRequest {
            model,
            max_tokens,
            system: system_prompt,
            messages: [AnthropicMessage {
                role: "user",
                content: user_message,
            }],
        };

        let resp = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .timeout(timeout)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(ProviderError::from_status(status, &body));
        }

        let response: AnthropicResponse = serde_json::from_str(&body)?;

        let text = response
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text),
                AnthropicContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(Completion {
            text,
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_collects_only_text_blocks() {
        let body = r#"{
            "content": [{"type": "text", "text": "hello "}, {"type": "text", "text": "world"}],
            "usage": {"input_tokens": 10, "output_tokens": 2}
        }"#;
        let parsed: AnthropicResponse = serde_json::from_str(body).unwrap();
        let text: String = parsed
            .content
            .into_iter()
            .filter_map(|b| match b {
                AnthropicContentBlock::Text { text } => Some(text),
                AnthropicContentBlock::Other => None,
            })
            .collect();
        assert_eq!(text, "hello world");
        assert_eq!(parsed.usage.input_tokens, 10);
    }
}
