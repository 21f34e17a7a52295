//! `OpenAI` GPT provider implementation.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::{Completion, CompletionProvider, ProviderError};

/// `OpenAI` API provider.
pub struct OpenAiProvider {
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Creates a new `OpenAI` provider.
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: [OpenAiMessage<'a>; 2],
    max_tokens: u32,
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: OpenAiUsage,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: i64,
    completion_tokens: i64,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[async_trait::async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
        model: &str,
        max_tokens: u32,
        deadline: Instant,
    ) -> Result<Completion, ProviderError> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        let request = OpenAiRequest {
            model,
            messages: [
                OpenAiMessage {
                    role: "system",
                    content: system_prompt,
                },
                OpenAiMessage {
                    role: "user",
                    content: user_message,
                },
            ],
            max_tokens,
        };

        let resp = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(ProviderError::from_status(status, &body));
        }

        let response: OpenAiResponse = serde_json::from_str(&body)?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(Completion {
            text,
            input_tokens: response.usage.prompt_tokens,
            output_tokens: response.usage.completion_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_takes_first_choice_content() {
        let body = r#"{
            "choices": [{"message": {"content": "hi there"}}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 3}
        }"#;
        let parsed: OpenAiResponse = serde_json::from_str(body).unwrap();
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap();
        assert_eq!(text, "hi there");
        assert_eq!(parsed.usage.completion_tokens, 3);
    }

    #[test]
    fn missing_content_defaults_to_empty_string() {
        let body = r#"{
            "choices": [{"message": {"content": null}}],
            "usage": {"prompt_tokens": 1, "completion_tokens": 0}
        }"#;
        let parsed: OpenAiResponse = serde_json::from_str(body).unwrap();
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        assert_eq!(text, "");
    }
}
