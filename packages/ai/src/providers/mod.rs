//! Completion provider abstraction and implementations.
//!
//! Each agent call is a single, non-conversational completion: a system
//! prompt plus one user message in, one block of text plus token counts
//! out. No tool-use loop, no multi-turn state; that keeps the provider
//! trait small and lets the orchestrator own all retry/timeout policy.

pub mod anthropic;
pub mod openai;

use std::time::Instant;

use thiserror::Error;

/// Result of one successful completion call.
#[derive(Debug, Clone)]
pub struct Completion {
    /// The model's text output.
    pub text: String,
    /// Prompt tokens billed for this call.
    pub input_tokens: i64,
    /// Completion tokens billed for this call.
    pub output_tokens: i64,
}

/// Coarse classification of a provider failure, used by the orchestrator to
/// decide whether to retry: up to 2 retries with exponential backoff, and
/// only for transient errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// 429 or equivalent; retryable.
    RateLimited,
    /// 5xx, timeout, or connection failure; retryable.
    UpstreamUnavailable,
    /// 4xx other than rate limiting; the request itself is bad. Not
    /// retryable.
    InvalidInput,
    /// 401/403; the configured credentials are bad. Not retryable.
    Auth,
}

impl ProviderErrorKind {
    /// Whether the orchestrator should retry a call that failed this way.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::UpstreamUnavailable)
    }
}

/// A failed completion call.
#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct ProviderError {
    /// What kind of failure this was.
    pub kind: ProviderErrorKind,
    /// Human-readable detail, logged but never shown to end users verbatim.
    pub message: String,
}

impl ProviderError {
    #[must_use]
    pub(crate) fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let kind = if status.as_u16() == 429 {
            ProviderErrorKind::RateLimited
        } else if status.as_u16() == 401 || status.as_u16() == 403 {
            ProviderErrorKind::Auth
        } else if status.is_server_error() {
            ProviderErrorKind::UpstreamUnavailable
        } else {
            ProviderErrorKind::InvalidInput
        };
        Self {
            kind,
            message: format!("HTTP {status}: {body}"),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() || err.is_connect() {
            ProviderErrorKind::UpstreamUnavailable
        } else {
            ProviderErrorKind::InvalidInput
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self {
            kind: ProviderErrorKind::InvalidInput,
            message: err.to_string(),
        }
    }
}

/// Trait every LLM backend implements.
///
/// `deadline` is a hard wall-clock cutoff; implementations should make a
/// best effort to respect it via the HTTP client's own timeout rather than
/// racing a separate future, since request construction itself is cheap.
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Runs one completion.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on any non-2xx response, transport failure,
    /// or malformed response body.
    async fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
        model: &str,
        max_tokens: u32,
        deadline: Instant,
    ) -> Result<Completion, ProviderError>;
}

/// Per-million-token cost in USD, indexed by model identifier.
///
/// Resolves the open question of which concrete numbers to bill at
/// (published list prices as of this writing; operators override via
/// config if pricing changes).
struct ModelRate {
    model: &'static str,
    input_per_million: f64,
    output_per_million: f64,
}

static MODEL_RATES: &[ModelRate] = &[
    ModelRate {
        model: "claude-sonnet-4-20250514",
        input_per_million: 3.00,
        output_per_million: 15.00,
    },
    ModelRate {
        model: "claude-haiku-4-20250514",
        input_per_million: 0.80,
        output_per_million: 4.00,
    },
    ModelRate {
        model: "gpt-4o",
        input_per_million: 2.50,
        output_per_million: 10.00,
    },
];

/// Computes the USD cost of one completion call.
///
/// Unknown models fall back to the most conservative (most expensive) rate
/// in the table, so a misconfigured model id under-bills rather than
/// silently costing $0.
#[must_use]
pub fn cost_usd(model: &str, input_tokens: i64, output_tokens: i64) -> f64 {
    let rate = MODEL_RATES
        .iter()
        .find(|r| r.model == model)
        .unwrap_or_else(|| {
            MODEL_RATES
                .iter()
                .max_by(|a, b| a.output_per_million.total_cmp(&b.output_per_million))
                .expect("MODEL_RATES is non-empty")
        });
    let input_cost = input_tokens as f64 / 1_000_000.0 * rate.input_per_million;
    let output_cost = output_tokens as f64 / 1_000_000.0 * rate.output_per_million;
    input_cost + output_cost
}

/// Builds a provider from environment variables.
///
/// Checks `AI_PROVIDER` (default `"anthropic"`) and the matching API key
/// env var (`ANTHROPIC_API_KEY` or `OPENAI_API_KEY`).
///
/// # Errors
///
/// Returns a [`ProviderError`] with [`ProviderErrorKind::Auth`] if the
/// required API key is not set, or [`ProviderErrorKind::InvalidInput`] if
/// `AI_PROVIDER` names an unsupported backend.
pub fn create_provider_from_env() -> Result<Box<dyn CompletionProvider>, ProviderError> {
    let provider = std::env::var("AI_PROVIDER").unwrap_or_else(|_| "anthropic".to_string());

    match provider.to_lowercase().as_str() {
        "anthropic" | "claude" => {
            let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| ProviderError {
                kind: ProviderErrorKind::Auth,
                message: "ANTHROPIC_API_KEY environment variable not set".to_string(),
            })?;
            Ok(Box::new(anthropic::AnthropicProvider::new(api_key)))
        }
        "openai" | "gpt" => {
            let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| ProviderError {
                kind: ProviderErrorKind::Auth,
                message: "OPENAI_API_KEY environment variable not set".to_string(),
            })?;
            Ok(Box::new(openai::OpenAiProvider::new(api_key)))
        }
        other => Err(ProviderError {
            kind: ProviderErrorKind::InvalidInput,
            message: format!("unknown AI provider: {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ProviderErrorKind::RateLimited.is_retryable());
        assert!(ProviderErrorKind::UpstreamUnavailable.is_retryable());
        assert!(!ProviderErrorKind::InvalidInput.is_retryable());
        assert!(!ProviderErrorKind::Auth.is_retryable());
    }

    #[test]
    fn cost_scales_with_tokens() {
        let cost = cost_usd("claude-haiku-4-20250514", 1_000_000, 0);
        assert!((cost - 0.80).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_falls_back_to_most_expensive_rate() {
        let known = cost_usd("claude-sonnet-4-20250514", 1_000_000, 1_000_000);
        let unknown = cost_usd("some-future-model", 1_000_000, 1_000_000);
        assert!(unknown >= known);
    }

    #[test]
    fn unsupported_provider_name_is_invalid_input() {
        let err = ProviderError {
            kind: ProviderErrorKind::InvalidInput,
            message: "unknown AI provider: bogus".to_string(),
        };
        assert_eq!(err.kind, ProviderErrorKind::InvalidInput);
    }
}
