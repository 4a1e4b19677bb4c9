//! AI provider abstraction
//!
//! The queue workers only see `AiProvider`; the concrete client is chosen once
//! at startup from the bootstrap configuration.

mod openai;

pub use openai::{OpenAiProvider, DEFAULT_BASE_URL};

use crate::settings::AiSettings;
use async_trait::async_trait;
use thiserror::Error;

/// System and user message for one chat completion
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Per-call parameters, taken from the operation's settings snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub requests_per_minute: u32,
}

impl From<&AiSettings> for CompletionParams {
    fn from(settings: &AiSettings) -> Self {
        Self {
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            requests_per_minute: settings.requests_per_minute,
        }
    }
}

/// Provider failures
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No API key configured
    #[error("AI provider is not configured")]
    NotConfigured,

    /// Provider answered 429
    #[error("AI provider rate limit exceeded")]
    RateLimited,

    #[error("AI provider request failed: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("AI provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("AI provider response could not be parsed: {0}")]
    InvalidResponse(String),
}

impl From<ProviderError> for pulse_common::Error {
    fn from(err: ProviderError) -> Self {
        pulse_common::Error::Provider(err.to_string())
    }
}

/// Chat-completion provider
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Short identifier for logs
    fn name(&self) -> &str;

    /// Run one completion and return the assistant message text
    async fn complete(
        &self,
        prompt: &Prompt,
        params: &CompletionParams,
    ) -> Result<String, ProviderError>;
}

/// Stand-in used when no API key is configured; every call fails
pub struct UnconfiguredProvider;

#[async_trait]
impl AiProvider for UnconfiguredProvider {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn complete(
        &self,
        _prompt: &Prompt,
        _params: &CompletionParams,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_provider_always_fails() {
        let prompt = Prompt {
            system: "s".into(),
            user: "u".into(),
        };
        let params = CompletionParams::from(&AiSettings::default());
        let err = UnconfiguredProvider.complete(&prompt, &params).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured));

        let common: pulse_common::Error = err.into();
        assert!(matches!(common, pulse_common::Error::Provider(_)));
    }

    #[test]
    fn test_params_follow_settings_snapshot() {
        let mut settings = AiSettings::default();
        settings.model = "gpt-4o".into();
        settings.max_tokens = 512;
        let params = CompletionParams::from(&settings);
        assert_eq!(params.model, "gpt-4o");
        assert_eq!(params.max_tokens, 512);
        assert_eq!(params.requests_per_minute, settings.requests_per_minute);
    }
}
