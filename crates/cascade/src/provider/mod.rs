//! LLM provider abstraction.
//!
//! Every tier talks to its backend through [`Provider`]; the orchestrator never
//! knows which concrete backend it is driving.

mod anthropic;
mod echo;
mod openai;

pub use anthropic::AnthropicProvider;
pub use echo::EchoProvider;
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use cascade_core::config::{OrchestratorConfig, ProviderKind};
use cascade_core::{Prompt, Usage};
use std::sync::Arc;
use thiserror::Error;

/// Environment variable holding the OpenAI API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Environment variable holding the Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("server error: {status} - {message}")]
    Server { status: u16, message: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("bad request: {status} - {message}")]
    BadRequest { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::Network(_) | Self::Server { .. }
        )
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::Auth(message),
            429 => Self::RateLimited(message),
            500..=599 => Self::Server { status, message },
            400..=499 => Self::BadRequest { status, message },
            _ => Self::Other(format!("unexpected status {status}: {message}")),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() || e.is_request() {
            ProviderError::Network(e.to_string())
        } else if e.is_decode() {
            ProviderError::InvalidResponse(e.to_string())
        } else if let Some(status) = e.status() {
            ProviderError::from_status(status.as_u16(), e.to_string())
        } else {
            ProviderError::Other(e.to_string())
        }
    }
}

/// Per-call generation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    /// Model override; `None` uses the provider default.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationSettings {
    pub fn from_config(config: &OrchestratorConfig, temperature: f32) -> Self {
        Self {
            model: config.model.clone(),
            temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// Text produced by one provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub usage: Usage,
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    async fn generate(
        &self,
        prompt: &Prompt,
        settings: &GenerationSettings,
    ) -> Result<Generation, ProviderError>;
}

/// Token usage priced at a flat per-1k-token rate.
pub fn priced_usage(prompt_tokens: u64, completion_tokens: u64, cost_per_1k_tokens: f64) -> Usage {
    let total = prompt_tokens + completion_tokens;
    Usage {
        prompt_tokens,
        completion_tokens,
        cost_usd: total as f64 / 1000.0 * cost_per_1k_tokens,
    }
}

/// Build the provider selected by `config.provider`.
///
/// HTTP providers read their API key from the environment.
pub fn build_provider(config: &OrchestratorConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    match config.provider {
        ProviderKind::Echo => Ok(Arc::new(EchoProvider::new(config.cost_per_1k_tokens))),
        ProviderKind::OpenAi => {
            let api_key = api_key_from_env(OPENAI_API_KEY_ENV)?;
            Ok(Arc::new(OpenAiProvider::new(
                config.base_url.as_deref(),
                api_key,
                config.cost_per_1k_tokens,
            )))
        }
        ProviderKind::Anthropic => {
            let api_key = api_key_from_env(ANTHROPIC_API_KEY_ENV)?;
            Ok(Arc::new(AnthropicProvider::new(
                config.base_url.as_deref(),
                api_key,
                config.cost_per_1k_tokens,
            )))
        }
    }
}

fn api_key_from_env(var: &str) -> Result<String, ProviderError> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(ProviderError::Auth(format!("{var} is not set"))),
    }
}
