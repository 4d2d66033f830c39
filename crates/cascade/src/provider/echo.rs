//! Offline provider that answers deterministically from the prompt itself.

use super::{priced_usage, Generation, GenerationSettings, Provider, ProviderError};
use async_trait::async_trait;
use cascade_core::Prompt;

/// Longest prompt excerpt echoed back, in characters.
const EXCERPT_CHARS: usize = 240;

#[derive(Debug, Clone, Default)]
pub struct EchoProvider {
    cost_per_1k_tokens: f64,
}

impl EchoProvider {
    pub fn new(cost_per_1k_tokens: f64) -> Self {
        Self { cost_per_1k_tokens }
    }

    fn respond(prompt: &Prompt) -> String {
        let headline = prompt.user.lines().next().unwrap_or_default();
        let excerpt: String = headline.chars().take(EXCERPT_CHARS).collect();
        let words = word_count(&prompt.user);
        format!("[echo] {excerpt}\n\n({words} words of input considered)")
    }
}

fn word_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

#[async_trait]
impl Provider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        _settings: &GenerationSettings,
    ) -> Result<Generation, ProviderError> {
        let text = Self::respond(prompt);
        let usage = priced_usage(
            word_count(&prompt.system) + word_count(&prompt.user),
            word_count(&text),
            self.cost_per_1k_tokens,
        );
        Ok(Generation { text, usage })
    }
}
