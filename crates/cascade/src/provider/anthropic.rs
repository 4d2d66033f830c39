//! Anthropic messages API backend.

use super::openai::error_message;
use super::{priced_usage, Generation, GenerationSettings, Provider, ProviderError};
use async_trait::async_trait;
use cascade_core::Prompt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: [Message<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: u64,
    output_tokens: u64,
}

pub struct AnthropicProvider {
    base_url: String,
    api_key: String,
    cost_per_1k_tokens: f64,
    http: reqwest::Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl AnthropicProvider {
    pub fn new(base_url: Option<&str>, api_key: String, cost_per_1k_tokens: f64) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            cost_per_1k_tokens,
            http: reqwest::Client::new(),
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        if let Ok(value) = HeaderValue::from_str(&self.api_key) {
            headers.insert("x-api-key", value);
        }
        headers
    }
}

/// Join the text blocks of a response.
fn collect_text(blocks: Vec<ContentBlock>) -> String {
    blocks
        .into_iter()
        .filter(|b| b.kind == "text")
        .filter_map(|b| b.text)
        .collect::<Vec<_>>()
        .join("")
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        settings: &GenerationSettings,
    ) -> Result<Generation, ProviderError> {
        let url = format!("{}/messages", self.base_url);
        let request = MessagesRequest {
            model: settings.model.as_deref().unwrap_or(DEFAULT_MODEL),
            system: &prompt.system,
            messages: [Message {
                role: "user",
                content: &prompt.user,
            }],
            temperature: settings.temperature.min(1.0),
            max_tokens: settings.max_tokens,
        };

        let response = self
            .http
            .post(&url)
            .headers(self.headers())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // 529 is Anthropic's "overloaded".
            return Err(ProviderError::from_status(
                status.as_u16(),
                error_message(&body),
            ));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let text = collect_text(body.content);
        if text.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "no text content in response".into(),
            ));
        }

        let (prompt_tokens, completion_tokens) = body
            .usage
            .map_or((0, 0), |u| (u.input_tokens, u.output_tokens));

        Ok(Generation {
            text,
            usage: priced_usage(prompt_tokens, completion_tokens, self.cost_per_1k_tokens),
        })
    }
}
