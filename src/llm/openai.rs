//! OpenAI-compatible chat completions provider.
//!
//! Works against api.openai.com or any server speaking the same
//! `/chat/completions` dialect (local gateways included); API key auth.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::LlmError;

use super::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider};

const PROVIDER: &str = "openai";

/// Chat completions provider with API key auth.
pub struct OpenAiCompatProvider {
    client: Client,
    config: LlmConfig,
}

impl OpenAiCompatProvider {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        if config.api_key.is_none() {
            return Err(LlmError::AuthFailed {
                provider: PROVIDER.to_string(),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());

        Ok(Self { client, config })
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn api_key(&self) -> String {
        self.config
            .api_key
            .as_ref()
            .map(|k| k.expose_secret().to_string())
            .unwrap_or_default()
    }
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = self.api_url("chat/completions");
        let body = ChatCompletionBody {
            model: &self.config.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        tracing::debug!(%url, model = %self.config.model, "sending chat completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key()))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        let response_text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            if status.as_u16() == 401 {
                return Err(LlmError::AuthFailed {
                    provider: PROVIDER.to_string(),
                });
            }
            if status.as_u16() == 429 {
                let retry_after = headers
                    .get("retry-after")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);

                return Err(LlmError::RateLimited {
                    provider: PROVIDER.to_string(),
                    retry_after,
                });
            }
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("HTTP {status}: {response_text}"),
            });
        }

        let parsed: ChatCompletionResponse =
            serde_json::from_str(&response_text).map_err(|e| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: format!("JSON parse error: {e}"),
            })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: "response carried no choices".to_string(),
            })?;

        Ok(CompletionResponse { content })
    }
}
