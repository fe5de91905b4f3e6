//! LLM integration.
//!
//! The assistant core only needs "messages in, text out"; everything else
//! (endpoints, auth, response shapes) stays behind [`LlmProvider`].

mod openai;

pub use openai::OpenAiCompatProvider;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::LlmConfig;
use crate::error::LlmError;

/// Message roles in a chat exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a chat exchange.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A completion request.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }
}

/// A completion response: the raw text the output parser consumes.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
}

/// Narrow interface to a chat model.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// The model this provider targets, for logging.
    fn model_name(&self) -> &str;

    /// Run one completion.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// Create an LLM provider based on configuration.
pub fn create_llm_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    tracing::info!(model = %config.model, "using OpenAI-compatible chat completions API");
    Ok(Arc::new(OpenAiCompatProvider::new(config.clone())?))
}
