//! Web search agent backed by the OpenAI Responses API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;

use crate::config::WebSearchConfig;

use super::Agent;

pub const AGENT_NAME: &str = "WebSearchAgent";

pub struct WebSearchAgent {
    client: Client,
    config: WebSearchConfig,
}

impl WebSearchAgent {
    pub fn new(config: WebSearchConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, config }
    }

    async fn search(&self, query: &str) -> Result<String, String> {
        let url = format!("{}/responses", self.config.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.config.model,
            "tools": [{ "type": "web_search_preview" }],
            "input": query,
        });

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.api_key.expose_secret()),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Error occurred while processing the message: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(format!("Web search failed. {status}, [{detail}]"));
        }

        let parsed: ResponsesReply = response
            .json()
            .await
            .map_err(|e| format!("Unreadable web search response: {e}"))?;

        Ok(parsed.output_text())
    }
}

#[derive(Deserialize)]
struct ResponsesReply {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<ContentItem>,
}

#[derive(Deserialize)]
struct ContentItem {
    #[serde(default)]
    text: String,
}

impl ResponsesReply {
    /// Concatenated text across all output items.
    fn output_text(&self) -> String {
        let text: Vec<&str> = self
            .output
            .iter()
            .flat_map(|o| o.content.iter())
            .map(|c| c.text.as_str())
            .filter(|t| !t.is_empty())
            .collect();

        if text.is_empty() {
            "No search results.".to_string()
        } else {
            text.join("\n")
        }
    }
}

#[async_trait]
impl Agent for WebSearchAgent {
    fn name(&self) -> &str {
        AGENT_NAME
    }

    fn description(&self) -> &str {
        "Searches the internet for up-to-date information, news, and real-time data"
    }

    async fn ask(&self, message: &str, _caller: &str) -> String {
        let reply = match self.search(message).await {
            Ok(text) => text,
            Err(error) => error,
        };

        format!("{reply} Remember to update Users on status.")
    }
}
