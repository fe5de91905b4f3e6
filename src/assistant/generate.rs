//! Bounded-retry model invocation.
//!
//! One generation = up to `max_attempts` model calls. Parse failures feed
//! back into the next attempt as an explicit compliance demand; provider
//! failures retry the same way but surface as their own terminal kind so
//! operators can tell "bad model output" from "model unreachable".

use std::collections::HashSet;
use std::sync::Arc;

use crate::actions::{Parsed, parse_output};
use crate::error::GenerationError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

enum AttemptFailure {
    Parse,
    Provider,
}

/// Drives the model until its output parses or the attempt ceiling hits.
pub struct ActionGenerator {
    llm: Arc<dyn LlmProvider>,
    max_attempts: u32,
}

impl ActionGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, max_attempts: u32) -> Self {
        Self {
            llm,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Generate and parse one action batch.
    pub async fn generate(
        &self,
        instructions: &str,
        context: &str,
        known_agents: &HashSet<String>,
    ) -> Result<Parsed, GenerationError> {
        let mut failures: Vec<String> = Vec::new();
        let mut last_kind = AttemptFailure::Parse;

        for attempt in 1..=self.max_attempts {
            let request = CompletionRequest::new(self.build_messages(instructions, context, &failures));

            match self.llm.complete(request).await {
                Ok(response) => match parse_output(&response.content, known_agents) {
                    Ok(parsed) => return Ok(parsed),
                    Err(e) => {
                        tracing::warn!(attempt, "model output failed to parse: {e}");
                        failures.push(e.to_string());
                        last_kind = AttemptFailure::Parse;
                    }
                },
                Err(e) => {
                    tracing::warn!(attempt, "model call failed: {e}");
                    failures.push(e.to_string());
                    last_kind = AttemptFailure::Provider;
                }
            }
        }

        let last_error = failures.last().cloned().unwrap_or_default();
        Err(match last_kind {
            AttemptFailure::Parse => GenerationError::MalformedOutput {
                attempts: self.max_attempts,
                last_error,
            },
            AttemptFailure::Provider => GenerationError::ProviderFailure {
                attempts: self.max_attempts,
                last_error,
            },
        })
    }

    /// On retries every accumulated failure is prepended, so the model
    /// sees the whole history of what it got wrong.
    fn build_messages(
        &self,
        instructions: &str,
        context: &str,
        failures: &[String],
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(3);

        if !failures.is_empty() {
            let listed: Vec<String> = failures.iter().map(|e| format!("- {e}")).collect();
            messages.push(ChatMessage::system(format!(
                "Your previous reply could not be processed:\n{}\n\
                 Reply again and follow the output format exactly.",
                listed.join("\n")
            )));
        }

        messages.push(ChatMessage::system(instructions.to_string()));
        messages.push(ChatMessage::user(context.to_string()));
        messages
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedLlm;
    use super::*;
    use crate::error::LlmError;

    fn no_agents() -> HashSet<String> {
        HashSet::new()
    }

    #[tokio::test]
    async fn first_attempt_success_needs_one_call() {
        let llm = ScriptedLlm::always("Thought: ok\n@Sam hello");
        let generator = ActionGenerator::new(llm.clone(), 3);

        let parsed = generator.generate("inst", "ctx", &no_agents()).await.unwrap();
        assert_eq!(parsed.actions.user_actions.len(), 1);
        assert_eq!(llm.requests.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn retry_prepends_failure_feedback() {
        let llm = ScriptedLlm::new(vec![
            Ok("no thought marker here".to_string()),
            Ok("Thought: fixed\n@Sam hi".to_string()),
        ]);
        let generator = ActionGenerator::new(llm.clone(), 3);

        let parsed = generator.generate("inst", "ctx", &no_agents()).await.unwrap();
        assert_eq!(parsed.actions.user_actions.len(), 1);

        let requests = llm.requests.lock().await;
        assert_eq!(requests.len(), 2);
        // First attempt carries no feedback.
        assert_eq!(requests[0].messages.len(), 2);
        // Second attempt leads with the synthesized compliance demand.
        assert_eq!(requests[1].messages.len(), 3);
        assert!(requests[1].messages[0].content.contains("could not be processed"));
        assert!(requests[1].messages[0].content.contains("Thought:"));
    }

    #[tokio::test]
    async fn exhausted_parse_failures_are_malformed_output() {
        let llm = ScriptedLlm::always("still not the format");
        let generator = ActionGenerator::new(llm.clone(), 3);

        let err = generator.generate("inst", "ctx", &no_agents()).await.unwrap_err();
        match err {
            GenerationError::MalformedOutput { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("Thought:"));
            }
            other => panic!("expected MalformedOutput, got {other:?}"),
        }
        assert_eq!(llm.requests.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn provider_failures_surface_distinctly() {
        let llm = ScriptedLlm::new(vec![
            Err(LlmError::RequestFailed {
                provider: "scripted".to_string(),
                reason: "connection refused".to_string(),
            }),
            Err(LlmError::RequestFailed {
                provider: "scripted".to_string(),
                reason: "connection refused".to_string(),
            }),
            Err(LlmError::RequestFailed {
                provider: "scripted".to_string(),
                reason: "connection refused".to_string(),
            }),
        ]);
        let generator = ActionGenerator::new(llm, 3);

        let err = generator.generate("inst", "ctx", &no_agents()).await.unwrap_err();
        assert!(matches!(err, GenerationError::ProviderFailure { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn provider_error_then_parse_success_recovers() {
        let llm = ScriptedLlm::new(vec![
            Err(LlmError::RequestFailed {
                provider: "scripted".to_string(),
                reason: "flaky".to_string(),
            }),
            Ok("Thought: back\n@Sam recovered".to_string()),
        ]);
        let generator = ActionGenerator::new(llm, 3);

        let parsed = generator.generate("inst", "ctx", &no_agents()).await.unwrap();
        assert_eq!(parsed.actions.user_actions[0].message, "recovered");
    }
}
