//! The dispatch loop.
//!
//! One inbound message is processed completely (transcript, context,
//! generation, routing) before the next is fetched, so there is never
//! more than one generation in flight against the same conversation state.

use std::sync::Arc;
use std::time::Duration;

use crate::agents::AgentRegistry;

use super::{ActionGenerator, ActionRouter, ContextBuilder, InboundReceiver, Transcript};

/// Single consumer of the inbound queue.
pub struct Dispatcher {
    assistant_name: String,
    queue: InboundReceiver,
    transcript: Arc<Transcript>,
    context: Arc<ContextBuilder>,
    generator: ActionGenerator,
    router: ActionRouter,
    agents: Arc<AgentRegistry>,
    failure_backoff: Duration,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        assistant_name: impl Into<String>,
        queue: InboundReceiver,
        transcript: Arc<Transcript>,
        context: Arc<ContextBuilder>,
        generator: ActionGenerator,
        router: ActionRouter,
        agents: Arc<AgentRegistry>,
        failure_backoff: Duration,
    ) -> Self {
        Self {
            assistant_name: assistant_name.into(),
            queue,
            transcript,
            context,
            generator,
            router,
            agents,
            failure_backoff,
        }
    }

    /// Run until the queue closes (process shutdown). Nothing that happens
    /// inside one iteration can end the loop.
    pub async fn run(mut self) {
        tracing::info!("dispatch loop started");
        while let Some(inbound) = self.queue.recv().await {
            self.process(inbound).await;
        }
        tracing::info!("dispatch queue closed, loop ending");
    }

    /// One full iteration for one inbound message.
    async fn process(&self, inbound: super::InboundMessage) {
        let to = inbound
            .to_user
            .clone()
            .unwrap_or_else(|| self.assistant_name.clone());
        self.transcript
            .append(
                &inbound.message,
                &inbound.from_user,
                &to,
                inbound.location.as_deref(),
            )
            .await;

        // Sessions and tasks may have changed since the last iteration, so
        // both prompt halves are rebuilt every time.
        let (instructions, context) =
            match (self.context.instructions().await, self.context.context().await) {
                (Ok(instructions), Ok(context)) => (instructions, context),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::error!("could not assemble prompt context: {e}");
                    self.transcript
                        .append_system(
                            &self.assistant_name,
                            &format!("Error: could not assemble conversation context: {e}"),
                        )
                        .await;
                    return;
                }
            };

        let known_agents = self.agents.names().await;

        match self
            .generator
            .generate(&instructions, &context, &known_agents)
            .await
        {
            Ok(parsed) => {
                for warning in &parsed.warnings {
                    tracing::warn!("parse warning: {warning}");
                }
                if let Some(thought) = &parsed.actions.thought {
                    // Private reasoning: logged, never delivered.
                    tracing::debug!("thought: {thought}");
                }
                self.router.route(&parsed.actions).await;
            }
            Err(e) => {
                tracing::error!(attempts = e.attempts(), "generation failed: {e}");
                self.transcript
                    .append_system(&self.assistant_name, &format!("Error: {e}"))
                    .await;
                tokio::time::sleep(self.failure_backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::generate::testing::ScriptedLlm;
    use super::super::{InboundMessage, inbound_queue};
    use super::*;
    use crate::channels::SessionRegistry;
    use crate::channels::testing::{RecordingSink, device};
    use crate::config::AssistantConfig;
    use crate::error::LlmError;
    use crate::store::MemoryStore;
    use crate::tools::ToolRegistry;
    use crate::tools::builtin::ShortTermMemory;

    struct Harness {
        dispatcher: Dispatcher,
        tx: super::super::InboundSender,
        transcript: Arc<Transcript>,
        sessions: Arc<SessionRegistry>,
    }

    fn harness(llm: Arc<ScriptedLlm>) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let sessions = Arc::new(SessionRegistry::new());
        let agents = Arc::new(AgentRegistry::new());
        let tools = Arc::new(ToolRegistry::new());
        let transcript = Arc::new(Transcript::new(store.clone(), 100));
        let (tx, rx) = inbound_queue();

        let context = Arc::new(ContextBuilder::new(
            AssistantConfig::default(),
            store.clone(),
            store,
            sessions.clone(),
            agents.clone(),
            tools.clone(),
            ShortTermMemory::new(),
            transcript.clone(),
        ));

        let router = ActionRouter::new(
            "Keeva",
            sessions.clone(),
            agents.clone(),
            tools,
            transcript.clone(),
            tx.clone(),
            Duration::from_secs(1),
        );

        let dispatcher = Dispatcher::new(
            "Keeva",
            rx,
            transcript.clone(),
            context,
            ActionGenerator::new(llm, 3),
            router,
            agents,
            Duration::from_secs(10),
        );

        Harness {
            dispatcher,
            tx,
            transcript,
            sessions,
        }
    }

    /// The router keeps a reentry sender alive, so the loop never sees the
    /// queue close mid-test; poll for the expected state and abort instead.
    async fn wait_until<F, Fut>(mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..500 {
            if condition().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_message_is_generated_and_delivered() {
        let llm = ScriptedLlm::always("Thought: reply\n@Sam hello back");
        let h = harness(llm);
        let sink = RecordingSink::new();
        h.sessions
            .add(device("speaker", "kitchen", None), sink.clone())
            .await;

        h.tx.send(
            InboundMessage::from_user("Sam", "Keeva", "hello").with_location("kitchen"),
        )
        .unwrap();
        let transcript = h.transcript.clone();
        let handle = tokio::spawn(h.dispatcher.run());

        wait_until(|| async { !sink.sent.lock().await.is_empty() }).await;
        handle.abort();

        assert_eq!(*sink.sent.lock().await, vec!["hello back"]);
        let entries = transcript.entries().await;
        assert!(entries.iter().any(|e| e.contains("Sam [kitchen]: @Keeva hello")));
        assert!(entries.iter().any(|e| e.contains("Keeva: @Sam hello back")));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_generation_reports_once_and_loop_continues() {
        fn refused() -> Result<String, LlmError> {
            Err(LlmError::RequestFailed {
                provider: "scripted".to_string(),
                reason: "down".to_string(),
            })
        }
        // First message: three failed attempts. Second message: success.
        let llm = ScriptedLlm::new(vec![
            refused(),
            refused(),
            refused(),
            Ok("Thought: back up\n@Sam all good now".to_string()),
        ]);
        let h = harness(llm);
        let sink = RecordingSink::new();
        h.sessions
            .add(device("speaker", "kitchen", None), sink.clone())
            .await;

        h.tx.send(InboundMessage::from_user("Sam", "Keeva", "first"))
            .unwrap();
        h.tx.send(InboundMessage::from_user("Sam", "Keeva", "second"))
            .unwrap();

        let transcript = h.transcript.clone();
        let handle = tokio::spawn(h.dispatcher.run());

        // The paused clock auto-advances through the 10s backoff between
        // the failed first message and the successful second one.
        wait_until(|| async { !sink.sent.lock().await.is_empty() }).await;
        handle.abort();

        let entries = transcript.entries().await;
        let error_entries: Vec<_> = entries
            .iter()
            .filter(|e| e.contains("SYSTEM: @Keeva Error:"))
            .collect();
        // Exactly one system error for the failed generation.
        assert_eq!(error_entries.len(), 1);
        assert!(error_entries[0].contains("3 attempt(s)"));

        // The loop survived and handled the second message.
        assert_eq!(*sink.sent.lock().await, vec!["all good now"]);
    }
}
