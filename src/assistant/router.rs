//! Routing of parsed actions to sessions, agents, and tools.
//!
//! Misses and failures are reported, never raised: an unknown recipient, a
//! closed socket, or a crashing tool each produce a system-visible message
//! and the batch keeps going. Agent calls are fire-and-forget; their
//! replies and all tool results come back through the dispatch queue.

use std::sync::Arc;
use std::time::Duration;

use crate::actions::{Actions, AgentAction, ToolAction, UserAction};
use crate::agents::AgentRegistry;
use crate::channels::SessionRegistry;
use crate::tools::ToolRegistry;

use super::{InboundMessage, InboundSender, SYSTEM_SENDER, Transcript};

/// Routes one parsed action batch.
pub struct ActionRouter {
    assistant_name: String,
    sessions: Arc<SessionRegistry>,
    agents: Arc<AgentRegistry>,
    tools: Arc<ToolRegistry>,
    transcript: Arc<Transcript>,
    reentry: InboundSender,
    tool_timeout: Duration,
}

impl ActionRouter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        assistant_name: impl Into<String>,
        sessions: Arc<SessionRegistry>,
        agents: Arc<AgentRegistry>,
        tools: Arc<ToolRegistry>,
        transcript: Arc<Transcript>,
        reentry: InboundSender,
        tool_timeout: Duration,
    ) -> Self {
        Self {
            assistant_name: assistant_name.into(),
            sessions,
            agents,
            tools,
            transcript,
            reentry,
            tool_timeout,
        }
    }

    /// Route a full batch: agents first so side effects are underway
    /// before the user hears about them, then user delivery, then tools.
    pub async fn route(&self, actions: &Actions) {
        for action in &actions.ai_agent_actions {
            self.route_agent(action).await;
        }
        for action in &actions.user_actions {
            self.route_user(action).await;
        }
        for action in &actions.tools_actions {
            self.route_tool(action).await;
        }
    }

    async fn route_agent(&self, action: &AgentAction) {
        self.transcript
            .append(&action.message, &self.assistant_name, &action.recipient, None)
            .await;

        let Some(agent) = self.agents.get(&action.recipient).await else {
            tracing::warn!(recipient = %action.recipient, "no agent registered under recipient");
            self.transcript
                .append_system(
                    &self.assistant_name,
                    &format!("Unhandled recipient: {}", action.recipient),
                )
                .await;
            return;
        };

        // Fire and forget: the reply re-enters the queue as a fresh
        // inbound message and never blocks this batch.
        let caller = self.assistant_name.clone();
        let message = action.message.clone();
        let reentry = self.reentry.clone();
        tokio::spawn(async move {
            let name = agent.name().to_string();
            let reply = agent.ask(&message, &caller).await;
            let inbound = InboundMessage {
                message: reply,
                from_user: name.clone(),
                to_user: Some(caller),
                location: None,
            };
            if reentry.send(inbound).is_err() {
                tracing::error!(agent = %name, "dispatch queue closed, dropping agent reply");
            }
        });
    }

    async fn route_user(&self, action: &UserAction) {
        self.transcript
            .append(&action.message, &self.assistant_name, &action.recipient, None)
            .await;

        let sessions = self.sessions.sessions_for(&action.recipient).await;
        if sessions.is_empty() {
            tracing::warn!(recipient = %action.recipient, "no active sessions for recipient");
            self.transcript
                .append_system(
                    &self.assistant_name,
                    &format!(
                        "No connected device could show the message for {}.",
                        action.recipient
                    ),
                )
                .await;
            return;
        }

        let targets = match &action.device {
            Some(device) => {
                let pinned: Vec<_> = sessions
                    .iter()
                    .filter(|s| s.device.location == *device)
                    .cloned()
                    .collect();
                if pinned.is_empty() {
                    // Never drop silently: fall back to every session the
                    // recipient has.
                    tracing::error!(
                        device = %device,
                        recipient = %action.recipient,
                        "device not found in sessions, broadcasting instead"
                    );
                    self.transcript
                        .append_system(
                            &self.assistant_name,
                            &format!(
                                "Device '{device}' is not connected; message for {} sent to all their devices.",
                                action.recipient
                            ),
                        )
                        .await;
                    sessions
                } else {
                    pinned
                }
            }
            None => sessions,
        };

        for session in targets {
            if let Err(e) = session.deliver(&action.message).await {
                tracing::error!(
                    device = %session.device.name,
                    recipient = %action.recipient,
                    "delivery failed: {e}"
                );
                self.transcript
                    .append_system(
                        &self.assistant_name,
                        &format!(
                            "Could not deliver message to {} on device {}: {e}",
                            action.recipient, session.device.name
                        ),
                    )
                    .await;
            }
        }
    }

    async fn route_tool(&self, action: &ToolAction) {
        let line = if action.arguments.is_empty() {
            format!("/{}", action.command)
        } else {
            format!("/{} {}", action.command, action.arguments)
        };
        self.transcript
            .append(&line, &self.assistant_name, SYSTEM_SENDER, None)
            .await;

        let Some(tool) = self.tools.get(&action.command).await else {
            tracing::warn!(command = %action.command, "no tool found for command");
            self.report_to_assistant(format!("No tool found for command /{}.", action.command));
            return;
        };

        // Awaited in-line because the result feeds the very next prompt,
        // but bounded so a hung tool cannot starve the loop.
        let outcome =
            tokio::time::timeout(self.tool_timeout, tool.invoke(&action.arguments)).await;

        let report = match outcome {
            Ok(Ok(result)) => format!("Tool /{} result: {result}", action.command),
            Ok(Err(e)) => {
                tracing::error!(command = %action.command, "tool failed: {e}");
                format!("Tool /{} failed: {e}", action.command)
            }
            Err(_) => {
                tracing::error!(
                    command = %action.command,
                    timeout = ?self.tool_timeout,
                    "tool timed out"
                );
                format!(
                    "Tool /{} timed out after {}s.",
                    action.command,
                    self.tool_timeout.as_secs()
                )
            }
        };

        self.report_to_assistant(report);
    }

    /// Tool outcomes go back through the queue so the assistant can react
    /// to them on the next iteration.
    fn report_to_assistant(&self, message: String) {
        let inbound = InboundMessage::system(&self.assistant_name, message);
        if self.reentry.send(inbound).is_err() {
            tracing::error!("dispatch queue closed, dropping tool report");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::EchoAgent;
    use crate::channels::testing::{RecordingSink, device};
    use crate::store::MemoryStore;
    use crate::tools::{Tool, ToolError};
    use async_trait::async_trait;

    struct Fixture {
        router: ActionRouter,
        sessions: Arc<SessionRegistry>,
        agents: Arc<AgentRegistry>,
        tools: Arc<ToolRegistry>,
        transcript: Arc<Transcript>,
        inbound_rx: crate::assistant::InboundReceiver,
    }

    fn fixture() -> Fixture {
        let sessions = Arc::new(SessionRegistry::new());
        let agents = Arc::new(AgentRegistry::new());
        let tools = Arc::new(ToolRegistry::new());
        let transcript = Arc::new(Transcript::new(Arc::new(MemoryStore::new()), 100));
        let (tx, rx) = crate::assistant::inbound_queue();

        let router = ActionRouter::new(
            "Keeva",
            sessions.clone(),
            agents.clone(),
            tools.clone(),
            transcript.clone(),
            tx,
            Duration::from_millis(200),
        );

        Fixture {
            router,
            sessions,
            agents,
            tools,
            transcript,
            inbound_rx: rx,
        }
    }

    fn user_action(recipient: &str, message: &str, device: Option<&str>) -> Actions {
        Actions {
            user_actions: vec![UserAction {
                message: message.to_string(),
                recipient: recipient.to_string(),
                device: device.map(String::from),
            }],
            ..Actions::default()
        }
    }

    #[tokio::test]
    async fn user_action_broadcasts_without_device_pin() {
        let f = fixture();
        let kitchen = RecordingSink::new();
        let office = RecordingSink::new();
        f.sessions
            .add(device("speaker", "kitchen", None), kitchen.clone())
            .await;
        f.sessions
            .add(device("desk", "office", None), office.clone())
            .await;

        f.router.route(&user_action("Sam", "dinner is ready", None)).await;

        assert_eq!(*kitchen.sent.lock().await, vec!["dinner is ready"]);
        assert_eq!(*office.sent.lock().await, vec!["dinner is ready"]);
    }

    #[tokio::test]
    async fn device_pin_restricts_delivery() {
        let f = fixture();
        let kitchen = RecordingSink::new();
        let office = RecordingSink::new();
        f.sessions
            .add(device("speaker", "kitchen", None), kitchen.clone())
            .await;
        f.sessions
            .add(device("desk", "office", None), office.clone())
            .await;

        f.router
            .route(&user_action("Sam", "timer done", Some("kitchen")))
            .await;

        assert_eq!(*kitchen.sent.lock().await, vec!["timer done"]);
        assert!(office.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_device_falls_back_to_broadcast() {
        let f = fixture();
        let kitchen = RecordingSink::new();
        f.sessions
            .add(device("speaker", "kitchen", None), kitchen.clone())
            .await;

        f.router
            .route(&user_action("Sam", "hello?", Some("garage")))
            .await;

        // Never silently dropped: delivered everywhere instead.
        assert_eq!(*kitchen.sent.lock().await, vec!["hello?"]);
        let entries = f.transcript.entries().await;
        assert!(entries.iter().any(|e| e.contains("'garage' is not connected")));
    }

    #[tokio::test]
    async fn owned_devices_do_not_receive_other_users_messages() {
        let f = fixture();
        let sams = RecordingSink::new();
        let alexs = RecordingSink::new();
        f.sessions
            .add(device("sams-phone", "pocket", Some("Sam")), sams.clone())
            .await;
        f.sessions
            .add(device("alex-phone", "bag", Some("Alex")), alexs.clone())
            .await;

        f.router.route(&user_action("Sam", "just for you", None)).await;

        assert_eq!(*sams.sent.lock().await, vec!["just for you"]);
        assert!(alexs.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn failed_delivery_is_reported_not_raised() {
        let f = fixture();
        let broken = RecordingSink::failing();
        f.sessions
            .add(device("speaker", "kitchen", None), broken)
            .await;

        f.router.route(&user_action("Sam", "hello", None)).await;

        let entries = f.transcript.entries().await;
        assert!(entries.iter().any(|e| e.contains("Could not deliver")));
    }

    #[tokio::test]
    async fn no_sessions_at_all_is_reported() {
        let f = fixture();
        f.router.route(&user_action("Sam", "anyone there?", None)).await;

        let entries = f.transcript.entries().await;
        assert!(entries.iter().any(|e| e.contains("No connected device")));
    }

    #[tokio::test]
    async fn agent_reply_reenters_the_queue() {
        let mut f = fixture();
        f.agents.register(EchoAgent::new("HomeAssistantAgent")).await;

        f.router
            .route(&Actions {
                ai_agent_actions: vec![AgentAction {
                    message: "turn on lights".to_string(),
                    recipient: "HomeAssistantAgent".to_string(),
                }],
                ..Actions::default()
            })
            .await;

        let inbound = f.inbound_rx.recv().await.unwrap();
        assert_eq!(inbound.from_user, "HomeAssistantAgent");
        assert_eq!(inbound.to_user.as_deref(), Some("Keeva"));
        assert_eq!(inbound.message, "echo: turn on lights");
    }

    #[tokio::test]
    async fn unknown_agent_is_reported_unhandled() {
        let f = fixture();

        f.router
            .route(&Actions {
                ai_agent_actions: vec![AgentAction {
                    message: "hi".to_string(),
                    recipient: "GhostAgent".to_string(),
                }],
                ..Actions::default()
            })
            .await;

        let entries = f.transcript.entries().await;
        assert!(entries.iter().any(|e| e.contains("Unhandled recipient: GhostAgent")));
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "explode"
        }
        fn description(&self) -> &str {
            "Always fails."
        }
        fn usage(&self) -> &str {
            "/explode"
        }
        async fn invoke(&self, _arguments: &str) -> Result<String, ToolError> {
            Err(ToolError::ExecutionFailed("boom".to_string()))
        }
    }

    struct HangingTool;

    #[async_trait]
    impl Tool for HangingTool {
        fn name(&self) -> &str {
            "hang"
        }
        fn description(&self) -> &str {
            "Never returns."
        }
        fn usage(&self) -> &str {
            "/hang"
        }
        async fn invoke(&self, _arguments: &str) -> Result<String, ToolError> {
            futures::future::pending().await
        }
    }

    struct OkTool;

    #[async_trait]
    impl Tool for OkTool {
        fn name(&self) -> &str {
            "ping"
        }
        fn description(&self) -> &str {
            "Replies pong."
        }
        fn usage(&self) -> &str {
            "/ping"
        }
        async fn invoke(&self, _arguments: &str) -> Result<String, ToolError> {
            Ok("pong".to_string())
        }
    }

    fn tool_action(command: &str) -> ToolAction {
        ToolAction {
            command: command.to_string(),
            arguments: String::new(),
        }
    }

    #[tokio::test]
    async fn tool_result_is_reported_back_to_assistant() {
        let mut f = fixture();
        f.tools.register(Arc::new(OkTool)).await;

        f.router
            .route(&Actions {
                tools_actions: vec![tool_action("ping")],
                ..Actions::default()
            })
            .await;

        let inbound = f.inbound_rx.recv().await.unwrap();
        assert_eq!(inbound.from_user, SYSTEM_SENDER);
        assert!(inbound.message.contains("pong"));
    }

    #[tokio::test]
    async fn unknown_tool_reports_miss() {
        let mut f = fixture();

        f.router
            .route(&Actions {
                tools_actions: vec![tool_action("nonexistent")],
                ..Actions::default()
            })
            .await;

        let inbound = f.inbound_rx.recv().await.unwrap();
        assert!(inbound.message.contains("No tool found"));
    }

    #[tokio::test]
    async fn tool_failure_does_not_stop_sibling_actions() {
        let mut f = fixture();
        f.tools.register(Arc::new(FailingTool)).await;
        f.tools.register(Arc::new(OkTool)).await;

        f.router
            .route(&Actions {
                tools_actions: vec![tool_action("explode"), tool_action("ping")],
                ..Actions::default()
            })
            .await;

        let first = f.inbound_rx.recv().await.unwrap();
        assert!(first.message.contains("failed"));
        let second = f.inbound_rx.recv().await.unwrap();
        assert!(second.message.contains("pong"));
    }

    #[tokio::test]
    async fn hanging_tool_times_out_and_is_reported() {
        let mut f = fixture();
        f.tools.register(Arc::new(HangingTool)).await;

        f.router
            .route(&Actions {
                tools_actions: vec![tool_action("hang")],
                ..Actions::default()
            })
            .await;

        let inbound = f.inbound_rx.recv().await.unwrap();
        assert!(inbound.message.contains("timed out"));
    }

    #[tokio::test]
    async fn batch_routes_agents_then_users_then_tools() {
        let f = fixture();
        f.agents.register(EchoAgent::new("HomeAssistantAgent")).await;
        f.tools.register(Arc::new(OkTool)).await;
        let sink = RecordingSink::new();
        f.sessions.add(device("speaker", "kitchen", None), sink).await;

        // Listed in a scrambled order; routing must still go agents,
        // users, tools.
        f.router
            .route(&Actions {
                thought: Some("plan".to_string()),
                user_actions: vec![UserAction {
                    message: "on it".to_string(),
                    recipient: "Sam".to_string(),
                    device: None,
                }],
                ai_agent_actions: vec![AgentAction {
                    message: "lights on".to_string(),
                    recipient: "HomeAssistantAgent".to_string(),
                }],
                tools_actions: vec![tool_action("ping")],
            })
            .await;

        let entries = f.transcript.entries().await;
        let agent_pos = entries
            .iter()
            .position(|e| e.contains("@HomeAssistantAgent lights on"))
            .unwrap();
        let user_pos = entries.iter().position(|e| e.contains("@Sam on it")).unwrap();
        let tool_pos = entries.iter().position(|e| e.contains("/ping")).unwrap();
        assert!(agent_pos < user_pos);
        assert!(user_pos < tool_pos);
    }

    #[tokio::test]
    async fn routed_actions_are_written_to_the_transcript() {
        let f = fixture();
        let sink = RecordingSink::new();
        f.sessions.add(device("speaker", "kitchen", None), sink).await;

        f.router.route(&user_action("Sam", "hello", None)).await;

        let entries = f.transcript.entries().await;
        assert!(entries.iter().any(|e| e.contains("Keeva: @Sam hello")));
    }
}
