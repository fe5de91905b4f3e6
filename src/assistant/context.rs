//! Per-iteration prompt assembly.
//!
//! Sessions, tasks, users, and registries all change underneath the loop,
//! so the prompt is rebuilt from live state on every iteration rather than
//! cached.

use std::sync::Arc;

use crate::agents::AgentRegistry;
use crate::channels::SessionRegistry;
use crate::config::AssistantConfig;
use crate::error::DatabaseError;
use crate::store::{ProfileStore, TaskStore};
use crate::tools::ToolRegistry;
use crate::tools::builtin::ShortTermMemory;

use super::Transcript;

/// Output format contract sent as the leading system message.
pub const OUTPUT_INSTRUCTIONS: &str = r#"**Output Format Instructions:**

Your entire response MUST be a multi-line text string following these rules:

1.  **Thought (Mandatory First Line):** Start the *first line* exactly with `Thought: ` followed by your internal reasoning or plan.
2.  **Actions (Subsequent Lines):** Each line after the `Thought:` line must represent ONE single action. Blank lines are ignored.
3.  **User Messages:** Use `@UserName ` (e.g., `@Sam `) followed by the message text.
4.  **Agent Messages:** Use `@AgentName ` (e.g., `@HomeAssistantAgent `) followed by the message text. Never send an agent a message addressed back to itself.
5.  **Tool Calls:** Use `/commandName ` followed by arguments. Arguments with spaces MUST be in double quotes (`"`). Examples:
    * `/remember "User meeting is at 3 PM"`
    * `/addTask "Call dentist" "2025-04-01 09:00"`
6.  **One Action Per Line:** Do NOT put multiple `@` targets or `/` commands on the same line. Use a new line for each action.
7.  **No Action Needed:** If only internal thought is required, output *only* the `Thought:` line.
8.  **Ignored Lines:** Any line after `Thought:` that doesn't start with `@` or `/` will be ignored."#;

/// Builds the two prompt halves the generator needs: standing instructions
/// and the current world state.
pub struct ContextBuilder {
    config: AssistantConfig,
    profiles: Arc<dyn ProfileStore>,
    tasks: Arc<dyn TaskStore>,
    sessions: Arc<SessionRegistry>,
    agents: Arc<AgentRegistry>,
    tools: Arc<ToolRegistry>,
    memory: Arc<ShortTermMemory>,
    transcript: Arc<Transcript>,
}

impl ContextBuilder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AssistantConfig,
        profiles: Arc<dyn ProfileStore>,
        tasks: Arc<dyn TaskStore>,
        sessions: Arc<SessionRegistry>,
        agents: Arc<AgentRegistry>,
        tools: Arc<ToolRegistry>,
        memory: Arc<ShortTermMemory>,
        transcript: Arc<Transcript>,
    ) -> Self {
        Self {
            config,
            profiles,
            tasks,
            sessions,
            agents,
            tools,
            memory,
            transcript,
        }
    }

    /// Standing instructions: stored identity prompt plus the output
    /// format contract.
    pub async fn instructions(&self) -> Result<String, DatabaseError> {
        let identity = self.profiles.assistant_identity().await?;
        let base_prompt = match identity {
            Some(identity) => identity.base_prompt,
            None => format!(
                "You are {}, a helpful home assistant coordinating users, \
                 smart-home agents, and local tools.",
                self.config.name
            ),
        };

        Ok(format!("{base_prompt}\n\n{OUTPUT_INSTRUCTIONS}"))
    }

    /// Current world state: devices, users, tasks, rosters, memory, and
    /// the conversation window.
    pub async fn context(&self) -> Result<String, DatabaseError> {
        let mut sections = Vec::new();

        let locations = self.sessions.connected_locations().await;
        sections.push(format!(
            "Connected devices are: {}",
            if locations.is_empty() {
                "none".to_string()
            } else {
                locations.join(", ")
            }
        ));

        let users = self.profiles.registered_users().await?;
        let nicks: Vec<&str> = users.iter().map(|u| u.nick_name.as_str()).collect();
        sections.push(format!("Registered users: {}", nicks.join(", ")));

        let pending = self.tasks.pending_tasks().await?;
        if !pending.is_empty() {
            let mut tasks_block = String::from("Tasks:");
            for task in &pending {
                let due = task
                    .execute_at
                    .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "unscheduled".to_string());
                let recurring = task
                    .recurrence
                    .as_ref()
                    .map(|r| format!(" (recurring {})", r.recurrence_type))
                    .unwrap_or_default();
                tasks_block
                    .push_str(&format!("\n* {} [{due}] {}{recurring}", task.id, task.description));
            }
            sections.push(tasks_block);
        }

        sections.push(self.agents.render().await);
        sections.push(self.tools.render().await);

        if let Some(memory) = self.memory.render().await {
            sections.push(memory);
        }

        sections.push(format!("Conversation:\n{}", self.transcript.render().await));

        Ok(sections.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AssistantIdentity, MemoryStore};
    use crate::tasks::Task;
    use chrono::Utc;

    fn builder(store: Arc<MemoryStore>) -> ContextBuilder {
        let transcript = Arc::new(Transcript::new(store.clone(), 10));
        ContextBuilder::new(
            AssistantConfig::default(),
            store.clone(),
            store,
            Arc::new(SessionRegistry::new()),
            Arc::new(AgentRegistry::new()),
            Arc::new(ToolRegistry::new()),
            ShortTermMemory::new(),
            transcript,
        )
    }

    #[tokio::test]
    async fn instructions_fall_back_to_config_name() {
        let store = Arc::new(MemoryStore::new());
        let ctx = builder(store);

        let instructions = ctx.instructions().await.unwrap();
        assert!(instructions.contains("You are Keeva"));
        assert!(instructions.contains("Output Format Instructions"));
    }

    #[tokio::test]
    async fn instructions_prefer_stored_identity() {
        let store = Arc::new(MemoryStore::new());
        store
            .set_identity(AssistantIdentity {
                name: "Keeva".to_string(),
                base_prompt: "You are Keeva, guardian of this house.".to_string(),
            })
            .await;
        let ctx = builder(store);

        let instructions = ctx.instructions().await.unwrap();
        assert!(instructions.contains("guardian of this house"));
    }

    #[tokio::test]
    async fn context_reflects_users_and_tasks() {
        let store = Arc::new(MemoryStore::new());
        store.add_user("Sam").await;
        store.add_user("Alex").await;
        store
            .create_task(&Task::once("Call dentist", Utc::now()))
            .await
            .unwrap();
        let ctx = builder(store);

        let context = ctx.context().await.unwrap();
        assert!(context.contains("Registered users: Sam, Alex") || context.contains("Registered users: Alex, Sam"));
        assert!(context.contains("Call dentist"));
        assert!(context.contains("Conversation:"));
    }

    #[tokio::test]
    async fn context_omits_empty_task_block() {
        let store = Arc::new(MemoryStore::new());
        let ctx = builder(store);

        let context = ctx.context().await.unwrap();
        assert!(!context.contains("Tasks:"));
        assert!(context.contains("Connected devices are: none"));
    }
}
