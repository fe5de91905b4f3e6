//! Peer agents: named capability providers addressed via `@Name`.
//!
//! An agent takes a message and eventually answers; the router spawns the
//! call fire-and-forget and feeds the reply back into the dispatch queue,
//! so agents never block the loop.

mod home_assistant;
mod web_search;

pub use home_assistant::HomeAssistantAgent;
pub use web_search::WebSearchAgent;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// A peer capability provider.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Registered name; the parser matches `@Name` against this.
    fn name(&self) -> &str;

    /// One-line capability description for the prompt.
    fn description(&self) -> &str;

    /// Handle a message from `caller` and return the reply text.
    ///
    /// Must not panic; failures come back as error text so the assistant
    /// can relay them.
    async fn ask(&self, message: &str, caller: &str) -> String;
}

/// Registry of available agents, keyed by exact name.
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, Arc<dyn Agent>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under its own name.
    pub async fn register(&self, agent: Arc<dyn Agent>) {
        let name = agent.name().to_string();
        self.agents.write().await.insert(name.clone(), agent);
        tracing::debug!("registered agent: {name}");
    }

    /// Exact, case-sensitive lookup.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.read().await.get(name).cloned()
    }

    /// Snapshot of registered names, taken fresh at each parse.
    pub async fn names(&self) -> HashSet<String> {
        self.agents.read().await.keys().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.agents.read().await.len()
    }

    /// Markdown roster for the prompt.
    pub async fn render(&self) -> String {
        let agents = self.agents.read().await;
        if agents.is_empty() {
            return "* **AI Agents:** None available".to_string();
        }

        let mut names: Vec<&String> = agents.keys().collect();
        names.sort();

        let mut out = String::from("* **AI Agents:**\n");
        for name in names {
            let agent = &agents[name];
            out.push_str(&format!("    * `{}`: {}\n", name, agent.description()));
        }
        out.push_str("    * To talk to AI Agents, use `@<ai_agent_name>`");
        out
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Agent that echoes with a fixed prefix.
    pub struct EchoAgent {
        pub name: String,
    }

    impl EchoAgent {
        pub fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
            })
        }
    }

    #[async_trait]
    impl Agent for EchoAgent {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "Echoes messages back"
        }

        async fn ask(&self, message: &str, _caller: &str) -> String {
            format!("echo: {message}")
        }
    }
}
