//! Typed actions extracted from model output.
//!
//! The model replies with a `Thought:` line followed by one action per line;
//! [`parser::parse_output`] turns that text into an [`Actions`] batch that
//! the router consumes. Recipient classification (agent vs. user) lives here
//! so the parser and the router share one rule.

mod parser;

pub use parser::{ParseError, ParseWarning, Parsed, parse_output};

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A message addressed to a human user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAction {
    pub message: String,
    pub recipient: String,
    /// Pins delivery to the session whose device location matches.
    /// Unset means broadcast to all of the recipient's sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// A message addressed to a peer agent by its registered name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAction {
    pub message: String,
    pub recipient: String,
}

/// A local tool invocation.
///
/// `arguments` is the raw text after the command token, preserved verbatim;
/// tokenization is the tool's responsibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolAction {
    pub command: String,
    pub arguments: String,
}

/// One parsed action line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    User(UserAction),
    Agent(AgentAction),
    Tool(ToolAction),
}

/// Everything the model asked for in one response.
///
/// This is the boundary artifact between parsing and routing; the router
/// consumes the three lists in a fixed order (agents, users, tools).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actions {
    pub thought: Option<String>,
    pub user_actions: Vec<UserAction>,
    pub ai_agent_actions: Vec<AgentAction>,
    pub tools_actions: Vec<ToolAction>,
}

impl Actions {
    /// Total number of actions across all three lists.
    pub fn len(&self) -> usize {
        self.user_actions.len() + self.ai_agent_actions.len() + self.tools_actions.len()
    }

    /// True when the response carried only a thought.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, action: Action) {
        match action {
            Action::User(a) => self.user_actions.push(a),
            Action::Agent(a) => self.ai_agent_actions.push(a),
            Action::Tool(a) => self.tools_actions.push(a),
        }
    }
}

/// Where a mention-line recipient resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Agent,
    User,
}

/// Classify a recipient name against the currently registered agent names.
///
/// Membership is exact and case-sensitive; anything not registered as an
/// agent is assumed to be a user.
pub fn classify(name: &str, known_agents: &HashSet<String>) -> Recipient {
    if known_agents.contains(name) {
        Recipient::Agent
    } else {
        Recipient::User
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_is_case_sensitive() {
        let agents: HashSet<String> = ["HomeAssistantAgent".to_string()].into();

        assert_eq!(classify("HomeAssistantAgent", &agents), Recipient::Agent);
        assert_eq!(classify("homeassistantagent", &agents), Recipient::User);
        assert_eq!(classify("Sam", &agents), Recipient::User);
    }

    #[test]
    fn classify_with_no_agents_always_user() {
        let agents = HashSet::new();
        assert_eq!(classify("Anyone", &agents), Recipient::User);
    }
}
