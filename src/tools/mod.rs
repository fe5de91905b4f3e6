//! Local tool commands.
//!
//! Tools are the assistant's hands: `/command arguments` lines in model
//! output resolve against an explicit command table built at startup, so
//! the set of valid commands is enumerable and an unknown command is a
//! reported miss, not a reflection failure.

pub mod builtin;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

/// Error type for tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

/// A command the assistant can invoke with a raw argument string.
///
/// The argument string arrives verbatim from the parser; tools that want
/// word-level arguments use [`split_arguments`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// Command name as it appears after `/` in model output.
    fn name(&self) -> &str;

    /// One-line description for the prompt.
    fn description(&self) -> &str;

    /// Usage example for the prompt, e.g. `/remember "text"`.
    fn usage(&self) -> &str;

    /// Execute the command and return a human-readable result.
    async fn invoke(&self, arguments: &str) -> Result<String, ToolError>;
}

/// Command-to-handler table, built once at startup.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its command name.
    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.write().await.insert(name.clone(), tool);
        tracing::debug!("registered tool: {name}");
    }

    /// Look up a command. Exact match; unknown commands are a runtime
    /// miss reported by the router, not an error here.
    pub async fn get(&self, command: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(command).cloned()
    }

    /// All registered command names, sorted.
    pub async fn commands(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn count(&self) -> usize {
        self.tools.read().await.len()
    }

    /// Markdown roster for the prompt.
    pub async fn render(&self) -> String {
        let tools = self.tools.read().await;
        if tools.is_empty() {
            return "No tools registered.".to_string();
        }

        let mut names: Vec<&String> = tools.keys().collect();
        names.sort();

        let mut out = String::from("## Tools Available\n");
        for name in names {
            let tool = &tools[name];
            out.push_str(&format!(
                "* `{}`: {} Usage: {}\n",
                name,
                tool.description(),
                tool.usage()
            ));
        }
        out.trim_end().to_string()
    }
}

/// Split a raw argument string into words, honoring double quotes.
///
/// `"living room lamp" on 75%` becomes `["living room lamp", "on", "75%"]`.
/// An unterminated quote runs to the end of the string.
pub fn split_arguments(raw: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut seen_any = false;

    for ch in raw.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                seen_any = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if seen_any {
                    args.push(std::mem::take(&mut current));
                    seen_any = false;
                }
            }
            c => {
                current.push(c);
                seen_any = true;
            }
        }
    }
    if seen_any {
        args.push(current);
    }

    args
}
