//! Parser for the assistant's line-oriented output format.
//!
//! The grammar is deliberately forgiving: the `Thought:` marker and the
//! no-self-messaging rule are the only fatal checks. Individual lines that
//! match neither the mention nor the command syntax are skipped with a
//! warning so stray prose from the model degrades gracefully instead of
//! failing the whole response.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use super::{Action, Actions, AgentAction, Recipient, ToolAction, UserAction, classify};

/// `@Recipient message...`; the message may be absent, which is a warning.
static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@(\w+)(?:\s+(.*))?$").unwrap());

/// `/command arguments...`; the arguments may be empty.
static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^/(\w+)\s*(.*)$").unwrap());

const THOUGHT_MARKER: &str = "Thought:";

/// Fatal parse failures. These bubble up to the retry wrapper, which feeds
/// the message back to the model and asks again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("model output is empty")]
    Empty,

    #[error("model output must start with '{THOUGHT_MARKER}'")]
    MissingThought,

    #[error("agent '{agent}' may not send a message to itself")]
    SelfMessage { agent: String },
}

/// Non-fatal anomalies the caller may want to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning {
    /// `@Recipient` with nothing after it.
    EmptyMessage { recipient: String },
    /// A non-blank line matching neither syntax.
    UnrecognizedLine { line: String },
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMessage { recipient } => {
                write!(f, "ignoring empty message for recipient @{recipient}")
            }
            Self::UnrecognizedLine { line } => {
                write!(f, "ignoring line with unrecognized format: {line:?}")
            }
        }
    }
}

/// Result of a successful parse: the action batch plus anything skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed {
    pub actions: Actions,
    pub warnings: Vec<ParseWarning>,
}

/// Parse one raw model response into an [`Actions`] batch.
///
/// `known_agents` must be the current agent-registry snapshot; it decides
/// whether a mention line becomes an [`AgentAction`] or a [`UserAction`].
pub fn parse_output(raw: &str, known_agents: &HashSet<String>) -> Result<Parsed, ParseError> {
    let mut lines = raw.lines().map(str::trim).skip_while(|l| l.is_empty());

    let first = lines.next().ok_or(ParseError::Empty)?;
    let thought = first
        .strip_prefix(THOUGHT_MARKER)
        .ok_or(ParseError::MissingThought)?
        .trim();

    let mut actions = Actions {
        thought: (!thought.is_empty()).then(|| thought.to_string()),
        ..Actions::default()
    };
    let mut warnings = Vec::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        if let Some(action) = parse_line(line, known_agents, &mut warnings)? {
            actions.push(action);
        }
    }

    Ok(Parsed { actions, warnings })
}

fn parse_line(
    line: &str,
    known_agents: &HashSet<String>,
    warnings: &mut Vec<ParseWarning>,
) -> Result<Option<Action>, ParseError> {
    if let Some(caps) = MENTION_RE.captures(line) {
        let recipient = caps[1].to_string();
        let message = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();

        if message.is_empty() {
            warnings.push(ParseWarning::EmptyMessage { recipient });
            return Ok(None);
        }

        return match classify(&recipient, known_agents) {
            Recipient::Agent => {
                // "@Agent @Agent …" would loop the agent's reply straight
                // back into its own inbox.
                if message.starts_with(&format!("@{recipient}")) {
                    return Err(ParseError::SelfMessage { agent: recipient });
                }
                Ok(Some(Action::Agent(AgentAction {
                    message: message.to_string(),
                    recipient,
                })))
            }
            Recipient::User => Ok(Some(Action::User(UserAction {
                message: message.to_string(),
                recipient,
                device: None,
            }))),
        };
    }

    if let Some(caps) = COMMAND_RE.captures(line) {
        return Ok(Some(Action::Tool(ToolAction {
            command: caps[1].to_string(),
            arguments: caps[2].trim().to_string(),
        })));
    }

    warnings.push(ParseWarning::UnrecognizedLine {
        line: line.to_string(),
    });
    Ok(None)
}
