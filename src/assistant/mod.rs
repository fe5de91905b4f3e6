//! The assistant core: dispatch loop, action routing, prompt assembly.
//!
//! One inbound message flows through one loop iteration: transcript append,
//! context rebuild, bounded-retry generation, then routing. Agent replies
//! and tool results re-enter through the same queue, which is the single
//! reentry point into the loop.

mod context;
mod dispatcher;
mod generate;
mod router;
mod transcript;

pub use context::ContextBuilder;
pub use dispatcher::Dispatcher;
pub use generate::ActionGenerator;
pub use router::ActionRouter;
pub use transcript::Transcript;

use tokio::sync::mpsc;

/// Sender name used for operational messages the assistant should see.
pub const SYSTEM_SENDER: &str = "SYSTEM";

/// A message entering the dispatch queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub message: String,
    pub from_user: String,
    /// Usually the assistant; agents reply to their caller.
    pub to_user: Option<String>,
    /// Where the message originated, e.g. the device location.
    pub location: Option<String>,
}

impl InboundMessage {
    /// A message from a human user to the assistant.
    pub fn from_user(
        from: impl Into<String>,
        to: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            from_user: from.into(),
            to_user: Some(to.into()),
            location: None,
        }
    }

    /// An operational message directed at the assistant.
    pub fn system(to: impl Into<String>, message: impl Into<String>) -> Self {
        Self::from_user(SYSTEM_SENDER, to, message)
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Producer half of the dispatch queue.
pub type InboundSender = mpsc::UnboundedSender<InboundMessage>;

/// Consumer half of the dispatch queue; the dispatcher is the only reader.
pub type InboundReceiver = mpsc::UnboundedReceiver<InboundMessage>;

/// Create the dispatch queue.
///
/// Unbounded on purpose: the router re-enqueues from inside a loop
/// iteration, and a bounded queue could deadlock the single consumer
/// against itself.
pub fn inbound_queue() -> (InboundSender, InboundReceiver) {
    mpsc::unbounded_channel()
}
