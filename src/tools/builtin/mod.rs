//! Built-in tools that ship with the assistant.

mod memory;
mod tasks;

pub use memory::{ForgetTool, RememberTool, ShortTermMemory};
pub use tasks::{AddTaskTool, CompleteTaskTool};
