//! Short-term memory tools.
//!
//! A small indexed scratchpad the model manages itself: `/remember` to add
//! a note, `/forget <index>` to drop one. The whole pad is rendered into
//! every prompt, which is why it is capped.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::super::{Tool, ToolError, split_arguments};

const MAX_MEMORIES: usize = 30;

/// The shared scratchpad behind the remember/forget tools.
#[derive(Default)]
pub struct ShortTermMemory {
    memories: Mutex<Vec<String>>,
}

impl ShortTermMemory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn remember(&self, memory: String) -> Result<String, ToolError> {
        let mut memories = self.memories.lock().await;
        if memories.len() >= MAX_MEMORIES {
            return Err(ToolError::ExecutionFailed(format!(
                "memory limit of {MAX_MEMORIES} reached, forget something first"
            )));
        }
        memories.push(memory);
        Ok("Memory remembered".to_string())
    }

    async fn forget(&self, index: usize) -> Result<String, ToolError> {
        let mut memories = self.memories.lock().await;
        if index >= memories.len() {
            return Err(ToolError::InvalidArguments(format!(
                "no memory at index {index}"
            )));
        }
        memories.remove(index);
        Ok("Memory forgotten".to_string())
    }

    /// Indexed listing for the prompt; `None` when the pad is empty.
    pub async fn render(&self) -> Option<String> {
        let memories = self.memories.lock().await;
        if memories.is_empty() {
            return None;
        }

        let lines: Vec<String> = memories
            .iter()
            .enumerate()
            .map(|(i, m)| format!("{i}: {m}"))
            .collect();
        Some(format!("Current Memory:\n{}", lines.join("\n")))
    }
}

/// `/remember "text"`
pub struct RememberTool {
    memory: Arc<ShortTermMemory>,
}

impl RememberTool {
    pub fn new(memory: Arc<ShortTermMemory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for RememberTool {
    fn name(&self) -> &str {
        "remember"
    }

    fn description(&self) -> &str {
        "Stores a short note in working memory, visible in every prompt."
    }

    fn usage(&self) -> &str {
        "/remember \"User meeting is at 3 PM\""
    }

    async fn invoke(&self, arguments: &str) -> Result<String, ToolError> {
        let memory = split_arguments(arguments).join(" ");
        if memory.is_empty() {
            return Err(ToolError::InvalidArguments(
                "nothing to remember".to_string(),
            ));
        }
        self.memory.remember(memory).await
    }
}

/// `/forget <index>`
pub struct ForgetTool {
    memory: Arc<ShortTermMemory>,
}

impl ForgetTool {
    pub fn new(memory: Arc<ShortTermMemory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for ForgetTool {
    fn name(&self) -> &str {
        "forget"
    }

    fn description(&self) -> &str {
        "Removes a note from working memory by its index."
    }

    fn usage(&self) -> &str {
        "/forget 2"
    }

    async fn invoke(&self, arguments: &str) -> Result<String, ToolError> {
        let index: usize = arguments
            .trim()
            .parse()
            .map_err(|_| ToolError::InvalidArguments(format!("not an index: {arguments:?}")))?;
        self.memory.forget(index).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remember_then_forget() {
        let memory = ShortTermMemory::new();
        let remember = RememberTool::new(memory.clone());
        let forget = ForgetTool::new(memory.clone());

        remember.invoke("\"meeting at 3\"").await.unwrap();
        remember.invoke("buy milk").await.unwrap();

        let rendered = memory.render().await.unwrap();
        assert!(rendered.contains("0: meeting at 3"));
        assert!(rendered.contains("1: buy milk"));

        forget.invoke("0").await.unwrap();
        let rendered = memory.render().await.unwrap();
        assert!(rendered.contains("0: buy milk"));
    }

    #[tokio::test]
    async fn forget_out_of_range_is_invalid() {
        let memory = ShortTermMemory::new();
        let forget = ForgetTool::new(memory);

        let err = forget.invoke("5").await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn memory_cap_is_enforced() {
        let memory = ShortTermMemory::new();
        let remember = RememberTool::new(memory.clone());

        for i in 0..30 {
            remember.invoke(&format!("note {i}")).await.unwrap();
        }
        let err = remember.invoke("one too many").await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed(_)));
    }

    #[tokio::test]
    async fn empty_pad_renders_nothing() {
        let memory = ShortTermMemory::new();
        assert!(memory.render().await.is_none());
    }
}
