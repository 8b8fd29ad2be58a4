use serde::{Deserialize, Serialize};

use crate::plan::{OutputKind, ProgressEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// What a caller-facing message represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Raw executor text output
    Text,
    /// Executor tool invocation
    ToolUse,
    /// Executor tool result
    ToolResult,
    /// Phase transitions and progress notes
    Status,
    /// Reporter narration about a progress event
    Commentary,
    /// A human-readable failure
    Error,
    /// The task is finished
    Completion,
    /// Aggregate outcome of an iteration
    Result,
}

/// One item of the ordered, real-time stream a caller consumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub content: String,
    pub role: Role,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Message {
    pub fn new(content: impl Into<String>, role: Role, kind: MessageKind) -> Self {
        Self {
            content: content.into(),
            role,
            kind,
            metadata: None,
        }
    }

    pub fn status(content: impl Into<String>) -> Self {
        Self::new(content, Role::System, MessageKind::Status)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(content, Role::System, MessageKind::Error)
    }

    pub fn commentary(content: impl Into<String>) -> Self {
        Self::new(content, Role::Assistant, MessageKind::Commentary)
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Pass-through form of an executor `output` event.
    ///
    /// Returns `None` for lifecycle events, which are narrated instead.
    pub fn from_output(event: &ProgressEvent) -> Option<Self> {
        let ProgressEvent::Output {
            content,
            kind,
            metadata,
        } = event
        else {
            return None;
        };
        let kind = match kind {
            OutputKind::Text => MessageKind::Text,
            OutputKind::ToolUse => MessageKind::ToolUse,
            OutputKind::ToolResult => MessageKind::ToolResult,
            OutputKind::Status => MessageKind::Status,
        };
        Some(Self {
            content: content.clone(),
            role: Role::Assistant,
            kind,
            metadata: metadata.clone(),
        })
    }

    /// Tool name and input, when this message records a tool invocation
    pub fn tool_call(&self) -> Option<(&str, Option<&serde_json::Value>)> {
        if self.kind != MessageKind::ToolUse {
            return None;
        }
        let metadata = self.metadata.as_ref()?;
        let name = metadata.get("name")?.as_str()?;
        Some((name, metadata.get("input")))
    }
}
