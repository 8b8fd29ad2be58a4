//! Tool-call completion signal
//!
//! Scans the previous iteration's messages for a call to a recognized
//! "done" tool. Gateway-qualified names such as `mcp__agent__task_done`
//! match by suffix.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::OracleError;
use crate::plan::EvaluationResult;
use crate::stream::Message;

use super::{Completion, CompletionOracle, IterationArtifacts, Verdict};

/// Separators that may precede a recognized name in a qualified tool name
const QUALIFIER_SEPARATORS: &[char] = &['_', '.', '/', ':', '-'];

/// The closed set of done-signal tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    TaskDone,
    CompleteTask,
}

impl SignalKind {
    pub const ALL: [SignalKind; 2] = [SignalKind::TaskDone, SignalKind::CompleteTask];

    pub fn tool_name(&self) -> &'static str {
        match self {
            SignalKind::TaskDone => "task_done",
            SignalKind::CompleteTask => "complete_task",
        }
    }

    /// Match a tool name exactly, or as the suffix of a qualified name
    pub fn matches(&self, name: &str) -> bool {
        let tool = self.tool_name();
        if name == tool {
            return true;
        }
        name.strip_suffix(tool)
            .and_then(|prefix| prefix.chars().last())
            .is_some_and(|c| QUALIFIER_SEPARATORS.contains(&c))
    }
}

/// Completion detected from a done-signal tool call
pub struct ToolSignalOracle {
    signals: Vec<SignalKind>,
}

impl ToolSignalOracle {
    pub fn new(signals: Vec<SignalKind>) -> Self {
        Self { signals }
    }

    /// Identify which signal, if any, a tool name denotes
    pub fn classify(&self, name: &str) -> Option<SignalKind> {
        self.signals.iter().copied().find(|s| s.matches(name))
    }

    /// First done signal in `messages`, with its payload
    pub fn scan(&self, messages: &[Message]) -> Option<Completion> {
        messages.iter().find_map(|message| {
            let (name, input) = message.tool_call()?;
            let kind = self.classify(name)?;

            let final_message = input
                .and_then(|i| i.get("message").or_else(|| i.get("summary")))
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let files = input
                .and_then(|i| i.get("files"))
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();

            tracing::debug!(tool = name, signal = ?kind, "Done signal found");
            Some(Completion {
                strategy: "tool_signal".to_string(),
                message: final_message,
                files,
            })
        })
    }
}

impl Default for ToolSignalOracle {
    fn default() -> Self {
        Self::new(SignalKind::ALL.to_vec())
    }
}

#[async_trait]
impl CompletionOracle for ToolSignalOracle {
    fn name(&self) -> &str {
        "tool_signal"
    }

    async fn detect(
        &self,
        _task_id: &str,
        artifacts: &IterationArtifacts,
    ) -> Result<Verdict, OracleError> {
        Ok(match self.scan(&artifacts.messages) {
            Some(completion) => Verdict::Completed(completion),
            None => Verdict::Incomplete(EvaluationResult {
                is_complete: false,
                reason: artifacts.original_request.clone(),
                missing_items: Vec::new(),
                confidence: 1.0,
            }),
        })
    }
}
