use serde_json::json;

use crate::plan::SubtaskResult;
use crate::stream::{Message, MessageKind, Role};

/// Outcome of one iteration's EXECUTING phase
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub completed_steps: usize,
    pub total_steps: usize,
    /// Every collected summary in sequence order, failed steps included
    pub summary: String,
    pub files: Vec<String>,
}

impl Aggregate {
    pub fn from_results(results: &[SubtaskResult], total_steps: usize) -> Self {
        let completed_steps = results.iter().filter(|r| r.success).count();

        let summary = results
            .iter()
            .map(|r| r.summary.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");

        let files = results
            .iter()
            .flat_map(|r| r.files.iter().map(move |f| format!("subtask-{}/{}", r.sequence, f)))
            .collect();

        Self {
            completed_steps,
            total_steps,
            summary,
            files,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.completed_steps == self.total_steps
    }

    pub fn headline(&self) -> String {
        format!("Completed {}/{} steps", self.completed_steps, self.total_steps)
    }

    /// The single final message of a DONE-INCOMPLETE iteration
    pub fn into_message(self) -> Message {
        let content = if self.summary.is_empty() {
            self.headline()
        } else {
            format!("{}\n\n{}", self.headline(), self.summary)
        };

        Message::new(content, Role::Assistant, MessageKind::Result).with_metadata(json!({
            "completedSteps": self.completed_steps,
            "totalSteps": self.total_steps,
            "files": self.files,
        }))
    }
}
