//! Plan Types
//!
//! The subtask plan produced by a planner and the records produced while
//! executing it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::ValidationError;

/// Upper bound on the number of subtasks in a single plan
pub const MAX_SUBTASKS: usize = 10;

/// Planner's estimate of how much work a subtask is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    #[default]
    Simple,
    Medium,
    Complex,
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Complexity::Simple => write!(f, "simple"),
            Complexity::Medium => write!(f, "medium"),
            Complexity::Complex => write!(f, "complex"),
        }
    }
}

/// A section a subtask's markdown output must contain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkdownSectionRequirement {
    /// Section identifier, unique within one subtask's outputs
    #[serde(default)]
    pub id: String,
    /// Heading for the section
    #[serde(default)]
    pub title: String,
    /// What the section must contain
    #[serde(default)]
    pub content: String,
    /// Whether the section is mandatory. Absent fails validation; a
    /// non-boolean value fails to parse.
    #[serde(default)]
    pub required: Option<bool>,
}

impl MarkdownSectionRequirement {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            required: Some(true),
        }
    }

    /// Mark the section optional
    pub fn optional(mut self) -> Self {
        self.required = Some(false);
        self
    }
}

/// What a subtask consumes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtaskInputs {
    /// Prose description of the inputs
    #[serde(default)]
    pub description: String,
    /// Input sources; `subtask-<N>/<file>[#<section>]` refers to an earlier step's output
    #[serde(default)]
    pub sources: Vec<String>,
    /// Free-form extra context for the executor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<HashMap<String, serde_json::Value>>,
}

/// What a subtask must produce
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtaskOutputs {
    /// Prose description of the outputs
    #[serde(default)]
    pub description: String,
    /// Files the subtask is expected to write
    #[serde(default)]
    pub files: Vec<String>,
    /// Summary file written for downstream steps
    #[serde(default)]
    pub summary_file: String,
    /// Sections the markdown outputs must contain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown_requirements: Option<Vec<MarkdownSectionRequirement>>,
}

impl SubtaskOutputs {
    /// Look up a markdown requirement by section id
    pub fn requirement(&self, id: &str) -> Option<&MarkdownSectionRequirement> {
        self.markdown_requirements
            .as_deref()
            .and_then(|reqs| reqs.iter().find(|r| r.id == id))
    }
}

/// One unit of work in a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    /// 1-based position in the execution order
    pub sequence: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: Option<SubtaskInputs>,
    #[serde(default)]
    pub outputs: Option<SubtaskOutputs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<Complexity>,
}

impl Subtask {
    /// Create a subtask with empty inputs and a summary file at `summary.md`
    pub fn new(sequence: u32, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            sequence,
            title: title.into(),
            description: description.into(),
            inputs: Some(SubtaskInputs::default()),
            outputs: Some(SubtaskOutputs {
                summary_file: "summary.md".to_string(),
                ..Default::default()
            }),
            complexity: None,
        }
    }

    /// Add an input source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.inputs
            .get_or_insert_with(SubtaskInputs::default)
            .sources
            .push(source.into());
        self
    }

    /// Declare an expected output file
    pub fn with_output_file(mut self, file: impl Into<String>) -> Self {
        self.outputs
            .get_or_insert_with(SubtaskOutputs::default)
            .files
            .push(file.into());
        self
    }

    /// Set the summary file name
    pub fn with_summary_file(mut self, file: impl Into<String>) -> Self {
        self.outputs
            .get_or_insert_with(SubtaskOutputs::default)
            .summary_file = file.into();
        self
    }

    /// Add a markdown section requirement
    pub fn with_requirement(mut self, requirement: MarkdownSectionRequirement) -> Self {
        self.outputs
            .get_or_insert_with(SubtaskOutputs::default)
            .markdown_requirements
            .get_or_insert_with(Vec::new)
            .push(requirement);
        self
    }

    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = Some(complexity);
        self
    }

    /// Declared input sources (empty when inputs are absent)
    pub fn sources(&self) -> &[String] {
        self.inputs.as_ref().map(|i| i.sources.as_slice()).unwrap_or(&[])
    }

    /// Declared summary file, if any
    pub fn summary_file(&self) -> Option<&str> {
        self.outputs
            .as_ref()
            .map(|o| o.summary_file.as_str())
            .filter(|f| !f.trim().is_empty())
    }

    /// Directory name for this subtask inside an iteration workspace
    pub fn dir_name(&self) -> String {
        format!("subtask-{}", self.sequence)
    }
}

/// An ordered decomposition of one task iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPlan {
    pub task_id: String,
    /// The user request the plan was derived from
    #[serde(default)]
    pub original_request: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    /// Declared step count; must equal `subtasks.len()`
    pub total_steps: usize,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl TaskPlan {
    pub fn new(task_id: impl Into<String>, original_request: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            original_request: original_request.into(),
            title: String::new(),
            description: String::new(),
            subtasks: Vec::new(),
            total_steps: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Append a subtask, keeping `total_steps` in step
    pub fn add_subtask(mut self, subtask: Subtask) -> Self {
        self.subtasks.push(subtask);
        self.total_steps = self.subtasks.len();
        self
    }

    /// Parse a plan from JSON; malformed input is a validation failure
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json).map_err(|e| ValidationError::Malformed(e.to_string()))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Subtask with the given 1-based sequence number
    pub fn subtask(&self, sequence: u32) -> Option<&Subtask> {
        let index = (sequence as usize).checked_sub(1)?;
        self.subtasks.get(index)
    }
}

/// Outcome of one subtask, passed forward as context to later steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtaskResult {
    pub sequence: u32,
    pub success: bool,
    /// Summary text (the summary file's content)
    pub summary: String,
    /// Files under the subtask directory, relative, `/`-separated
    pub files: Vec<String>,
    pub summary_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Category of an `output` progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    #[default]
    Text,
    ToolUse,
    ToolResult,
    Status,
}

/// Transient notification emitted while a subtask runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    #[serde(rename_all = "camelCase")]
    Start {
        sequence: u32,
        total_steps: usize,
        title: String,
        description: String,
    },
    Output {
        content: String,
        kind: OutputKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<serde_json::Value>,
    },
    #[serde(rename_all = "camelCase")]
    Complete {
        sequence: u32,
        title: String,
        files: Vec<String>,
        summary_file: String,
    },
    Error {
        sequence: u32,
        title: String,
        error: String,
    },
}

impl ProgressEvent {
    /// Plain text output
    pub fn text(content: impl Into<String>) -> Self {
        ProgressEvent::Output {
            content: content.into(),
            kind: OutputKind::Text,
            metadata: None,
        }
    }

    /// Tool invocation, with the tool name and input recorded in metadata
    pub fn tool_use(name: impl Into<String>, input: serde_json::Value) -> Self {
        let name = name.into();
        ProgressEvent::Output {
            content: format!("Using tool: {}", name),
            kind: OutputKind::ToolUse,
            metadata: Some(serde_json::json!({ "name": name, "input": input })),
        }
    }

    pub fn is_output(&self) -> bool {
        matches!(self, ProgressEvent::Output { .. })
    }
}

/// Verdict produced by an evaluator for one iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub is_complete: bool,
    pub reason: String,
    #[serde(default)]
    pub missing_items: Vec<String>,
    #[serde(default)]
    pub confidence: f32,
}

impl EvaluationResult {
    /// A "not complete" verdict carrying only free-text guidance
    pub fn incomplete(reason: impl Into<String>) -> Self {
        Self {
            is_complete: false,
            reason: reason.into(),
            missing_items: Vec::new(),
            confidence: 0.0,
        }
    }

    pub fn with_missing(mut self, items: Vec<String>) -> Self {
        self.missing_items = items;
        self
    }
}
