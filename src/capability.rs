//! External Capabilities
//!
//! The collaborators the engine consumes: a planner that produces plans, an
//! executor that runs one subtask, and a reporter that narrates progress.
//! Their content generation lives outside this crate.

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::plan::{ProgressEvent, Subtask, SubtaskResult, TaskPlan};
use crate::stream::Message;

/// Progress events produced by an executor
pub type ProgressStream = BoxStream<'static, Result<ProgressEvent>>;

/// Narration produced by a reporter
pub type MessageStream = BoxStream<'static, Result<Message>>;

/// Turns an execution instruction into a subtask plan
#[async_trait]
pub trait Planner: Send + Sync {
    /// Produce a plan; an error is fatal for the current iteration
    async fn plan_task(&self, instruction: &str) -> Result<TaskPlan>;
}

/// Everything an executor is given for one subtask
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub subtask: Subtask,
    pub total_steps: usize,
    /// Results of all earlier subtasks in this iteration, in order
    pub prior_results: Arc<[SubtaskResult]>,
    /// Human-readable digest of `prior_results`
    pub context: String,
    /// Directory the subtask owns exclusively for its lifetime
    pub workspace_dir: PathBuf,
    /// Iteration directory that `subtask-N/...` sources resolve against
    pub iteration_dir: PathBuf,
}

impl ExecutionRequest {
    /// Task directory, where the final-result artifact belongs
    pub fn task_dir(&self) -> &Path {
        self.iteration_dir.parent().unwrap_or(self.iteration_dir.as_path())
    }
}

/// Runs one subtask to completion
///
/// The executor writes its artifacts into `workspace_dir` and streams
/// progress. An `Err` item, or an `error` event, fails the subtask.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Get the executor's name (for logging)
    fn name(&self) -> &str;

    async fn execute_subtask(&self, request: ExecutionRequest) -> Result<ProgressStream>;
}

/// Generates human-readable commentary
///
/// Failures inside the returned stream degrade to a single inline error
/// message and never abort execution.
pub trait Reporter: Send + Sync {
    fn narrate(&self, prompt: String) -> MessageStream;
}

/// Prompt handed to the reporter for a lifecycle event; `None` for output
pub fn narration_prompt(event: &ProgressEvent) -> Option<String> {
    match event {
        ProgressEvent::Output { .. } => None,
        ProgressEvent::Start {
            sequence,
            total_steps,
            title,
            description,
        } => Some(format!(
            "Step {}/{} is starting: {}\n\n{}\n\nBriefly tell the user what is about to happen.",
            sequence, total_steps, title, description
        )),
        ProgressEvent::Complete {
            sequence,
            title,
            files,
            ..
        } => {
            let files = if files.is_empty() {
                "no files".to_string()
            } else {
                files.join(", ")
            };
            Some(format!(
                "Step {} ({}) finished and produced: {}.\n\nBriefly summarize the progress for the user.",
                sequence, title, files
            ))
        }
        ProgressEvent::Error {
            sequence,
            title,
            error,
        } => Some(format!(
            "Step {} ({}) failed: {}\n\nExplain the failure to the user in one or two sentences.",
            sequence, title, error
        )),
    }
}

/// Adapts a reporter into the per-event factory the merger consumes
pub fn commentary_factory(
    reporter: Arc<dyn Reporter>,
) -> impl Fn(&ProgressEvent) -> Option<MessageStream> + Send + 'static {
    move |event| narration_prompt(event).map(|prompt| reporter.narrate(prompt))
}
