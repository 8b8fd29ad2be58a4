//! Multi-iteration driver
//!
//! Repeats [`IterationEngine::run`] for one task until the oracle reports
//! completion, an iteration fails fatally, or the iteration limit is hit.
//! Each iteration's messages become the next iteration's oracle artifacts.

use futures::StreamExt;
use serde_json::json;

use crate::oracle::{IterationArtifacts, Verdict};
use crate::stream::{Message, MessageKind, Role};

use super::{completion_message, is_fatal, EngineStream, IterationEngine};

/// How one iteration ended, as observed on its stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    Complete,
    /// Ran to AGGREGATING; another iteration may follow
    Incomplete,
    /// Planning, validation or workspace failure
    Failed,
}

impl IterationOutcome {
    /// Terminal state signalled by `message`, if any
    pub fn from_message(message: &Message) -> Option<Self> {
        match message.kind {
            MessageKind::Completion => Some(IterationOutcome::Complete),
            MessageKind::Result => Some(IterationOutcome::Incomplete),
            MessageKind::Error if is_fatal(message) => Some(IterationOutcome::Failed),
            _ => None,
        }
    }
}

pub struct TaskLoop {
    engine: IterationEngine,
    max_iterations: u32,
}

impl TaskLoop {
    pub fn new(engine: IterationEngine) -> Self {
        let max_iterations = engine.config().max_iterations;
        Self {
            engine,
            max_iterations,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Fresh identifier for a new task
    pub fn new_task_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Start a task under a generated id
    pub fn start(&self, request: impl Into<String>) -> (String, EngineStream) {
        let task_id = Self::new_task_id();
        let stream = self.run(task_id.clone(), request);
        (task_id, stream)
    }

    /// Drive `task_id` to completion, forwarding every message
    pub fn run(&self, task_id: impl Into<String>, request: impl Into<String>) -> EngineStream {
        let engine = self.engine.clone();
        let max_iterations = self.max_iterations;
        let task_id = task_id.into();
        let request = request.into();

        let stream = async_stream::stream! {
            let task_dir = engine.config().task_dir(&task_id);
            let mut previous: Vec<Message> = Vec::new();

            for iteration in 1..=max_iterations {
                let artifacts = IterationArtifacts::new(iteration, request.clone(), task_dir.clone())
                    .with_messages(std::mem::take(&mut previous));
                let mut messages = engine.run(task_id.clone(), artifacts);
                let mut outcome = None;

                while let Some(item) = messages.next().await {
                    match item {
                        Ok(message) => {
                            if let Some(observed) = IterationOutcome::from_message(&message) {
                                outcome = Some(observed);
                            }
                            previous.push(message.clone());
                            yield Ok(message);
                        }
                        Err(e) => {
                            if e.is_abort() {
                                tracing::info!(task_id = %task_id, iteration, "Task aborted");
                            }
                            yield Err(e);
                            return;
                        }
                    }
                }

                match outcome {
                    Some(IterationOutcome::Incomplete) => {
                        tracing::debug!(task_id = %task_id, iteration, "Iteration finished incomplete");
                    }
                    Some(IterationOutcome::Complete) => return,
                    Some(IterationOutcome::Failed) | None => {
                        tracing::warn!(task_id = %task_id, iteration, "Iteration failed; stopping task");
                        return;
                    }
                }
            }

            // The last iteration may have produced the final result.
            let artifacts = IterationArtifacts::new(max_iterations + 1, request.clone(), task_dir.clone())
                .with_messages(previous);
            if let Verdict::Completed(completion) = engine.evaluate(&task_id, &artifacts).await {
                yield Ok(completion_message(&completion));
                return;
            }

            tracing::warn!(task_id = %task_id, max_iterations, "Iteration limit reached");
            yield Ok(Message::new(
                format!("Iteration limit reached ({}) before the task was complete.", max_iterations),
                Role::System,
                MessageKind::Error,
            )
            .with_metadata(json!({
                "limitReached": true,
                "iterations": max_iterations,
            })));
        };

        stream.boxed()
    }
}
