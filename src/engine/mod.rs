//! Iteration Engine
//!
//! Drives one task iteration through its phases:
//! 1. EVALUATING: ask the completion oracle whether the task is done
//! 2. PLANNING: turn the oracle's feedback into an instruction, plan, validate
//! 3. EXECUTING: run every subtask in sequence through the runner and merger
//! 4. AGGREGATING: emit one result message covering all collected summaries
//!
//! Every message is forwarded to the caller as soon as it is produced. Entering
//! PLANNING, EXECUTING and AGGREGATING is announced with a status message
//! carrying `{"phase": ...}` metadata.

pub mod aggregate;
pub mod task_loop;

use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::json;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::capability::{commentary_factory, Executor, Planner, Reporter};
use crate::config::EngineConfig;
use crate::error::{EngineError, ValidationError};
use crate::oracle::{build_oracle, Completion, CompletionOracle, IterationArtifacts, Verdict};
use crate::plan::{EvaluationResult, PlanValidator, ProgressEvent, SubtaskResult, TaskPlan};
use crate::runner::{SubtaskOutcome, SubtaskRunner};
use crate::stream::{merge, MergedItem, Message, MessageKind, Role};

pub use aggregate::Aggregate;
pub use task_loop::{IterationOutcome, TaskLoop};

/// Caller-facing stream of one iteration
pub type EngineStream = BoxStream<'static, Result<Message, EngineError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationPhase {
    Evaluating,
    Planning,
    Executing,
    Aggregating,
    /// Terminal: the oracle reported completion
    Complete,
    /// Terminal: the iteration ran but the task is not yet done
    DoneIncomplete,
}

impl IterationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            IterationPhase::Evaluating => "evaluating",
            IterationPhase::Planning => "planning",
            IterationPhase::Executing => "executing",
            IterationPhase::Aggregating => "aggregating",
            IterationPhase::Complete => "complete",
            IterationPhase::DoneIncomplete => "done_incomplete",
        }
    }
}

impl fmt::Display for IterationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn enter(task_id: &str, iteration: u32, phase: IterationPhase) {
    tracing::info!(task_id, iteration, phase = %phase, "Iteration phase");
}

/// Status message announcing a phase transition
pub fn phase_message(iteration: u32, phase: IterationPhase) -> Message {
    let content = match phase {
        IterationPhase::Evaluating => "Checking whether the task is complete",
        IterationPhase::Planning => "Planning next steps",
        IterationPhase::Executing => "Executing plan",
        IterationPhase::Aggregating => "Aggregating results",
        IterationPhase::Complete => "Task complete",
        IterationPhase::DoneIncomplete => "Iteration finished",
    };
    Message::status(content).with_metadata(json!({
        "phase": phase.as_str(),
        "iteration": iteration,
    }))
}

/// Phase announced by `message`, if it is a phase transition notice
pub fn phase_of(message: &Message) -> Option<&str> {
    if message.kind != MessageKind::Status {
        return None;
    }
    message.metadata.as_ref()?.get("phase")?.as_str()
}

/// Instruction handed to the planner for a not-yet-complete task
pub fn planning_instruction(evaluation: &EvaluationResult) -> String {
    if evaluation.missing_items.is_empty() {
        return evaluation.reason.clone();
    }

    let mut instruction = String::from("The following items are still missing:\n");
    for item in &evaluation.missing_items {
        instruction.push_str(&format!("- {}\n", item));
    }
    instruction
}

/// The one message emitted when the oracle reports completion
pub fn completion_message(completion: &Completion) -> Message {
    let content = completion
        .message
        .clone()
        .unwrap_or_else(|| "Task complete.".to_string());
    Message::new(content, Role::Assistant, MessageKind::Completion).with_metadata(json!({
        "strategy": completion.strategy,
        "files": completion.files,
    }))
}

/// The one message emitted before a fatal iteration failure closes the stream
pub fn fatal_message(error: &EngineError, phase: IterationPhase) -> Message {
    Message::error(error.to_string()).with_metadata(json!({
        "fatal": true,
        "phase": phase.as_str(),
    }))
}

/// Whether `message` reports a fatal iteration failure
pub fn is_fatal(message: &Message) -> bool {
    message.kind == MessageKind::Error
        && message
            .metadata
            .as_ref()
            .and_then(|m| m.get("fatal"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
}

/// Runs task iterations against the external capabilities
#[derive(Clone)]
pub struct IterationEngine {
    planner: Arc<dyn Planner>,
    executor: Arc<dyn Executor>,
    reporter: Option<Arc<dyn Reporter>>,
    oracle: Arc<dyn CompletionOracle>,
    config: Arc<EngineConfig>,
    abort: CancellationToken,
}

impl IterationEngine {
    pub fn builder(
        planner: Arc<dyn Planner>,
        executor: Arc<dyn Executor>,
        config: EngineConfig,
    ) -> IterationEngineBuilder {
        IterationEngineBuilder::new(planner, executor, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The operator abort signal shared with every subtask run
    pub fn abort_handle(&self) -> CancellationToken {
        self.abort.clone()
    }

    pub fn iteration_dir(&self, task_id: &str, iteration: u32) -> PathBuf {
        self.config
            .task_dir(task_id)
            .join(format!("iteration-{}", iteration))
    }

    /// Run one iteration of `task_id`.
    ///
    /// The stream ends after the completion message, the aggregate result, or
    /// the single message describing a fatal failure. An abort ends it with
    /// `Err(EngineError::Aborted)` and no further messages.
    pub fn run(&self, task_id: impl Into<String>, artifacts: IterationArtifacts) -> EngineStream {
        let engine = self.clone();
        let task_id = task_id.into();

        let stream = async_stream::stream! {
            let iteration = artifacts.iteration;

            enter(&task_id, iteration, IterationPhase::Evaluating);
            let evaluation = match engine.evaluate(&task_id, &artifacts).await {
                Verdict::Completed(completion) => {
                    enter(&task_id, iteration, IterationPhase::Complete);
                    yield Ok(completion_message(&completion));
                    return;
                }
                Verdict::Incomplete(evaluation) => evaluation,
            };

            enter(&task_id, iteration, IterationPhase::Planning);
            yield Ok(phase_message(iteration, IterationPhase::Planning));
            let plan = match engine.plan(&planning_instruction(&evaluation)).await {
                Ok(plan) => plan,
                Err(e) => {
                    tracing::warn!(task_id = %task_id, iteration, "Planning failed: {}", e);
                    yield Ok(fatal_message(&e, IterationPhase::Planning));
                    return;
                }
            };

            let iteration_dir = engine.iteration_dir(&task_id, iteration);
            if let Err(source) = tokio::fs::create_dir_all(&iteration_dir).await {
                let e = EngineError::Workspace { path: iteration_dir.clone(), source };
                tracing::warn!(task_id = %task_id, iteration, "{}", e);
                yield Ok(fatal_message(&e, IterationPhase::Planning));
                return;
            }

            yield Ok(Message::status(format!("Plan: {} ({} steps)", plan.title, plan.total_steps))
                .with_metadata(json!({
                    "planTaskId": plan.task_id,
                    "totalSteps": plan.total_steps,
                    "steps": plan.subtasks.iter().map(|s| s.title.as_str()).collect::<Vec<_>>(),
                })));

            enter(&task_id, iteration, IterationPhase::Executing);
            yield Ok(phase_message(iteration, IterationPhase::Executing));
            let runner = SubtaskRunner::new(engine.executor.clone(), &engine.config)
                .with_abort(engine.abort.clone());
            let total_steps = plan.total_steps;
            let mut results: Vec<SubtaskResult> = Vec::with_capacity(total_steps);

            for subtask in plan.subtasks.iter().cloned() {
                let sequence = subtask.sequence;
                let title = subtask.title.clone();
                let events = runner.run(subtask, total_steps, Arc::from(results.clone()), iteration_dir.clone());
                let mut merged = match &engine.reporter {
                    Some(reporter) => merge(events, commentary_factory(reporter.clone())),
                    None => merge(events, |_: &ProgressEvent| None),
                };

                let mut outcome = None;
                while let Some(item) = merged.next().await {
                    match item {
                        MergedItem::Message(message) => yield Ok(message),
                        MergedItem::Finished(done) => outcome = Some(done),
                    }
                }

                let result = match outcome {
                    Some(SubtaskOutcome::Aborted(e)) => {
                        tracing::info!(task_id = %task_id, iteration, sequence, "Iteration aborted");
                        yield Err(EngineError::Aborted(e));
                        return;
                    }
                    Some(SubtaskOutcome::Completed(result)) => result,
                    None => SubtaskResult {
                        sequence,
                        success: false,
                        summary: String::new(),
                        files: Vec::new(),
                        summary_file: String::new(),
                        error: Some("execution ended without an outcome".to_string()),
                        completed_at: chrono::Utc::now(),
                    },
                };

                let success = result.success;
                yield Ok(step_message(&result, &title, total_steps));
                results.push(result);
                if !success {
                    tracing::info!(task_id = %task_id, iteration, sequence, "Stopping after failed subtask");
                    break;
                }
            }

            enter(&task_id, iteration, IterationPhase::Aggregating);
            yield Ok(phase_message(iteration, IterationPhase::Aggregating));
            let aggregate = Aggregate::from_results(&results, total_steps);
            tracing::info!(
                task_id = %task_id,
                iteration,
                completed = aggregate.completed_steps,
                total = aggregate.total_steps,
                "Iteration aggregated"
            );
            yield Ok(aggregate.into_message());
            enter(&task_id, iteration, IterationPhase::DoneIncomplete);
        };

        stream.boxed()
    }

    /// Consult the oracle; a failed detection counts as "not complete" with
    /// the oracle's error as the reason
    pub async fn evaluate(&self, task_id: &str, artifacts: &IterationArtifacts) -> Verdict {
        match self.oracle.detect(task_id, artifacts).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(task_id, iteration = artifacts.iteration, "Completion oracle failed: {}", e);
                Verdict::Incomplete(EvaluationResult::incomplete(e.to_string()))
            }
        }
    }

    async fn plan(&self, instruction: &str) -> Result<TaskPlan, EngineError> {
        let plan = self
            .planner
            .plan_task(instruction)
            .await
            .map_err(|e| EngineError::Planning(format!("{:#}", e)))?;

        PlanValidator::validate(&plan).map_err(|e: ValidationError| {
            tracing::warn!(index = ?e.subtask_index(), "Plan rejected: {}", e);
            EngineError::Validation(e)
        })?;

        Ok(plan)
    }
}

/// Per-subtask outcome notice
fn step_message(result: &SubtaskResult, title: &str, total_steps: usize) -> Message {
    let metadata = json!({
        "sequence": result.sequence,
        "success": result.success,
        "files": result.files,
    });

    if result.success {
        Message::status(format!("Step {}/{} complete: {}", result.sequence, total_steps, title))
            .with_metadata(metadata)
    } else {
        Message::error(format!(
            "Step {}/{} failed: {}",
            result.sequence,
            total_steps,
            result.error.as_deref().unwrap_or("unknown error")
        ))
        .with_metadata(metadata)
    }
}

/// Builder for [`IterationEngine`]
pub struct IterationEngineBuilder {
    planner: Arc<dyn Planner>,
    executor: Arc<dyn Executor>,
    reporter: Option<Arc<dyn Reporter>>,
    oracle: Option<Arc<dyn CompletionOracle>>,
    config: EngineConfig,
    abort: Option<CancellationToken>,
}

impl IterationEngineBuilder {
    pub fn new(planner: Arc<dyn Planner>, executor: Arc<dyn Executor>, config: EngineConfig) -> Self {
        Self {
            planner,
            executor,
            reporter: None,
            oracle: None,
            config,
            abort: None,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Override the oracle selected by `config.oracle.mode`
    pub fn with_oracle(mut self, oracle: Arc<dyn CompletionOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn with_abort(mut self, abort: CancellationToken) -> Self {
        self.abort = Some(abort);
        self
    }

    pub fn build(self) -> IterationEngine {
        let oracle = self
            .oracle
            .unwrap_or_else(|| build_oracle(&self.config.oracle));

        IterationEngine {
            planner: self.planner,
            executor: self.executor,
            reporter: self.reporter,
            oracle,
            config: Arc::new(self.config),
            abort: self.abort.unwrap_or_else(CancellationToken::new),
        }
    }
}
