//! Subtask Runner
//!
//! Runs one subtask through the external executor inside its own workspace
//! directory and turns the executor's output into a typed event sequence
//! that ends with the subtask's outcome.
//!
//! The runner:
//! 1. Creates `<iteration_dir>/subtask-<sequence>` and emits `start`
//! 2. Forwards executor `output` events unchanged as they arrive
//! 3. Guarantees a summary file exists, synthesizing one from the output if needed
//! 4. Lists every file the subtask produced and emits `complete` or `error`

pub mod artifacts;
pub mod context;

use futures::stream::BoxStream;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::capability::{ExecutionRequest, Executor, ProgressStream};
use crate::config::EngineConfig;
use crate::error::{AbortError, ExecutionError};
use crate::plan::{is_contained, ProgressEvent, Subtask, SubtaskResult};

pub use artifacts::{list_files, synthesize_summary, TRUNCATION_MARKER};
pub use context::build_context_summary;

/// Summary file used when a subtask declares none
const FALLBACK_SUMMARY_FILE: &str = "summary.md";

/// How a subtask run ended
#[derive(Debug, Clone, PartialEq)]
pub enum SubtaskOutcome {
    /// Ran to completion, successfully or not
    Completed(SubtaskResult),
    /// Cancelled by the operator; carries no user-facing error
    Aborted(AbortError),
}

/// Item of the runner's stream; `Finished` is always last
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerEvent {
    Progress(ProgressEvent),
    Finished(SubtaskOutcome),
}

/// Result of waiting on the executor under abort and deadline
enum Wait<T> {
    Ready(T),
    Aborted,
    TimedOut,
}

async fn wait_for<F: std::future::Future>(
    fut: F,
    abort: &CancellationToken,
    deadline: Instant,
) -> Wait<F::Output> {
    tokio::select! {
        biased;
        _ = abort.cancelled() => Wait::Aborted,
        _ = tokio::time::sleep_until(deadline) => Wait::TimedOut,
        value = fut => Wait::Ready(value),
    }
}

/// Executes single subtasks via an [`Executor`]
#[derive(Clone)]
pub struct SubtaskRunner {
    executor: Arc<dyn Executor>,
    timeout: Duration,
    summary_max_chars: usize,
    abort: CancellationToken,
}

impl SubtaskRunner {
    pub fn new(executor: Arc<dyn Executor>, config: &EngineConfig) -> Self {
        Self {
            executor,
            timeout: config.subtask_timeout(),
            summary_max_chars: config.summary_max_chars,
            abort: CancellationToken::new(),
        }
    }

    /// Use an operator-controlled abort signal
    pub fn with_abort(mut self, abort: CancellationToken) -> Self {
        self.abort = abort;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `subtask` and stream its progress.
    ///
    /// The stream always ends with exactly one [`RunnerEvent::Finished`]. An
    /// abort ends the stream without any `error` event.
    pub fn run(
        &self,
        subtask: Subtask,
        total_steps: usize,
        prior_results: Arc<[SubtaskResult]>,
        iteration_dir: PathBuf,
    ) -> BoxStream<'static, RunnerEvent> {
        let runner = self.clone();

        let stream = async_stream::stream! {
            let sequence = subtask.sequence;
            let aborted = move || RunnerEvent::Finished(SubtaskOutcome::Aborted(AbortError { sequence }));

            if runner.abort.is_cancelled() {
                tracing::info!(sequence, "Subtask aborted before start");
                yield aborted();
                return;
            }

            let workspace_dir = iteration_dir.join(subtask.dir_name());
            let summary_file = workspace_summary_file(&subtask);

            if let Err(source) = tokio::fs::create_dir_all(&workspace_dir).await {
                let error = ExecutionError::Workspace {
                    path: workspace_dir.clone(),
                    source,
                };
                tracing::warn!(sequence, "Failed to create subtask workspace: {}", error);
                yield RunnerEvent::Progress(ProgressEvent::Error {
                    sequence,
                    title: subtask.title.clone(),
                    error: error.to_string(),
                });
                yield RunnerEvent::Finished(SubtaskOutcome::Completed(SubtaskResult {
                    sequence,
                    success: false,
                    summary: String::new(),
                    files: Vec::new(),
                    summary_file,
                    error: Some(error.to_string()),
                    completed_at: chrono::Utc::now(),
                }));
                return;
            }

            tracing::info!(sequence, title = %subtask.title, "Subtask started");
            yield RunnerEvent::Progress(ProgressEvent::Start {
                sequence,
                total_steps,
                title: subtask.title.clone(),
                description: subtask.description.clone(),
            });

            let request = ExecutionRequest {
                subtask: subtask.clone(),
                total_steps,
                context: build_context_summary(&prior_results),
                prior_results: prior_results.clone(),
                workspace_dir: workspace_dir.clone(),
                iteration_dir: iteration_dir.clone(),
            };

            let deadline = Instant::now() + runner.timeout;
            let mut output = String::new();
            let mut failure: Option<ExecutionError> = None;

            let events: Option<ProgressStream> =
                match wait_for(runner.executor.execute_subtask(request), &runner.abort, deadline).await {
                    Wait::Aborted => {
                        yield aborted();
                        return;
                    }
                    Wait::TimedOut => {
                        failure = Some(ExecutionError::Timeout(runner.timeout.as_secs()));
                        None
                    }
                    Wait::Ready(Err(e)) => {
                        failure = Some(ExecutionError::Executor(format!("{:#}", e)));
                        None
                    }
                    Wait::Ready(Ok(events)) => Some(events),
                };

            if let Some(mut events) = events {
                loop {
                    if runner.abort.is_cancelled() {
                        tracing::info!(sequence, "Subtask aborted");
                        yield aborted();
                        return;
                    }

                    let next = match wait_for(events.next(), &runner.abort, deadline).await {
                        Wait::Aborted => {
                            tracing::info!(sequence, "Subtask aborted");
                            yield aborted();
                            return;
                        }
                        Wait::TimedOut => {
                            tracing::warn!(sequence, "Subtask timed out after {:?}", runner.timeout);
                            failure = Some(ExecutionError::Timeout(runner.timeout.as_secs()));
                            break;
                        }
                        Wait::Ready(next) => next,
                    };

                    match next {
                        None => break,
                        Some(Err(e)) => {
                            failure = Some(ExecutionError::Executor(format!("{:#}", e)));
                            break;
                        }
                        Some(Ok(ProgressEvent::Error { error, .. })) => {
                            failure = Some(ExecutionError::Executor(error));
                            break;
                        }
                        Some(Ok(event @ ProgressEvent::Output { .. })) => {
                            if let ProgressEvent::Output { content, .. } = &event {
                                output.push_str(content);
                                output.push('\n');
                            }
                            yield RunnerEvent::Progress(event);
                        }
                        Some(Ok(other)) => {
                            tracing::debug!(sequence, "Ignoring executor lifecycle event: {:?}", other);
                        }
                    }
                }
            }

            let summary = runner
                .ensure_summary(&workspace_dir, &summary_file, &subtask.title, &output)
                .await;
            let files = enumerate_files(&workspace_dir).await;

            let result = SubtaskResult {
                sequence,
                success: failure.is_none(),
                summary,
                files: files.clone(),
                summary_file: summary_file.clone(),
                error: failure.as_ref().map(|e| e.to_string()),
                completed_at: chrono::Utc::now(),
            };

            match &failure {
                Some(error) => {
                    tracing::warn!(sequence, "Subtask failed: {}", error);
                    yield RunnerEvent::Progress(ProgressEvent::Error {
                        sequence,
                        title: subtask.title.clone(),
                        error: error.to_string(),
                    });
                }
                None => {
                    tracing::info!(sequence, files = files.len(), "Subtask completed");
                    yield RunnerEvent::Progress(ProgressEvent::Complete {
                        sequence,
                        title: subtask.title.clone(),
                        files,
                        summary_file,
                    });
                }
            }

            yield RunnerEvent::Finished(SubtaskOutcome::Completed(result));
        };

        stream.boxed()
    }

    /// Read the declared summary file, writing a synthesized one if absent
    async fn ensure_summary(
        &self,
        workspace_dir: &Path,
        summary_file: &str,
        title: &str,
        output: &str,
    ) -> String {
        let path = workspace_dir.join(summary_file);

        if path.is_file() {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => return content,
                Err(e) => tracing::warn!("Failed to read summary {}: {}", path.display(), e),
            }
        }

        let summary = synthesize_summary(title, output, self.summary_max_chars);
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                tracing::warn!("Failed to create {}: {}", parent.display(), e);
            }
        }
        if let Err(e) = tokio::fs::write(&path, &summary).await {
            tracing::warn!("Failed to write synthesized summary {}: {}", path.display(), e);
        }
        summary
    }
}

/// The subtask's summary file, confined to its own workspace directory
fn workspace_summary_file(subtask: &Subtask) -> String {
    match subtask.summary_file() {
        Some(file) if is_contained(file) => file.to_string(),
        Some(file) => {
            tracing::warn!(
                sequence = subtask.sequence,
                "Summary file {:?} escapes the subtask directory; using {}",
                file,
                FALLBACK_SUMMARY_FILE
            );
            FALLBACK_SUMMARY_FILE.to_string()
        }
        None => FALLBACK_SUMMARY_FILE.to_string(),
    }
}

async fn enumerate_files(dir: &Path) -> Vec<String> {
    let dir = dir.to_path_buf();
    match tokio::task::spawn_blocking(move || list_files(&dir)).await {
        Ok(Ok(files)) => files,
        Ok(Err(e)) => {
            tracing::warn!("Failed to list subtask files: {}", e);
            Vec::new()
        }
        Err(e) => {
            tracing::warn!("File listing task failed: {}", e);
            Vec::new()
        }
    }
}
