//! Completion Oracle
//!
//! Strategies deciding whether a task, as a whole, is finished. The engine
//! consults one oracle at the start of every iteration.

pub mod artifact;
pub mod chain;
pub mod tool_signal;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{OracleConfig, OracleMode};
use crate::error::OracleError;
use crate::plan::EvaluationResult;
use crate::stream::Message;

pub use artifact::ArtifactOracle;
pub use chain::OracleChain;
pub use tool_signal::{SignalKind, ToolSignalOracle};

/// What an oracle can see of the task so far
#[derive(Debug, Clone, Default)]
pub struct IterationArtifacts {
    /// Iteration about to run, starting at 1
    pub iteration: u32,
    pub original_request: String,
    /// Directory holding the task's iterations and final-result file
    pub task_dir: PathBuf,
    /// Every message emitted by the previous iteration
    pub messages: Vec<Message>,
}

impl IterationArtifacts {
    pub fn new(iteration: u32, original_request: impl Into<String>, task_dir: impl Into<PathBuf>) -> Self {
        Self {
            iteration,
            original_request: original_request.into(),
            task_dir: task_dir.into(),
            messages: Vec::new(),
        }
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }
}

/// Payload of a positive verdict
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Name of the strategy that detected completion
    pub strategy: String,
    /// Optional final message supplied with the signal
    pub message: Option<String>,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Completed(Completion),
    /// Not done; `missing_items` (or `reason`) drives the next plan
    Incomplete(EvaluationResult),
}

impl Verdict {
    pub fn is_complete(&self) -> bool {
        matches!(self, Verdict::Completed(_))
    }
}

#[async_trait]
pub trait CompletionOracle: Send + Sync {
    fn name(&self) -> &str;

    async fn detect(&self, task_id: &str, artifacts: &IterationArtifacts) -> Result<Verdict, OracleError>;
}

/// An external judge of task completion, such as a model-backed reviewer
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, task_id: &str, artifacts: &IterationArtifacts) -> anyhow::Result<EvaluationResult>;
}

/// Adapts an [`Evaluator`] to the oracle interface
pub struct EvaluatorOracle {
    evaluator: Arc<dyn Evaluator>,
}

impl EvaluatorOracle {
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self { evaluator }
    }
}

#[async_trait]
impl CompletionOracle for EvaluatorOracle {
    fn name(&self) -> &str {
        "evaluator"
    }

    async fn detect(&self, task_id: &str, artifacts: &IterationArtifacts) -> Result<Verdict, OracleError> {
        let result = self
            .evaluator
            .evaluate(task_id, artifacts)
            .await
            .map_err(|e| OracleError::new(self.name(), format!("{:#}", e)))?;

        if result.is_complete {
            Ok(Verdict::Completed(Completion {
                strategy: self.name().to_string(),
                message: (!result.reason.is_empty()).then_some(result.reason),
                files: Vec::new(),
            }))
        } else {
            Ok(Verdict::Incomplete(result))
        }
    }
}

/// Build the oracle selected by `config.mode`
pub fn build_oracle(config: &OracleConfig) -> Arc<dyn CompletionOracle> {
    let tool_signal = || Arc::new(ToolSignalOracle::new(config.signal_tools.clone())) as Arc<dyn CompletionOracle>;
    let artifact = || Arc::new(ArtifactOracle::new(config.final_result_file.clone())) as Arc<dyn CompletionOracle>;

    match config.mode {
        OracleMode::Artifact => artifact(),
        OracleMode::ToolSignal => tool_signal(),
        OracleMode::Chained => Arc::new(OracleChain::new(vec![tool_signal(), artifact()])),
    }
}
