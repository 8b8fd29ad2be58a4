//! Error taxonomy for the orchestration core.
//!
//! External capabilities report failures as `anyhow::Error`; the engine maps
//! them onto these types at its boundary.

use std::path::PathBuf;
use thiserror::Error;

/// A structural or referential defect in a task plan.
///
/// Indices are zero-based positions in `TaskPlan::subtasks`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("malformed plan: {0}")]
    Malformed(String),

    #[error("plan has no subtasks")]
    Empty,

    #[error("too many subtasks: {count} (maximum is {max})")]
    TooManySubtasks { count: usize, max: usize },

    #[error("totalSteps is {declared} but plan contains {actual} subtasks")]
    StepCountMismatch { declared: usize, actual: usize },

    #[error("subtask at index {index} has sequence {found}, expected {expected}")]
    SequenceMismatch {
        index: usize,
        expected: u32,
        found: u32,
    },

    #[error("subtask {index} is missing required field `{field}`")]
    MissingField { index: usize, field: &'static str },

    #[error("subtask {index}: summaryFile `{path}` must be a relative path inside the subtask directory")]
    UnsafeSummaryPath { index: usize, path: String },

    #[error("subtask {index}: markdown requirement #{position} is missing `{field}`")]
    MissingRequirementField {
        index: usize,
        position: usize,
        field: &'static str,
    },

    #[error("subtask {index}: markdown requirement `{id}` must declare a boolean `required`")]
    RequirementFlag { index: usize, id: String },

    #[error("subtask {index}: duplicate markdown requirement id `{id}`")]
    DuplicateRequirementId { index: usize, id: String },

    #[error("subtask {index}: source `{source_ref}` has invalid step number {referenced}")]
    InvalidReference {
        index: usize,
        source_ref: String,
        referenced: String,
    },

    #[error(
        "subtask {index}: source `{source_ref}` references future or current step {referenced}"
    )]
    ForwardReference {
        index: usize,
        source_ref: String,
        referenced: u32,
    },

    #[error(
        "subtask {index}: source `{source_ref}` references step {referenced}, which has no markdown requirements defined"
    )]
    NoRequirements {
        index: usize,
        source_ref: String,
        referenced: u32,
    },

    #[error(
        "subtask {index}: source `{source_ref}` references undefined section `{section}` of step {referenced}"
    )]
    UndefinedSection {
        index: usize,
        source_ref: String,
        referenced: u32,
        section: String,
    },
}

impl ValidationError {
    /// Index of the offending subtask, when the defect is local to one.
    pub fn subtask_index(&self) -> Option<usize> {
        match self {
            ValidationError::Malformed(_)
            | ValidationError::Empty
            | ValidationError::TooManySubtasks { .. }
            | ValidationError::StepCountMismatch { .. } => None,
            ValidationError::SequenceMismatch { index, .. }
            | ValidationError::MissingField { index, .. }
            | ValidationError::UnsafeSummaryPath { index, .. }
            | ValidationError::MissingRequirementField { index, .. }
            | ValidationError::RequirementFlag { index, .. }
            | ValidationError::DuplicateRequirementId { index, .. }
            | ValidationError::InvalidReference { index, .. }
            | ValidationError::ForwardReference { index, .. }
            | ValidationError::NoRequirements { index, .. }
            | ValidationError::UndefinedSection { index, .. } => Some(*index),
        }
    }
}

/// Operator-requested cancellation of a subtask.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("subtask {sequence} aborted")]
pub struct AbortError {
    pub sequence: u32,
}

/// Failure while running a single subtask.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("executor failed: {0}")]
    Executor(String),

    #[error("subtask timed out after {0}s")]
    Timeout(u64),

    #[error("workspace error at {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The completion oracle could not produce a verdict.
#[derive(Debug, Clone, Error)]
#[error("{strategy} oracle failed: {message}")]
pub struct OracleError {
    pub strategy: String,
    pub message: String,
}

impl OracleError {
    pub fn new(strategy: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            message: message.into(),
        }
    }
}

/// Iteration-level failure surfaced on the caller-facing stream.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("planning failed: {0}")]
    Planning(String),

    #[error(transparent)]
    Aborted(#[from] AbortError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("workspace error at {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    pub fn is_abort(&self) -> bool {
        matches!(self, EngineError::Aborted(_))
    }
}
