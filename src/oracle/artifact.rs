//! Artifact-presence completion check: the task is done once its
//! final-result file exists, whatever it contains.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::error::OracleError;
use crate::plan::EvaluationResult;

use super::{Completion, CompletionOracle, IterationArtifacts, Verdict};

pub struct ArtifactOracle {
    file_name: String,
}

impl ArtifactOracle {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }

    pub fn result_path(&self, artifacts: &IterationArtifacts) -> PathBuf {
        artifacts.task_dir.join(&self.file_name)
    }
}

#[async_trait]
impl CompletionOracle for ArtifactOracle {
    fn name(&self) -> &str {
        "artifact"
    }

    async fn detect(
        &self,
        task_id: &str,
        artifacts: &IterationArtifacts,
    ) -> Result<Verdict, OracleError> {
        let path = self.result_path(artifacts);

        match tokio::fs::metadata(&path).await {
            Ok(_) => {
                tracing::debug!(task_id, path = %path.display(), "Final result file present");
                Ok(Verdict::Completed(Completion {
                    strategy: self.name().to_string(),
                    message: None,
                    files: vec![self.file_name.clone()],
                }))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Verdict::Incomplete(EvaluationResult {
                is_complete: false,
                reason: artifacts.original_request.clone(),
                missing_items: Vec::new(),
                confidence: 1.0,
            })),
            Err(e) => Err(OracleError::new(
                self.name(),
                format!("cannot inspect {}: {}", path.display(), e),
            )),
        }
    }
}
