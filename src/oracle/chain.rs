//! Ordered composition of completion strategies.
//!
//! Strategies are consulted in construction order. The first `Completed`
//! verdict wins. Otherwise the last `Incomplete` verdict is returned. A
//! failing strategy is logged and skipped; only when every strategy fails
//! is the last error surfaced.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::OracleError;

use super::{CompletionOracle, IterationArtifacts, Verdict};

pub struct OracleChain {
    strategies: Vec<Arc<dyn CompletionOracle>>,
}

impl OracleChain {
    pub fn new(strategies: Vec<Arc<dyn CompletionOracle>>) -> Self {
        Self { strategies }
    }

    pub fn then(mut self, strategy: Arc<dyn CompletionOracle>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[async_trait]
impl CompletionOracle for OracleChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn detect(&self, task_id: &str, artifacts: &IterationArtifacts) -> Result<Verdict, OracleError> {
        let mut incomplete = None;
        let mut last_error = None;

        for strategy in &self.strategies {
            match strategy.detect(task_id, artifacts).await {
                Ok(verdict @ Verdict::Completed(_)) => {
                    tracing::debug!(task_id, strategy = strategy.name(), "Completion detected");
                    return Ok(verdict);
                }
                Ok(verdict) => incomplete = Some(verdict),
                Err(e) => {
                    tracing::warn!(task_id, strategy = strategy.name(), "Oracle strategy failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        match (incomplete, last_error) {
            (Some(verdict), _) => Ok(verdict),
            (None, Some(e)) => Err(e),
            (None, None) => Err(OracleError::new(self.name(), "no strategies configured")),
        }
    }
}
