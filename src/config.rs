use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::oracle::SignalKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root under which every task gets its own directory
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    /// Maximum Evaluate → Plan → Execute → Aggregate passes per task
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Wall-clock bound on one subtask's execution, in seconds
    #[serde(default = "default_subtask_timeout")]
    pub subtask_timeout_secs: u64,

    /// Length bound for summaries synthesized from executor output
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,

    #[serde(default)]
    pub oracle: OracleConfig,
}

/// Which completion strategy a deployment uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OracleMode {
    /// Presence of the final-result file in the task directory
    #[default]
    Artifact,
    /// A recognized "done" tool call in the previous iteration's output
    ToolSignal,
    /// Tool signal first, then artifact presence
    Chained,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub mode: OracleMode,

    /// File whose existence in the task directory marks the task complete
    #[serde(default = "default_final_result_file")]
    pub final_result_file: String,

    /// Done-signal tools the tool-call strategy recognizes
    #[serde(default = "default_signal_tools")]
    pub signal_tools: Vec<SignalKind>,
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("./workspace")
}

fn default_max_iterations() -> u32 {
    5
}

fn default_subtask_timeout() -> u64 {
    600
}

fn default_summary_max_chars() -> usize {
    4000
}

fn default_final_result_file() -> String {
    "final_result.md".to_string()
}

fn default_signal_tools() -> Vec<SignalKind> {
    SignalKind::ALL.to_vec()
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            mode: OracleMode::default(),
            final_result_file: default_final_result_file(),
            signal_tools: default_signal_tools(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let workspace_root = std::env::var("TASKLOOM_WORKSPACE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_workspace_root());

        Self {
            workspace_root,
            max_iterations: default_max_iterations(),
            subtask_timeout_secs: default_subtask_timeout(),
            summary_max_chars: default_summary_max_chars(),
            oracle: OracleConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from the user config directory, falling back to defaults
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let mut config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        if let Ok(root) = std::env::var("TASKLOOM_WORKSPACE") {
            config.workspace_root = PathBuf::from(root);
        }
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(config_dir.join("taskloom").join("config.toml"))
    }

    pub fn subtask_timeout(&self) -> Duration {
        Duration::from_secs(self.subtask_timeout_secs)
    }

    /// Directory holding all iterations of one task
    pub fn task_dir(&self, task_id: &str) -> PathBuf {
        self.workspace_root.join(task_id)
    }
}
