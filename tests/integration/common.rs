#![allow(dead_code)]

use anyhow::Result;
use assert_fs::TempDir;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use taskloom::capability::{ExecutionRequest, Executor, MessageStream, Planner, ProgressStream, Reporter};
use taskloom::config::EngineConfig;
use taskloom::engine::phase_of;
use taskloom::error::{EngineError, OracleError};
use taskloom::oracle::{CompletionOracle, IterationArtifacts, Verdict};
use taskloom::plan::{ProgressEvent, Subtask, TaskPlan};
use taskloom::stream::{Message, MessageKind};

/// Temporary workspace for one test
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub workspace: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let workspace = temp_dir.path().join("workspace");
        Ok(Self { temp_dir, workspace })
    }

    pub fn config(&self) -> EngineConfig {
        EngineConfig {
            workspace_root: self.workspace.clone(),
            subtask_timeout_secs: 5,
            ..EngineConfig::default()
        }
    }
}

/// A valid plan of `steps` subtasks, each reading its predecessor's summary
pub fn linear_plan(task_id: &str, steps: u32) -> TaskPlan {
    let mut plan = TaskPlan::new(task_id, "write a report").with_title("Report");
    for sequence in 1..=steps {
        let mut subtask = Subtask::new(sequence, format!("Step {}", sequence), format!("Do part {}", sequence));
        if sequence > 1 {
            subtask = subtask.with_source(format!("subtask-{}/summary.md", sequence - 1));
        }
        plan = plan.add_subtask(subtask);
    }
    plan
}

/// Planner returning queued plans and recording its instructions
#[derive(Default)]
pub struct ScriptedPlanner {
    plans: Mutex<VecDeque<Result<TaskPlan, String>>>,
    pub instructions: Mutex<Vec<String>>,
}

impl ScriptedPlanner {
    pub fn with_plans(plans: Vec<Result<TaskPlan, String>>) -> Arc<Self> {
        Arc::new(Self {
            plans: Mutex::new(plans.into()),
            instructions: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.instructions.lock().unwrap().len()
    }

    pub fn instruction(&self, call: usize) -> String {
        self.instructions.lock().unwrap()[call].clone()
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan_task(&self, instruction: &str) -> Result<TaskPlan> {
        self.instructions.lock().unwrap().push(instruction.to_string());
        match self.plans.lock().unwrap().pop_front() {
            Some(Ok(plan)) => Ok(plan),
            Some(Err(e)) => Err(anyhow::anyhow!(e)),
            None => Err(anyhow::anyhow!("no plan scripted")),
        }
    }
}

/// Behavior of one subtask under [`ScriptedExecutor`]
#[derive(Clone, Default)]
pub struct StepScript {
    pub events: Vec<ProgressEvent>,
    pub files: Vec<(String, String)>,
    pub fail: Option<String>,
    /// Write the task's final-result file
    pub final_result: bool,
}

impl StepScript {
    pub fn output(text: &str) -> Self {
        Self {
            events: vec![ProgressEvent::text(text)],
            ..Self::default()
        }
    }

    pub fn failing(text: &str, error: &str) -> Self {
        Self {
            fail: Some(error.to_string()),
            ..Self::output(text)
        }
    }
}

/// Executor following per-sequence scripts and recording every request
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: HashMap<u32, StepScript>,
    pub requests: Mutex<Vec<ExecutionRequest>>,
}

impl ScriptedExecutor {
    pub fn new(scripts: Vec<(u32, StepScript)>) -> Arc<Self> {
        Arc::new(Self {
            scripts: scripts.into_iter().collect(),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Sequences executed, in call order
    pub fn executed(&self) -> Vec<u32> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.subtask.sequence)
            .collect()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute_subtask(&self, request: ExecutionRequest) -> Result<ProgressStream> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .get(&request.subtask.sequence)
            .cloned()
            .unwrap_or_else(|| StepScript::output("done"));

        for (file, content) in &script.files {
            let path = request.workspace_dir.join(file);
            std::fs::create_dir_all(path.parent().unwrap())?;
            std::fs::write(path, content)?;
        }
        if script.final_result {
            std::fs::write(request.task_dir().join("final_result.md"), "# Final\n")?;
        }

        let mut items: Vec<Result<ProgressEvent>> = script.events.into_iter().map(Ok).collect();
        if let Some(error) = script.fail {
            items.push(Err(anyhow::anyhow!(error)));
        }
        Ok(futures::stream::iter(items).boxed())
    }
}

/// Reporter narrating each prompt with one message
#[derive(Default)]
pub struct EchoReporter {
    pub prompts: AtomicUsize,
}

impl Reporter for EchoReporter {
    fn narrate(&self, prompt: String) -> MessageStream {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let first_line = prompt.lines().next().unwrap_or_default().to_string();
        futures::stream::iter(vec![Ok(Message::commentary(format!("narration: {}", first_line)))]).boxed()
    }
}

/// Oracle returning a fixed verdict
pub struct FixedOracle {
    verdict: Result<Verdict, OracleError>,
    pub calls: AtomicUsize,
}

impl FixedOracle {
    pub fn new(verdict: Result<Verdict, OracleError>) -> Arc<Self> {
        Arc::new(Self {
            verdict,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CompletionOracle for FixedOracle {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn detect(&self, _task_id: &str, _artifacts: &IterationArtifacts) -> Result<Verdict, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.verdict.clone()
    }
}

/// Drain a stream, separating messages from the terminal error
pub async fn drain<S>(stream: S) -> (Vec<Message>, Option<EngineError>)
where
    S: Stream<Item = Result<Message, EngineError>>,
{
    let mut stream = Box::pin(stream);
    let mut messages = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(message) => messages.push(message),
            Err(e) => {
                assert!(stream.next().await.is_none(), "items after error");
                return (messages, Some(e));
            }
        }
    }
    (messages, None)
}

pub fn of_kind(messages: &[Message], kind: MessageKind) -> Vec<&Message> {
    messages.iter().filter(|m| m.kind == kind).collect()
}

/// Phase transitions announced on the stream, in order
pub fn phases(messages: &[Message]) -> Vec<&str> {
    messages.iter().filter_map(phase_of).collect()
}

/// Every message except phase transition notices
pub fn without_phases(messages: &[Message]) -> Vec<&Message> {
    messages.iter().filter(|m| phase_of(m).is_none()).collect()
}
