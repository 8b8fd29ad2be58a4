use super::common::*;
use anyhow::Result;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use taskloom::engine::{is_fatal, phase_of, IterationEngine};
use taskloom::error::{AbortError, EngineError, OracleError};
use taskloom::oracle::{Completion, IterationArtifacts, Verdict};
use taskloom::plan::{EvaluationResult, Subtask, TaskPlan};
use taskloom::stream::MessageKind;

fn not_done(reason: &str) -> Verdict {
    Verdict::Incomplete(EvaluationResult::incomplete(reason))
}

fn artifacts(env: &TestEnvironment, task_id: &str) -> IterationArtifacts {
    IterationArtifacts::new(1, "write a report", env.config().task_dir(task_id))
}

#[tokio::test]
async fn test_failure_stops_execution_and_aggregates() -> Result<()> {
    let env = TestEnvironment::new()?;
    let planner = ScriptedPlanner::with_plans(vec![Ok(linear_plan("t1", 3))]);
    let executor = ScriptedExecutor::new(vec![
        (1, StepScript::output("gathered sources")),
        (2, StepScript::failing("drafted half", "model overloaded")),
    ]);

    let engine = IterationEngine::builder(planner.clone(), executor.clone(), env.config())
        .with_oracle(FixedOracle::new(Ok(not_done("write a report"))))
        .build();
    let (messages, error) = drain(engine.run("t1", artifacts(&env, "t1"))).await;

    assert!(error.is_none());
    assert_eq!(executor.executed(), vec![1, 2]);

    let last = messages.last().unwrap();
    assert_eq!(last.kind, MessageKind::Result);
    assert!(last.content.starts_with("Completed 1/3 steps"));
    assert!(last.content.contains("gathered sources"));
    assert!(last.content.contains("drafted half"));
    let metadata = last.metadata.as_ref().unwrap();
    assert_eq!(metadata["completedSteps"], 1);
    assert_eq!(metadata["totalSteps"], 3);

    let failures = of_kind(&messages, MessageKind::Error);
    assert_eq!(failures.len(), 1);
    assert!(failures[0].content.contains("model overloaded"));
    assert!(!is_fatal(failures[0]));
    Ok(())
}

#[tokio::test]
async fn test_oversized_plan_rejected_before_execution() -> Result<()> {
    let env = TestEnvironment::new()?;
    let planner = ScriptedPlanner::with_plans(vec![Ok(linear_plan("t2", 11))]);
    let executor = ScriptedExecutor::new(Vec::new());

    let engine = IterationEngine::builder(planner.clone(), executor.clone(), env.config())
        .with_oracle(FixedOracle::new(Ok(not_done("big task"))))
        .build();
    let (messages, error) = drain(engine.run("t2", artifacts(&env, "t2"))).await;

    assert!(error.is_none());
    assert!(executor.executed().is_empty());
    assert_eq!(phases(&messages), ["planning"]);
    let visible = without_phases(&messages);
    assert_eq!(visible.len(), 1);
    assert!(is_fatal(visible[0]));
    assert!(visible[0].content.contains("too many subtasks"));
    Ok(())
}

#[tokio::test]
async fn test_forward_reference_rejected() -> Result<()> {
    let env = TestEnvironment::new()?;
    let plan = TaskPlan::new("t3", "req")
        .add_subtask(Subtask::new(1, "One", "First").with_source("subtask-2/summary.md"))
        .add_subtask(Subtask::new(2, "Two", "Second"));
    let planner = ScriptedPlanner::with_plans(vec![Ok(plan)]);
    let executor = ScriptedExecutor::new(Vec::new());

    let engine = IterationEngine::builder(planner, executor.clone(), env.config())
        .with_oracle(FixedOracle::new(Ok(not_done("req"))))
        .build();
    let (messages, _) = drain(engine.run("t3", artifacts(&env, "t3"))).await;

    assert!(executor.executed().is_empty());
    let visible = without_phases(&messages);
    assert_eq!(visible.len(), 1);
    assert!(is_fatal(visible[0]));
    assert!(visible[0].content.contains("references future or current step"));
    Ok(())
}

#[tokio::test]
async fn test_completed_oracle_skips_planning() -> Result<()> {
    let env = TestEnvironment::new()?;
    let planner = ScriptedPlanner::with_plans(vec![Ok(linear_plan("t4", 1))]);
    let executor = ScriptedExecutor::new(Vec::new());
    let oracle = FixedOracle::new(Ok(Verdict::Completed(Completion {
        strategy: "fixed".to_string(),
        message: Some("Report delivered".to_string()),
        files: vec!["final_result.md".to_string()],
    })));

    let engine = IterationEngine::builder(planner.clone(), executor.clone(), env.config())
        .with_oracle(oracle.clone())
        .build();
    let (messages, error) = drain(engine.run("t4", artifacts(&env, "t4"))).await;

    assert!(error.is_none());
    assert_eq!(planner.calls(), 0);
    assert!(executor.executed().is_empty());
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    assert_eq!(messages.len(), 1);
    assert!(phases(&messages).is_empty());
    assert_eq!(messages[0].kind, MessageKind::Completion);
    assert_eq!(messages[0].content, "Report delivered");
    Ok(())
}

#[tokio::test]
async fn test_abort_before_start_is_silent() -> Result<()> {
    let env = TestEnvironment::new()?;
    let planner = ScriptedPlanner::with_plans(vec![Ok(linear_plan("t5", 2))]);
    let executor = ScriptedExecutor::new(Vec::new());
    let reporter = Arc::new(EchoReporter::default());
    let abort = CancellationToken::new();
    abort.cancel();

    let engine = IterationEngine::builder(planner, executor.clone(), env.config())
        .with_oracle(FixedOracle::new(Ok(not_done("req"))))
        .with_reporter(reporter.clone())
        .with_abort(abort)
        .build();
    let (messages, error) = drain(engine.run("t5", artifacts(&env, "t5"))).await;

    match error {
        Some(EngineError::Aborted(AbortError { sequence })) => assert_eq!(sequence, 1),
        other => panic!("expected abort, got {:?}", other),
    }
    assert!(executor.executed().is_empty());
    assert_eq!(reporter.prompts.load(Ordering::SeqCst), 0);
    assert!(of_kind(&messages, MessageKind::Commentary).is_empty());
    assert!(of_kind(&messages, MessageKind::Error).is_empty());
    assert!(of_kind(&messages, MessageKind::Result).is_empty());
    assert_eq!(phases(&messages), ["planning", "executing"]);
    Ok(())
}

#[tokio::test]
async fn test_planner_failure_yields_one_message() -> Result<()> {
    let env = TestEnvironment::new()?;
    let planner = ScriptedPlanner::with_plans(vec![Err("planner offline".to_string())]);
    let executor = ScriptedExecutor::new(Vec::new());

    let engine = IterationEngine::builder(planner, executor.clone(), env.config())
        .with_oracle(FixedOracle::new(Ok(not_done("req"))))
        .build();
    let (messages, error) = drain(engine.run("t6", artifacts(&env, "t6"))).await;

    assert!(error.is_none());
    assert_eq!(phases(&messages), ["planning"]);
    let visible = without_phases(&messages);
    assert_eq!(visible.len(), 1);
    assert!(is_fatal(visible[0]));
    assert!(visible[0].content.contains("planner offline"));
    assert!(executor.executed().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_oracle_error_becomes_instruction() -> Result<()> {
    let env = TestEnvironment::new()?;
    let planner = ScriptedPlanner::with_plans(vec![Err("stop here".to_string())]);
    let executor = ScriptedExecutor::new(Vec::new());

    let engine = IterationEngine::builder(planner.clone(), executor, env.config())
        .with_oracle(FixedOracle::new(Err(OracleError::new("fixed", "disk unreadable"))))
        .build();
    drain(engine.run("t7", artifacts(&env, "t7"))).await;

    assert_eq!(planner.calls(), 1);
    assert!(planner.instruction(0).contains("disk unreadable"));
    Ok(())
}

#[tokio::test]
async fn test_missing_items_drive_planning() -> Result<()> {
    let env = TestEnvironment::new()?;
    let planner = ScriptedPlanner::with_plans(vec![Err("stop here".to_string())]);
    let evaluation = EvaluationResult::incomplete("unused")
        .with_missing(vec!["executive summary".to_string(), "charts".to_string()]);

    let engine = IterationEngine::builder(planner.clone(), ScriptedExecutor::new(Vec::new()), env.config())
        .with_oracle(FixedOracle::new(Ok(Verdict::Incomplete(evaluation))))
        .build();
    drain(engine.run("t8", artifacts(&env, "t8"))).await;

    let instruction = planner.instruction(0);
    assert!(instruction.contains("- executive summary"));
    assert!(instruction.contains("- charts"));
    assert!(!instruction.contains("unused"));
    Ok(())
}

#[tokio::test]
async fn test_prior_results_and_workspace_layout() -> Result<()> {
    let env = TestEnvironment::new()?;
    let planner = ScriptedPlanner::with_plans(vec![Ok(linear_plan("t9", 2))]);
    let mut first = StepScript::output("found three sources");
    first.files.push(("sources.md".to_string(), "- a\n- b\n- c\n".to_string()));
    let executor = ScriptedExecutor::new(vec![(1, first)]);

    let engine = IterationEngine::builder(planner, executor.clone(), env.config())
        .with_oracle(FixedOracle::new(Ok(not_done("req"))))
        .build();
    let (messages, _) = drain(engine.run("t9", artifacts(&env, "t9"))).await;
    assert!(messages.last().unwrap().content.starts_with("Completed 2/2 steps"));

    let requests = executor.requests.lock().unwrap();
    assert!(requests[0].prior_results.is_empty());
    assert!(requests[0].context.is_empty());
    assert_eq!(requests[1].prior_results.len(), 1);
    assert!(requests[1].context.contains("subtask-1/sources.md"));

    let iteration_dir = env.workspace.join("t9").join("iteration-1");
    assert_eq!(requests[1].iteration_dir, iteration_dir);
    assert!(iteration_dir.join("subtask-1/sources.md").is_file());
    assert!(iteration_dir.join("subtask-1/summary.md").is_file());
    assert!(iteration_dir.join("subtask-2/summary.md").is_file());
    Ok(())
}

#[tokio::test]
async fn test_commentary_is_merged_before_result() -> Result<()> {
    let env = TestEnvironment::new()?;
    let planner = ScriptedPlanner::with_plans(vec![Ok(linear_plan("t10", 2))]);
    let reporter = Arc::new(EchoReporter::default());

    let engine = IterationEngine::builder(planner, ScriptedExecutor::new(Vec::new()), env.config())
        .with_oracle(FixedOracle::new(Ok(not_done("req"))))
        .with_reporter(reporter.clone())
        .build();
    let (messages, _) = drain(engine.run("t10", artifacts(&env, "t10"))).await;

    // start + complete for each of the two steps
    assert_eq!(reporter.prompts.load(Ordering::SeqCst), 4);
    let commentary = of_kind(&messages, MessageKind::Commentary);
    assert_eq!(commentary.len(), 4);
    assert!(commentary[0].content.contains("Step 1/2 is starting"));

    let result_at = messages.iter().position(|m| m.kind == MessageKind::Result).unwrap();
    assert_eq!(result_at, messages.len() - 1);
    Ok(())
}

#[tokio::test]
async fn test_phase_transitions_reach_caller_in_order() -> Result<()> {
    let env = TestEnvironment::new()?;
    let planner = ScriptedPlanner::with_plans(vec![Ok(linear_plan("t11", 2))]);
    let executor = ScriptedExecutor::new(vec![(1, StepScript::output("first")), (2, StepScript::output("second"))]);

    let engine = IterationEngine::builder(planner, executor, env.config())
        .with_oracle(FixedOracle::new(Ok(not_done("req"))))
        .build();
    let (messages, error) = drain(engine.run("t11", artifacts(&env, "t11"))).await;

    assert!(error.is_none());
    assert_eq!(phases(&messages), ["planning", "executing", "aggregating"]);

    let position = |phase: &str| messages.iter().position(|m| phase_of(m) == Some(phase)).unwrap();
    let plan_at = messages.iter().position(|m| m.content.starts_with("Plan: ")).unwrap();
    let first_output = messages.iter().position(|m| m.content == "first").unwrap();
    let result_at = messages.iter().position(|m| m.kind == MessageKind::Result).unwrap();

    assert!(position("planning") < plan_at);
    assert!(plan_at < position("executing"));
    assert!(position("executing") < first_output);
    assert!(first_output < position("aggregating"));
    assert_eq!(result_at, position("aggregating") + 1);
    assert_eq!(result_at, messages.len() - 1);
    Ok(())
}
