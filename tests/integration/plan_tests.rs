use anyhow::Result;
use assert_fs::prelude::*;
use assert_fs::TempDir;

use taskloom::error::ValidationError;
use taskloom::plan::{PlanValidator, SourceRef, TaskPlan};

const VALID_PLAN: &str = r##"{
  "taskId": "report-42",
  "originalRequest": "Write a market report",
  "title": "Market report",
  "description": "Research then write",
  "totalSteps": 2,
  "subtasks": [
    {
      "sequence": 1,
      "title": "Research",
      "description": "Collect market data",
      "inputs": { "description": "public sources", "sources": [] },
      "outputs": {
        "description": "research notes",
        "files": ["notes.md"],
        "summaryFile": "summary.md",
        "markdownRequirements": [
          { "id": "findings", "title": "Findings", "content": "Key numbers", "required": true }
        ]
      },
      "complexity": "medium"
    },
    {
      "sequence": 2,
      "title": "Write",
      "description": "Write the report",
      "inputs": { "description": "notes", "sources": ["subtask-1/notes.md#findings"] },
      "outputs": { "description": "the report", "files": ["report.md"], "summaryFile": "summary.md" }
    }
  ]
}"##;

#[test]
fn test_plan_file_round_trip_validates() -> Result<()> {
    let dir = TempDir::new()?;
    let file = dir.child("plan.json");
    file.write_str(VALID_PLAN)?;

    let plan = TaskPlan::from_json(&std::fs::read_to_string(file.path())?)?;
    PlanValidator::validate(&plan)?;

    let reparsed = TaskPlan::from_json(&plan.to_json()?)?;
    assert_eq!(reparsed, plan);
    assert_eq!(reparsed.subtask(2).unwrap().sources(), ["subtask-1/notes.md#findings"]);
    Ok(())
}

#[test]
fn test_undefined_section_reference() -> Result<()> {
    let json = VALID_PLAN.replace("notes.md#findings", "notes.md#conclusions");
    let plan = TaskPlan::from_json(&json)?;

    match PlanValidator::validate(&plan) {
        Err(ValidationError::UndefinedSection { index, section, referenced, .. }) => {
            assert_eq!(index, 1);
            assert_eq!(section, "conclusions");
            assert_eq!(referenced, 1);
        }
        other => panic!("unexpected result: {:?}", other),
    }
    Ok(())
}

#[test]
fn test_missing_required_flag() -> Result<()> {
    let json = VALID_PLAN.replace(r#", "required": true"#, "");
    let plan = TaskPlan::from_json(&json)?;
    assert_eq!(
        PlanValidator::validate(&plan),
        Err(ValidationError::RequirementFlag {
            index: 0,
            id: "findings".to_string()
        })
    );
    Ok(())
}

#[test]
fn test_malformed_json() {
    assert!(matches!(
        TaskPlan::from_json("{ not json"),
        Err(ValidationError::Malformed(_))
    ));
}

#[test]
fn test_source_reference_resolution() {
    let source = SourceRef::parse("subtask-1/notes.md#findings").unwrap();
    let resolved = source.resolve(std::path::Path::new("/work/t/iteration-1"));
    assert_eq!(resolved, std::path::PathBuf::from("/work/t/iteration-1/subtask-1/notes.md"));
    assert!(SourceRef::parse("https://example.com/data.csv").is_none());
}
