//! Plan Validator
//!
//! Structural and referential checks run on every plan before any execution
//! work is spent. Validation is fail-fast: the first defect is reported.

use std::collections::HashSet;

use crate::error::ValidationError;

use super::reference::{is_contained, SourceRef};
use super::types::{Subtask, TaskPlan, MAX_SUBTASKS};

/// Validates task plans produced by a planner
pub struct PlanValidator;

impl PlanValidator {
    /// Check a plan's structure and cross-step references.
    pub fn validate(plan: &TaskPlan) -> Result<(), ValidationError> {
        let count = plan.subtasks.len();
        if count == 0 {
            return Err(ValidationError::Empty);
        }
        if count > MAX_SUBTASKS {
            return Err(ValidationError::TooManySubtasks {
                count,
                max: MAX_SUBTASKS,
            });
        }
        if plan.total_steps != count {
            return Err(ValidationError::StepCountMismatch {
                declared: plan.total_steps,
                actual: count,
            });
        }

        for (index, subtask) in plan.subtasks.iter().enumerate() {
            let expected = index as u32 + 1;
            if subtask.sequence != expected {
                return Err(ValidationError::SequenceMismatch {
                    index,
                    expected,
                    found: subtask.sequence,
                });
            }
        }

        for (index, subtask) in plan.subtasks.iter().enumerate() {
            Self::check_fields(index, subtask)?;
            Self::check_requirements(index, subtask)?;
            Self::check_sources(plan, index, subtask)?;
        }

        Ok(())
    }

    fn check_fields(index: usize, subtask: &Subtask) -> Result<(), ValidationError> {
        let missing = |field| Err(ValidationError::MissingField { index, field });

        if subtask.title.trim().is_empty() {
            return missing("title");
        }
        if subtask.description.trim().is_empty() {
            return missing("description");
        }
        if subtask.inputs.is_none() {
            return missing("inputs");
        }
        match &subtask.outputs {
            None => missing("outputs"),
            Some(outputs) if outputs.summary_file.trim().is_empty() => missing("summaryFile"),
            Some(outputs) if !is_contained(&outputs.summary_file) => {
                Err(ValidationError::UnsafeSummaryPath {
                    index,
                    path: outputs.summary_file.clone(),
                })
            }
            Some(_) => Ok(()),
        }
    }

    fn check_requirements(index: usize, subtask: &Subtask) -> Result<(), ValidationError> {
        let Some(requirements) = subtask
            .outputs
            .as_ref()
            .and_then(|o| o.markdown_requirements.as_deref())
        else {
            return Ok(());
        };

        let mut seen = HashSet::new();
        for (position, req) in requirements.iter().enumerate() {
            let missing = |field| ValidationError::MissingRequirementField {
                index,
                position,
                field,
            };
            if req.id.trim().is_empty() {
                return Err(missing("id"));
            }
            if req.title.trim().is_empty() {
                return Err(missing("title"));
            }
            if req.content.trim().is_empty() {
                return Err(missing("content"));
            }
            if req.required.is_none() {
                return Err(ValidationError::RequirementFlag {
                    index,
                    id: req.id.clone(),
                });
            }
            if !seen.insert(req.id.as_str()) {
                return Err(ValidationError::DuplicateRequirementId {
                    index,
                    id: req.id.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_sources(
        plan: &TaskPlan,
        index: usize,
        subtask: &Subtask,
    ) -> Result<(), ValidationError> {
        for source in subtask.sources() {
            let Some(reference) = SourceRef::parse(source) else {
                continue;
            };

            if reference.step == 0 {
                return Err(ValidationError::InvalidReference {
                    index,
                    source_ref: source.clone(),
                    referenced: reference.digits,
                });
            }
            if reference.step >= subtask.sequence {
                return Err(ValidationError::ForwardReference {
                    index,
                    source_ref: source.clone(),
                    referenced: reference.step,
                });
            }

            let Some(section) = reference.section.as_deref() else {
                continue;
            };
            // Sequences are dense at this point, so step N lives at index N-1.
            let requirements = plan
                .subtask(reference.step)
                .and_then(|s| s.outputs.as_ref())
                .and_then(|o| o.markdown_requirements.as_deref())
                .filter(|reqs| !reqs.is_empty());

            match requirements {
                None => {
                    return Err(ValidationError::NoRequirements {
                        index,
                        source_ref: source.clone(),
                        referenced: reference.step,
                    })
                }
                Some(reqs) if !reqs.iter().any(|r| r.id == section) => {
                    return Err(ValidationError::UndefinedSection {
                        index,
                        source_ref: source.clone(),
                        referenced: reference.step,
                        section: section.to_string(),
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
