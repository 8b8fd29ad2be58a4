//! Task Plans
//!
//! The subtask plan data model and the validator that guards execution
//! against malformed plans.

pub mod reference;
pub mod types;
pub mod validator;

pub use reference::{is_contained, SourceRef};
pub use types::*;
pub use validator::PlanValidator;
