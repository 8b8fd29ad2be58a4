// Library exports for taskloom
// Task decomposition, sequential subtask execution, merged progress streaming
// and completion detection. Planner, executor, reporter and evaluator are
// supplied by the embedding application.

pub mod capability;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod oracle;
pub mod plan;
pub mod runner;
pub mod stream;

pub use capability::{ExecutionRequest, Executor, Planner, Reporter};
pub use config::EngineConfig;
pub use engine::{IterationEngine, TaskLoop};
pub use error::EngineError;
pub use plan::{PlanValidator, TaskPlan};
pub use stream::Message;
