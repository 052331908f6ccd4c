//! Workflow domain types and logic

// Make submodules public
pub mod errors;
pub mod expr;
pub mod job;
pub mod matrix;
pub mod steps;
pub mod triggers;
pub mod types;
pub mod workflow_def;

pub(crate) mod yaml;

// Re-export public types from submodules
pub use errors::{ValidationError, WorkflowError};
pub use job::{Job, JobBuilder, JobInstance};
pub use matrix::{Matrix, MatrixAxis, MatrixEntry, Strategy};
pub use steps::{ActionRef, RetryPolicy, Step, StepKind};
pub use triggers::{
    DispatchInput, DispatchTrigger, PullRequestTrigger, TriggerEvent, Triggers,
};
pub use types::{JobResult, StepStatus, Validate, WorkflowResult};
pub use workflow_def::{Workflow, WorkflowBuilder};
