//! Prelude module for common imports

// Re-export macros
pub use crate::{
    job, matrix, on_dispatch, on_pull_request, run_cmd, steps, uses, workflow,
};

// Re-export all workflow types with full paths
pub use crate::workflow::errors::{ValidationError, WorkflowError};
pub use crate::workflow::job::{Job, JobBuilder, JobInstance};
pub use crate::workflow::matrix::{Matrix, MatrixAxis, MatrixEntry, Strategy};
pub use crate::workflow::steps::{ActionRef, RetryPolicy, Step, StepKind};
pub use crate::workflow::triggers::{
    DispatchInput, DispatchTrigger, PullRequestTrigger, TriggerEvent, Triggers,
};
pub use crate::workflow::types::{JobResult, StepStatus, Validate, WorkflowResult};
pub use crate::workflow::workflow_def::{Workflow, WorkflowBuilder};

// Re-export runner types
pub use crate::runner::{
    HealthStatus, LocalRunner, LocalRunnerConfig, RunContext, RunReport, RunnerCapabilities,
    WorkflowRunner,
};
