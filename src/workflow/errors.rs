//! Error types for the workflow domain

use thiserror::Error;

/// Errors that can occur while parsing or running workflows
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// Validation failed with specified reason
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The workflow file could not be parsed
    #[error("Failed to parse workflow: {0}")]
    Parse(String),

    /// Job execution failed
    #[error("Job '{job}' failed: {error}")]
    JobFailed {
        /// Name of the job instance that failed.
        job: String,
        /// Error message describing the failure.
        error: String,
    },

    /// Command execution failed
    #[error("Command failed with exit code {code}: {stderr}")]
    CommandFailed {
        /// Exit code returned by the command.
        code: i32,
        /// Standard error output from the command.
        stderr: String,
    },

    /// Timeout exceeded
    #[error("Timeout after {duration:?}")]
    Timeout {
        /// Duration before timeout.
        duration: std::time::Duration,
    },

    /// A step references an action the registry does not know
    #[error("Unknown action '{action}'")]
    UnknownAction {
        /// The unresolved action reference.
        action: String,
    },

    /// An expression references a matrix key the job does not declare
    #[error("Expression references unknown matrix key '{key}'")]
    UnknownMatrixKey {
        /// The unresolved matrix key.
        key: String,
    },

    /// A required dispatch input was not provided
    #[error("Required input '{name}' was not provided")]
    MissingInput {
        /// Name of the missing input.
        name: String,
    },

    /// The requested interpreter version is not available
    #[error("Interpreter version '{version}' is not available")]
    InterpreterNotFound {
        /// The requested version.
        version: String,
    },

    /// The event does not match any declared trigger
    #[error("Event '{event}' does not match the declared triggers: {declared}")]
    NotTriggered {
        /// The event that was offered.
        event: String,
        /// Human-readable list of declared triggers.
        declared: String,
    },

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(String),

    /// Runner configuration error
    #[error("Runner configuration error: {0}")]
    RunnerConfig(String),
}

impl From<std::io::Error> for WorkflowError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Validation errors for workflow components
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Name cannot be empty
    #[error("Name cannot be empty")]
    EmptyName,

    /// Name too long
    #[error("Name too long: max {max} characters, got {len}")]
    NameTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length of the name.
        len: usize,
    },

    /// Workflow must have at least one job
    #[error("Workflow must have at least one job")]
    EmptyWorkflow,

    /// A workflow without triggers can never run
    #[error("Workflow declares no triggers")]
    NoTriggers,

    /// Job must have at least one step
    #[error("Job '{job}' must have at least one step")]
    EmptyJob {
        /// Id of the empty job.
        job: String,
    },

    /// Job is missing the runs-on label
    #[error("Job '{job}' is missing 'runs-on'")]
    MissingRunsOn {
        /// Id of the offending job.
        job: String,
    },

    /// Step must be exactly one of uses / run
    #[error("Step {index} in job '{job}' must set exactly one of 'uses' or 'run'")]
    StepShape {
        /// Id of the offending job.
        job: String,
        /// Zero-based step index.
        index: usize,
    },

    /// Action reference could not be parsed
    #[error("Step {index} in job '{job}' has a malformed action reference '{reference}'")]
    BadActionRef {
        /// Id of the offending job.
        job: String,
        /// Zero-based step index.
        index: usize,
        /// The malformed reference.
        reference: String,
    },

    /// Matrix declared without any axes
    #[error("Matrix in job '{job}' declares no axes")]
    EmptyMatrix {
        /// Id of the offending job.
        job: String,
    },

    /// Matrix axis has an empty value list
    #[error("Matrix axis '{axis}' in job '{job}' has no values")]
    EmptyMatrixAxis {
        /// Id of the offending job.
        job: String,
        /// Name of the empty axis.
        axis: String,
    },

    /// Exclude entry references an axis the matrix does not declare
    #[error("Matrix exclude in job '{job}' references unknown axis '{key}'")]
    UnknownExcludeKey {
        /// Id of the offending job.
        job: String,
        /// The unknown axis name.
        key: String,
    },

    /// Job depends on a job that does not exist
    #[error("Job '{job}' needs unknown job '{needs}'")]
    UnknownDependency {
        /// Id of the dependent job.
        job: String,
        /// The missing dependency id.
        needs: String,
    },

    /// Jobs form a dependency cycle
    #[error("Dependency cycle involving job '{job}'")]
    DependencyCycle {
        /// A job on the cycle.
        job: String,
    },

    /// Invalid timeout value
    #[error("Invalid timeout in job '{job}': must be positive")]
    InvalidTimeout {
        /// Id of the offending job.
        job: String,
    },

    /// Invalid retry policy
    #[error("Invalid retry policy in step {index} of job '{job}': attempts must be at least 1")]
    InvalidRetry {
        /// Id of the offending job.
        job: String,
        /// Zero-based step index.
        index: usize,
    },
}
