//! # Flowline - a CI workflow runner in Rust
//!
//! Flowline defines, validates and executes CI workflow files on the
//! machine you are sitting at, using the same YAML schema a hosted CI
//! service would read: triggers, jobs with dependencies, matrix
//! expansion, and reusable action steps.
//!
//! ## Quick Start
//!
//! ```no_run
//! use flowline::workflow::{TriggerEvent, Workflow};
//! use flowline::runner::{LocalRunner, RunContext, WorkflowRunner};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let workflow = Workflow::load("ci.yml")?;
//! let context = RunContext::prepare(&workflow, TriggerEvent::dispatch())?;
//! let report = LocalRunner::new().run(&workflow, &context)?;
//! println!("{}", report.render_text());
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **One schema**: Parse, validate and serialize GitHub-Actions-flavored
//!   workflow YAML with structured errors
//! - **Matrix expansion**: Cartesian axes with `exclude`/`include`, fail-fast
//!   and `max-parallel` scheduling
//! - **Multiple runners**: Local processes, Docker CLI, Podman REST API
//! - **Exporters**: Translate workflows to GitHub Actions and GitLab CI
//! - **Observability**: Structured tracing and per-run metrics
//!
//! ## Documentation
//!
//! - [Full Documentation](https://docs.rs/flowline)
//! - [GitHub Repository](https://github.com/flowline-dev/flowline)
//!
//! ## License
//!
//! Licensed under either of
//! - Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <https://www.apache.org/licenses/LICENSE-2.0>)
//! - MIT license ([LICENSE-MIT](LICENSE-MIT) or <https://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod macros;

pub mod infrastructure;
pub mod runner;
pub mod workflow;

// Prelude module for common imports
pub mod prelude;

// Re-export commonly used types
pub use infrastructure::{
    Config, GitHubActionsBackend, GitLabCIBackend, MetricsCollector, RunMetrics, init_logging,
};
pub use runner::{
    ContainerRunner, DockerRunner, HealthStatus, JobReport, LocalRunner, LocalRunnerConfig,
    PodmanError, PodmanRunner, RunContext, RunReport, RunnerCapabilities, ShellCommand,
    ShellConfig, ShellResult, StepReport, WorkflowRunner,
};
pub use workflow::{
    ActionRef, DispatchTrigger, Job, JobBuilder, JobInstance, Matrix, MatrixEntry,
    PullRequestTrigger, RetryPolicy, Step, StepKind, Strategy, TriggerEvent, Triggers, Validate,
    ValidationError, Workflow, WorkflowBuilder, WorkflowError,
};

/// Version of the flowline crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
