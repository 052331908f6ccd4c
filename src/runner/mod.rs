//! Workflow execution layer
//!
//! This module contains traits and implementations for running workflows.

mod actions;
mod container;
mod local;
mod podman;
mod report;
mod shell;
mod traits;
mod workspace;

pub use actions::{Action, ActionContext, ActionRegistry};
pub use container::{ContainerRunner, ContainerRuntime, DockerRunner};
pub use local::{LocalRunner, LocalRunnerConfig};
pub use podman::{PodmanError, PodmanRunner};
pub use report::{JobReport, RunReport, StepReport, format_duration, tail};
pub use shell::{ShellCommand, ShellConfig, ShellResult};
pub use traits::{HealthStatus, RunContext, RunnerCapabilities, WorkflowRunner};
pub use workspace::RunWorkspace;
