//! Workflow execution traits
//!
//! This module defines the runner interface and the per-run context shared
//! by every runner implementation.

use std::collections::HashMap;

use crate::workflow::{
    JobInstance, TriggerEvent, ValidationError, Workflow, WorkflowError, WorkflowResult, expr,
};

use super::report::RunReport;

/// Trait for executing workflows
#[allow(clippy::missing_errors_doc)]
pub trait WorkflowRunner: Send + Sync + std::fmt::Debug {
    /// Executes a workflow and returns the run report
    fn run(&self, workflow: &Workflow, context: &RunContext) -> Result<RunReport, WorkflowError>;

    /// Validates a workflow without executing it
    fn validate(&self, workflow: &Workflow) -> Result<(), ValidationError>;

    /// Walks the workflow without side effects, reporting what would run
    fn dry_run(&self, workflow: &Workflow, context: &RunContext)
    -> Result<RunReport, WorkflowError>;

    /// Returns the capabilities of this runner
    fn capabilities(&self) -> RunnerCapabilities;

    /// Performs a health check
    fn health_check(&self) -> HealthStatus;
}

/// Capabilities of a runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct RunnerCapabilities {
    /// Can execute shell commands
    pub can_execute_shell: bool,

    /// Can run job instances inside containers
    pub can_run_containers: bool,

    /// Runs matrix instances concurrently
    pub supports_parallel_matrix: bool,

    /// Enforces step timeouts
    pub supports_timeout: bool,

    /// Honors step retry policies
    pub supports_retry: bool,
}

impl Default for RunnerCapabilities {
    fn default() -> Self {
        Self {
            can_execute_shell: true,
            can_run_containers: false,
            supports_parallel_matrix: false,
            supports_timeout: true,
            supports_retry: true,
        }
    }
}

/// Health status of a runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Runner is healthy
    Healthy,

    /// Runner is degraded (some features unavailable)
    Degraded {
        /// Reason for degradation
        reason: String,
    },

    /// Runner is unhealthy
    Unhealthy {
        /// Reason for being unhealthy
        reason: String,
    },
}

impl HealthStatus {
    /// Returns true if the runner is healthy or degraded
    #[must_use]
    pub fn is_operational(&self) -> bool {
        !matches!(self, Self::Unhealthy { .. })
    }
}

/// Context for a single workflow run
#[derive(Debug, Clone)]
pub struct RunContext {
    /// The event being simulated
    pub event: TriggerEvent,

    /// Unique id of this run
    pub run_id: String,

    /// Extra environment applied to every job, including resolved
    /// dispatch inputs as `FLOWLINE_INPUT_*`
    pub env: HashMap<String, String>,

    /// Restrict execution to this job id
    pub job_filter: Option<String>,
}

impl RunContext {
    /// Creates a context for the given event with a fresh run id
    #[must_use]
    pub fn new(event: TriggerEvent) -> Self {
        Self {
            event,
            run_id: uuid::Uuid::new_v4().to_string(),
            env: HashMap::new(),
            job_filter: None,
        }
    }

    /// Checks the event against the workflow's triggers and resolves
    /// dispatch inputs.
    ///
    /// An event no declared trigger matches is an error naming the
    /// triggers the workflow does declare. For dispatch events the declared
    /// inputs are resolved (defaults applied, required inputs enforced) and
    /// exposed as `FLOWLINE_INPUT_<NAME>` variables.
    #[allow(clippy::missing_errors_doc)]
    pub fn prepare(workflow: &Workflow, event: TriggerEvent) -> WorkflowResult<Self> {
        if !workflow.on.matches(&event) {
            return Err(WorkflowError::NotTriggered {
                event: event.to_string(),
                declared: workflow.on.describe(),
            });
        }

        let mut env = HashMap::new();
        if let TriggerEvent::Dispatch { inputs } = &event
            && let Some(dispatch) = &workflow.on.dispatch
        {
            for (name, value) in dispatch.resolve_inputs(inputs)? {
                env.insert(input_var_name(&name), value);
            }
        }

        let mut context = Self::new(event);
        context.env = env;
        Ok(context)
    }

    /// Restricts the run to a single job id
    #[must_use]
    pub fn with_job_filter(mut self, job: impl Into<String>) -> Self {
        self.job_filter = Some(job.into());
        self
    }

    /// Adds an environment variable to every job of the run
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    /// Builds the environment a job instance starts with.
    ///
    /// Layering, weakest first: run identity variables, the run context's
    /// own environment (dispatch inputs included), workflow `env:`, then the
    /// job's `env:` with matrix expressions resolved.
    #[allow(clippy::missing_errors_doc)]
    pub fn instance_env(
        &self,
        workflow: &Workflow,
        instance: &JobInstance,
    ) -> WorkflowResult<HashMap<String, String>> {
        let mut env = HashMap::new();
        env.insert("CI".to_string(), "true".to_string());
        env.insert("FLOWLINE_WORKFLOW".to_string(), workflow.name.clone());
        env.insert("FLOWLINE_JOB".to_string(), instance.name.clone());
        env.insert("FLOWLINE_RUN_ID".to_string(), self.run_id.clone());
        env.insert("RUNNER_OS".to_string(), instance.runs_on.clone());

        for (key, value) in &self.env {
            env.insert(key.clone(), value.clone());
        }

        let no_matrix = HashMap::new();
        for (key, value) in &workflow.env {
            let resolved = expr::interpolate(value, &no_matrix, &env)?;
            env.insert(key.clone(), resolved);
        }

        let matrix = instance.matrix.context();
        for (key, value) in &instance.job.env {
            let resolved = expr::interpolate(value, &matrix, &env)?;
            env.insert(key.clone(), resolved);
        }

        Ok(env)
    }
}

/// Maps a dispatch input name onto its environment variable
fn input_var_name(name: &str) -> String {
    let upper: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("FLOWLINE_INPUT_{upper}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{DispatchInput, Job, Step};

    fn dispatch_workflow() -> Workflow {
        let mut workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "test",
                Job::new("linux").with_step(Step::run_command("ls")),
            )
            .build()
            .unwrap();
        if let Some(dispatch) = workflow.on.dispatch.as_mut() {
            dispatch.inputs.insert(
                "log-level".to_string(),
                DispatchInput {
                    description: None,
                    default: Some("info".to_string()),
                    required: false,
                },
            );
        }
        workflow
    }

    #[test]
    fn test_prepare_rejects_unmatched_event() {
        let workflow = dispatch_workflow();
        let result = RunContext::prepare(&workflow, TriggerEvent::pull_request("main"));
        assert!(matches!(
            result,
            Err(WorkflowError::NotTriggered { declared, .. }) if declared == "dispatch"
        ));
    }

    #[test]
    fn test_prepare_resolves_inputs() {
        let workflow = dispatch_workflow();
        let context = RunContext::prepare(&workflow, TriggerEvent::dispatch()).unwrap();
        assert_eq!(
            context.env.get("FLOWLINE_INPUT_LOG_LEVEL").map(String::as_str),
            Some("info")
        );
        assert!(!context.run_id.is_empty());
    }

    #[test]
    fn test_prepare_overrides_input_defaults() {
        let workflow = dispatch_workflow();
        let mut inputs = HashMap::new();
        inputs.insert("log-level".to_string(), "debug".to_string());
        let context =
            RunContext::prepare(&workflow, TriggerEvent::dispatch_with_inputs(inputs)).unwrap();
        assert_eq!(
            context.env.get("FLOWLINE_INPUT_LOG_LEVEL").map(String::as_str),
            Some("debug")
        );
    }

    #[test]
    fn test_input_var_name() {
        assert_eq!(input_var_name("suite"), "FLOWLINE_INPUT_SUITE");
        assert_eq!(input_var_name("log-level"), "FLOWLINE_INPUT_LOG_LEVEL");
    }

    #[test]
    fn test_instance_env_layering() {
        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .env("LEVEL", "workflow")
            .env("KEEP", "yes")
            .job(
                "test",
                Job::new("linux")
                    .with_env("LEVEL", "job")
                    .with_step(Step::run_command("ls")),
            )
            .build()
            .unwrap();

        let context = RunContext::prepare(&workflow, TriggerEvent::dispatch()).unwrap();
        let instance = workflow.expand_jobs().unwrap().remove(0);
        let env = context.instance_env(&workflow, &instance).unwrap();

        assert_eq!(env.get("LEVEL").map(String::as_str), Some("job"));
        assert_eq!(env.get("KEEP").map(String::as_str), Some("yes"));
        assert_eq!(env.get("CI").map(String::as_str), Some("true"));
        assert_eq!(env.get("FLOWLINE_WORKFLOW").map(String::as_str), Some("ci"));
        assert_eq!(env.get("RUNNER_OS").map(String::as_str), Some("linux"));
    }

    #[test]
    fn test_capabilities_default() {
        let caps = RunnerCapabilities::default();
        assert!(caps.can_execute_shell);
        assert!(!caps.can_run_containers);
        assert!(!caps.supports_parallel_matrix);
    }

    #[test]
    fn test_health_status_operational() {
        assert!(HealthStatus::Healthy.is_operational());
        assert!(
            HealthStatus::Degraded {
                reason: "no container runtime".to_string()
            }
            .is_operational()
        );
        assert!(
            !HealthStatus::Unhealthy {
                reason: "no shell".to_string()
            }
            .is_operational()
        );
    }
}
