use super::actions::{ActionContext, ActionRegistry};
use super::report::{JobReport, RunReport, StepReport, tail};
use super::shell::{ShellCommand, ShellConfig};
use super::traits::{HealthStatus, RunContext, RunnerCapabilities, WorkflowRunner};
use super::workspace::RunWorkspace;
use crate::workflow::{
    JobInstance, JobResult, Step, StepKind, StepStatus, Validate, Workflow, WorkflowError, expr,
};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Runner that executes job instances on the host system
#[derive(Clone)]
pub struct LocalRunner {
    /// Configuration for the runner
    config: LocalRunnerConfig,

    /// Actions available to `uses:` steps
    registry: ActionRegistry,
}

/// Configuration for the local runner
#[derive(Debug, Clone)]
pub struct LocalRunnerConfig {
    /// Directory under which run workspaces are created
    pub workspace_root: PathBuf,

    /// Project source directory handed to `actions/checkout`
    pub source_dir: PathBuf,

    /// Shell to use (default: sh)
    pub shell: String,

    /// Interpreter version table for `actions/setup-python`
    pub interpreters: HashMap<String, String>,

    /// Leave run workspaces on disk after the run
    pub keep_workspace: bool,

    /// Number of output lines kept per step in the report
    pub tail_lines: usize,

    /// Cap on concurrent matrix instances when the strategy sets none
    pub max_parallel: usize,

    /// Echo command output while capturing it
    pub streaming: bool,
}

impl Default for LocalRunnerConfig {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir().join("flowline"),
            source_dir: std::env::current_dir().unwrap_or_default(),
            shell: "sh".to_string(),
            interpreters: HashMap::new(),
            keep_workspace: false,
            tail_lines: 20,
            max_parallel: 4,
            streaming: false,
        }
    }
}

impl LocalRunner {
    /// Creates a new local runner with the built-in actions
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: LocalRunnerConfig::default(),
            registry: ActionRegistry::builtin(),
        }
    }

    /// Creates a local runner from an explicit configuration
    #[must_use]
    pub fn with_config(config: LocalRunnerConfig) -> Self {
        Self {
            config,
            registry: ActionRegistry::builtin(),
        }
    }

    /// Sets the directory under which run workspaces are created
    #[must_use]
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.workspace_root = root.into();
        self
    }

    /// Sets the project source directory
    #[must_use]
    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.source_dir = dir.into();
        self
    }

    /// Sets the shell to use
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.config.shell = shell.into();
        self
    }

    /// Adds an interpreter version to the table
    #[must_use]
    pub fn with_interpreter(mut self, version: impl Into<String>, path: impl Into<String>) -> Self {
        self.config.interpreters.insert(version.into(), path.into());
        self
    }

    /// Keeps run workspaces on disk after the run
    #[must_use]
    pub fn with_keep_workspace(mut self) -> Self {
        self.config.keep_workspace = true;
        self
    }

    /// Echoes command output while capturing it
    #[must_use]
    pub fn with_streaming(mut self) -> Self {
        self.config.streaming = true;
        self
    }

    /// Sets the default cap on concurrent matrix instances
    #[must_use]
    pub fn with_max_parallel(mut self, limit: usize) -> Self {
        self.config.max_parallel = limit.max(1);
        self
    }

    /// Replaces the action registry
    #[must_use]
    pub fn with_registry(mut self, registry: ActionRegistry) -> Self {
        self.registry = registry;
        self
    }
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LocalRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRunner")
            .field("config", &self.config)
            .field("actions", &self.registry.slugs())
            .finish()
    }
}

impl WorkflowRunner for LocalRunner {
    fn run(&self, workflow: &Workflow, context: &RunContext) -> Result<RunReport, WorkflowError> {
        workflow.validate().map_err(WorkflowError::Validation)?;
        let order = workflow
            .execution_order()
            .map_err(WorkflowError::Validation)?;

        tracing::info!(
            workflow = %workflow.name,
            run_id = %context.run_id,
            event = %context.event,
            jobs_count = order.len(),
            "Starting workflow run"
        );

        let workspace = Arc::new(RunWorkspace::create(
            &self.config.workspace_root,
            &context.run_id,
            self.config.keep_workspace,
        )?);

        let started = Instant::now();
        let mut report = RunReport::new(&workflow.name, &context.run_id, context.event.to_string());
        let mut outcomes: HashMap<String, JobResult> = HashMap::new();

        for job_id in &order {
            let Some(job) = workflow.job(job_id) else {
                continue;
            };

            if let Some(filter) = &context.job_filter
                && filter != job_id
            {
                tracing::debug!(job = %job_id, "Skipping job not matching filter");
                continue;
            }

            let display = job.name.clone().unwrap_or_else(|| job_id.clone());

            if let Some(need) = job
                .needs
                .iter()
                .find(|need| outcomes.get(need.as_str()).is_some_and(|r| !r.is_success()))
            {
                tracing::warn!(job = %job_id, needs = %need, "Skipping job, dependency did not succeed");
                report.push_job(JobReport::unstarted(
                    job_id,
                    &display,
                    &job.runs_on,
                    JobResult::Skipped,
                ));
                outcomes.insert(job_id.clone(), JobResult::Skipped);
                continue;
            }

            let instances = job.instances(job_id)?;
            if instances.is_empty() {
                tracing::info!(job = %job_id, "Matrix excluded every instance, skipping job");
                report.push_job(JobReport::unstarted(
                    job_id,
                    &display,
                    &job.runs_on,
                    JobResult::Skipped,
                ));
                outcomes.insert(job_id.clone(), JobResult::Skipped);
                continue;
            }

            let limit = job.max_parallel().unwrap_or(self.config.max_parallel).max(1);
            let outcome = self.run_job_instances(
                workflow,
                instances,
                context,
                &workspace,
                limit,
                job.fail_fast(),
                &mut report,
            )?;
            outcomes.insert(job_id.clone(), outcome);
        }

        report.duration = started.elapsed();
        if self.config.keep_workspace {
            tracing::info!(path = %workspace.root().display(), "Keeping run workspace");
        }
        tracing::info!(
            workflow = %workflow.name,
            conclusion = %report.conclusion,
            duration_ms = report.duration.as_millis(),
            "Workflow run finished"
        );

        Ok(report)
    }

    fn validate(&self, workflow: &Workflow) -> Result<(), crate::workflow::ValidationError> {
        workflow.validate()
    }

    fn dry_run(
        &self,
        workflow: &Workflow,
        context: &RunContext,
    ) -> Result<RunReport, WorkflowError> {
        workflow.validate().map_err(WorkflowError::Validation)?;

        tracing::info!(workflow = %workflow.name, "Starting dry run");

        let started = Instant::now();
        let mut report = RunReport::new(&workflow.name, &context.run_id, context.event.to_string());

        for instance in workflow.expand_jobs()? {
            if let Some(filter) = &context.job_filter
                && filter != &instance.job_id
            {
                continue;
            }

            tracing::info!(
                job = %instance.name,
                runs_on = %instance.runs_on,
                steps_count = instance.job.steps.len(),
                "Would run job"
            );
            let mut steps = Vec::new();
            for step in &instance.job.steps {
                tracing::debug!(step = %step.display_name(), "Would run step");
                steps.push(StepReport::skipped(step.display_name()));
            }

            report.push_job(JobReport {
                job_id: instance.job_id.clone(),
                name: instance.name.clone(),
                runs_on: instance.runs_on.clone(),
                result: JobResult::Success,
                duration: Duration::ZERO,
                steps,
            });
        }

        report.duration = started.elapsed();
        Ok(report)
    }

    fn capabilities(&self) -> RunnerCapabilities {
        RunnerCapabilities {
            can_execute_shell: true,
            can_run_containers: false,
            supports_parallel_matrix: true,
            supports_timeout: true,
            supports_retry: true,
        }
    }

    fn health_check(&self) -> HealthStatus {
        let shell = if self.config.shell.is_empty() {
            "sh"
        } else {
            &self.config.shell
        };

        let result = Command::new(shell).arg("-c").arg("echo test").output();

        match result {
            Ok(output) if output.status.success() => HealthStatus::Healthy,
            Ok(_) => HealthStatus::Unhealthy {
                reason: "Shell command returned non-zero exit code".to_string(),
            },
            Err(e) => HealthStatus::Unhealthy {
                reason: format!("Shell not available: {e}"),
            },
        }
    }
}

impl LocalRunner {
    /// Runs the instances of one job, in waves capped by `limit`
    #[allow(clippy::too_many_arguments)]
    fn run_job_instances(
        &self,
        workflow: &Workflow,
        instances: Vec<JobInstance>,
        context: &RunContext,
        workspace: &Arc<RunWorkspace>,
        limit: usize,
        fail_fast: bool,
        report: &mut RunReport,
    ) -> Result<JobResult, WorkflowError> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut outcome = JobResult::Success;
        let mut index = 0;

        while index < instances.len() {
            if cancelled.load(Ordering::SeqCst) {
                for instance in &instances[index..] {
                    tracing::warn!(job = %instance.name, "Cancelling instance, fail-fast triggered");
                    outcome = outcome.worst(JobResult::Cancelled);
                    report.push_job(JobReport::unstarted(
                        &instance.job_id,
                        &instance.name,
                        &instance.runs_on,
                        JobResult::Cancelled,
                    ));
                }
                break;
            }

            let end = (index + limit).min(instances.len());
            let mut prepared = Vec::with_capacity(end - index);
            for instance in &instances[index..end] {
                let env = context.instance_env(workflow, instance)?;
                prepared.push((instance.clone(), env));
            }

            let results = Arc::new(Mutex::new(Vec::new()));
            let handles: Vec<_> = prepared
                .into_iter()
                .enumerate()
                .map(|(offset, (instance, env))| {
                    let runner = self.clone();
                    let results = Arc::clone(&results);
                    let cancelled = Arc::clone(&cancelled);
                    let workspace = Arc::clone(workspace);

                    thread::spawn(move || {
                        let job_report =
                            runner.run_instance(&instance, &workspace, env, &cancelled, fail_fast);
                        let mut guard = results.lock().unwrap();
                        guard.push((offset, job_report));
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            let mut collected = results.lock().unwrap();
            collected.sort_by_key(|(offset, _)| *offset);
            for (_, job_report) in collected.drain(..) {
                outcome = outcome.worst(job_report.result);
                report.push_job(job_report);
            }
            drop(collected);

            index = end;
        }

        Ok(outcome)
    }

    /// Runs a single job instance, step by step
    fn run_instance(
        &self,
        instance: &JobInstance,
        workspace: &RunWorkspace,
        mut env: HashMap<String, String>,
        cancelled: &AtomicBool,
        fail_fast: bool,
    ) -> JobReport {
        let started = Instant::now();
        tracing::info!(job = %instance.name, runs_on = %instance.runs_on, "Starting job");

        let job_dir = match workspace.job_dir(&instance.name) {
            Ok(dir) => dir,
            Err(error) => {
                tracing::error!(job = %instance.name, error = %error, "Could not create job workspace");
                let steps = instance
                    .job
                    .steps
                    .iter()
                    .map(|step| StepReport::skipped(step.display_name()))
                    .collect();
                return JobReport {
                    job_id: instance.job_id.clone(),
                    name: instance.name.clone(),
                    runs_on: instance.runs_on.clone(),
                    result: JobResult::Failure,
                    duration: started.elapsed(),
                    steps,
                };
            }
        };
        env.insert("WORKSPACE".to_string(), job_dir.display().to_string());

        let deadline = instance
            .job
            .timeout_minutes
            .map(|minutes| started + Duration::from_secs(minutes.saturating_mul(60)));

        let mut steps = Vec::with_capacity(instance.job.steps.len());
        let mut failed = false;
        let mut was_cancelled = false;
        let mut timed_out = false;

        for (index, step) in instance.job.steps.iter().enumerate() {
            if !failed && !was_cancelled && !timed_out {
                if cancelled.load(Ordering::SeqCst) {
                    was_cancelled = true;
                    tracing::warn!(job = %instance.name, "Cancelling job, another instance failed");
                } else if let Some(limit) = deadline
                    && Instant::now() >= limit
                {
                    timed_out = true;
                    tracing::warn!(
                        job = %instance.name,
                        timeout_minutes = instance.job.timeout_minutes,
                        "Job deadline reached"
                    );
                }
            }

            if failed || was_cancelled || timed_out {
                steps.push(StepReport::skipped(step.display_name()));
                continue;
            }

            let step_report = self.run_step(step, index, instance, &job_dir, &mut env, workspace);
            if step_report.status.is_failure() && !step.continue_on_error {
                failed = true;
            }
            steps.push(step_report);
        }

        let result = if was_cancelled {
            JobResult::Cancelled
        } else if failed || timed_out {
            JobResult::Failure
        } else {
            JobResult::Success
        };

        if result.is_failure() && fail_fast {
            cancelled.store(true, Ordering::SeqCst);
        }

        let duration = started.elapsed();
        tracing::info!(
            job = %instance.name,
            result = %result,
            duration_ms = duration.as_millis(),
            "Job finished"
        );

        JobReport {
            job_id: instance.job_id.clone(),
            name: instance.name.clone(),
            runs_on: instance.runs_on.clone(),
            result,
            duration,
            steps,
        }
    }

    /// Runs one step, honoring its retry policy
    fn run_step(
        &self,
        step: &Step,
        index: usize,
        instance: &JobInstance,
        job_dir: &Path,
        env: &mut HashMap<String, String>,
        workspace: &RunWorkspace,
    ) -> StepReport {
        let name = step.display_name();
        let matrix = instance.matrix.context();
        let started = Instant::now();
        tracing::info!(job = %instance.name, step = %name, "Running step");

        let planned = step.retry.as_ref().map_or(1, |retry| retry.attempts.max(1));
        let mut attempt = 0;
        let mut execution;

        loop {
            attempt += 1;
            execution = self.run_step_once(step, job_dir, env, &matrix);
            if execution.status.is_success() || attempt >= planned {
                break;
            }
            let delay = step
                .retry
                .as_ref()
                .map_or(Duration::ZERO, |retry| retry.delay_for(attempt));
            tracing::warn!(
                job = %instance.name,
                step = %name,
                attempt,
                planned,
                "Step failed, retrying"
            );
            thread::sleep(delay);
        }

        if let Err(error) = workspace.write_step_log(&instance.name, index, &name, &execution.output)
        {
            tracing::warn!(step = %name, error = %error, "Could not write step log");
        }

        let duration = started.elapsed();
        tracing::info!(
            job = %instance.name,
            step = %name,
            status = %execution.status,
            duration_ms = duration.as_millis(),
            "Step finished"
        );

        StepReport {
            name,
            status: execution.status,
            duration,
            exit_code: execution.exit_code,
            output_tail: tail(&execution.output, self.config.tail_lines),
            error: execution.error,
            attempts: attempt,
        }
    }

    /// Runs a single attempt of a step
    fn run_step_once(
        &self,
        step: &Step,
        job_dir: &Path,
        env: &mut HashMap<String, String>,
        matrix: &HashMap<String, String>,
    ) -> StepExecution {
        match step.kind() {
            Some(StepKind::Run(command)) => {
                self.run_command_step(step, command, job_dir, env, matrix)
            }
            Some(StepKind::Uses(reference)) => {
                self.run_action_step(step, reference, job_dir, env, matrix)
            }
            None => StepExecution::failure("step must set exactly one of 'uses' or 'run'"),
        }
    }

    /// Runs a `run:` step through the shell
    fn run_command_step(
        &self,
        step: &Step,
        command: &str,
        job_dir: &Path,
        env: &HashMap<String, String>,
        matrix: &HashMap<String, String>,
    ) -> StepExecution {
        let resolved = match expr::interpolate(command, matrix, env) {
            Ok(resolved) => resolved,
            Err(error) => return StepExecution::failure(error.to_string()),
        };

        let mut step_env = env.clone();
        for (key, value) in &step.env {
            match expr::interpolate(value, matrix, env) {
                Ok(resolved) => {
                    step_env.insert(key.clone(), resolved);
                }
                Err(error) => return StepExecution::failure(error.to_string()),
            }
        }

        let cwd = match &step.working_directory {
            Some(dir) => job_dir.join(dir),
            None => job_dir.to_path_buf(),
        };

        let shell_config = ShellConfig {
            cwd,
            env: step_env,
            shell: step
                .shell
                .clone()
                .unwrap_or_else(|| self.config.shell.clone()),
            streaming: self.config.streaming,
            timeout: step
                .timeout_minutes
                .map(|minutes| Duration::from_secs(minutes.saturating_mul(60))),
        };

        let shell_command = ShellCommand::new(&shell_config);
        match shell_command.execute(&resolved) {
            Ok(result) => {
                let error = if result.timed_out {
                    Some(format!(
                        "timed out after {}",
                        super::report::format_duration(result.duration)
                    ))
                } else if result.is_success() {
                    None
                } else {
                    Some(format!("exit code {}", result.exit_code))
                };

                StepExecution {
                    status: if result.is_success() {
                        StepStatus::Success
                    } else {
                        StepStatus::Failure
                    },
                    exit_code: if result.timed_out {
                        None
                    } else {
                        Some(result.exit_code)
                    },
                    output: result.combined_output(),
                    error,
                }
            }
            Err(error) => StepExecution::failure(error.to_string()),
        }
    }

    /// Runs a `uses:` step through the action registry
    fn run_action_step(
        &self,
        step: &Step,
        reference: &str,
        job_dir: &Path,
        env: &mut HashMap<String, String>,
        matrix: &HashMap<String, String>,
    ) -> StepExecution {
        let action_ref = match reference.parse::<crate::workflow::ActionRef>() {
            Ok(parsed) => parsed,
            Err(error) => return StepExecution::failure(error.to_string()),
        };

        let Some(action) = self.registry.get(&action_ref.slug) else {
            let error = WorkflowError::UnknownAction {
                action: action_ref.slug.clone(),
            };
            return StepExecution::failure(error.to_string());
        };

        if let Some(version) = &action_ref.version {
            tracing::debug!(action = %action_ref.slug, version = %version, "Running built-in action");
        }

        let mut seeded = env.clone();
        for (key, value) in &step.env {
            match expr::interpolate(value, matrix, env) {
                Ok(resolved) => {
                    seeded.insert(key.clone(), resolved);
                }
                Err(error) => return StepExecution::failure(error.to_string()),
            }
        }

        let mut context = ActionContext::new(job_dir);
        context.env = seeded.clone();
        context.set_source_dir(&self.config.source_dir);
        context.set_interpreters(self.config.interpreters.clone());
        for (key, value) in &step.with {
            match expr::interpolate(value, matrix, env) {
                Ok(resolved) => context.set_input(key.clone(), resolved),
                Err(error) => return StepExecution::failure(error.to_string()),
            }
        }

        match action.run(&mut context) {
            Ok(()) => {
                // Persist only what the action itself exported
                for (key, value) in context.env {
                    if seeded.get(&key) != Some(&value) {
                        env.insert(key, value);
                    }
                }
                StepExecution {
                    status: StepStatus::Success,
                    exit_code: None,
                    output: String::new(),
                    error: None,
                }
            }
            Err(error) => StepExecution::failure(error.to_string()),
        }
    }
}

/// Outcome of a single step attempt
struct StepExecution {
    status: StepStatus,
    exit_code: Option<i32>,
    output: String,
    error: Option<String>,
}

impl StepExecution {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Failure,
            exit_code: None,
            output: String::new(),
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{JobBuilder, Matrix, RetryPolicy, TriggerEvent};
    use std::fs;
    use tempfile::TempDir;

    fn dispatch_context(workflow: &Workflow) -> RunContext {
        RunContext::prepare(workflow, TriggerEvent::dispatch()).unwrap()
    }

    #[test]
    fn test_local_runner_creation() {
        let runner = LocalRunner::new();
        let caps = runner.capabilities();

        assert!(caps.can_execute_shell);
        assert!(!caps.can_run_containers);
        assert!(caps.supports_parallel_matrix);
        assert!(caps.supports_retry);
    }

    #[test]
    fn test_local_runner_health() {
        let runner = LocalRunner::new();
        let health = runner.health_check();

        assert!(health.is_operational());
    }

    #[test]
    fn test_run_single_job() {
        let base = TempDir::new().unwrap();
        let runner = LocalRunner::new().with_workspace_root(base.path());

        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "hello",
                JobBuilder::new("ubuntu-22.04")
                    .step(Step::run_command("echo hello"))
                    .build_unchecked(),
            )
            .build_unchecked();

        let context = dispatch_context(&workflow);
        let report = runner.run(&workflow, &context).unwrap();

        assert_eq!(report.workflow, "ci");
        assert_eq!(report.conclusion, JobResult::Success);
        assert_eq!(report.jobs.len(), 1);
        assert_eq!(report.jobs[0].job_id, "hello");
        assert_eq!(report.jobs[0].steps.len(), 1);
        assert_eq!(report.jobs[0].steps[0].status, StepStatus::Success);
        assert_eq!(report.jobs[0].steps[0].exit_code, Some(0));
        assert_eq!(report.jobs[0].steps[0].attempts, 1);
        assert!(report.is_success());
    }

    #[test]
    fn test_failing_step_halts_and_skips_the_rest() {
        let base = TempDir::new().unwrap();
        let runner = LocalRunner::new().with_workspace_root(base.path());

        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "build",
                JobBuilder::new("ubuntu-22.04")
                    .step(Step::run_command("echo ok"))
                    .step(Step::run_command("exit 1"))
                    .step(Step::run_command("echo never"))
                    .build_unchecked(),
            )
            .build_unchecked();

        let context = dispatch_context(&workflow);
        let report = runner.run(&workflow, &context).unwrap();

        assert_eq!(report.conclusion, JobResult::Failure);
        assert!(!report.is_success());

        let steps = &report.jobs[0].steps;
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].status, StepStatus::Success);
        assert_eq!(steps[1].status, StepStatus::Failure);
        assert_eq!(steps[1].exit_code, Some(1));
        assert_eq!(steps[2].status, StepStatus::Skipped);
    }

    #[test]
    fn test_continue_on_error_keeps_going() {
        let base = TempDir::new().unwrap();
        let runner = LocalRunner::new().with_workspace_root(base.path());

        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "build",
                JobBuilder::new("ubuntu-22.04")
                    .step(Step::run_command("exit 1").with_continue_on_error())
                    .step(Step::run_command("echo still here"))
                    .build_unchecked(),
            )
            .build_unchecked();

        let context = dispatch_context(&workflow);
        let report = runner.run(&workflow, &context).unwrap();

        assert_eq!(report.conclusion, JobResult::Success);
        let steps = &report.jobs[0].steps;
        assert_eq!(steps[0].status, StepStatus::Failure);
        assert_eq!(steps[1].status, StepStatus::Success);
    }

    #[test]
    fn test_dependency_failure_skips_transitively() {
        let base = TempDir::new().unwrap();
        let runner = LocalRunner::new().with_workspace_root(base.path());

        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "build",
                JobBuilder::new("u")
                    .step(Step::run_command("exit 1"))
                    .build_unchecked(),
            )
            .job(
                "test",
                JobBuilder::new("u")
                    .needs("build")
                    .step(Step::run_command("echo test"))
                    .build_unchecked(),
            )
            .job(
                "deploy",
                JobBuilder::new("u")
                    .needs("test")
                    .step(Step::run_command("echo deploy"))
                    .build_unchecked(),
            )
            .build_unchecked();

        let context = dispatch_context(&workflow);
        let report = runner.run(&workflow, &context).unwrap();

        assert_eq!(report.conclusion, JobResult::Failure);
        assert_eq!(report.jobs.len(), 3);
        assert_eq!(report.jobs[0].result, JobResult::Failure);
        assert_eq!(report.jobs[1].result, JobResult::Skipped);
        assert_eq!(report.jobs[2].result, JobResult::Skipped);
        assert!(report.jobs[1].steps.is_empty());
    }

    #[test]
    fn test_matrix_instances_each_get_their_context() {
        let base = TempDir::new().unwrap();
        let runner = LocalRunner::new().with_workspace_root(base.path());

        let matrix = Matrix::new().add_axis("val", vec!["one".to_string(), "two".to_string()]);
        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "probe",
                JobBuilder::new("u")
                    .matrix(matrix)
                    .step(Step::run_command(r#"test -n "${{ matrix.val }}""#))
                    .build_unchecked(),
            )
            .build_unchecked();

        let context = dispatch_context(&workflow);
        let report = runner.run(&workflow, &context).unwrap();

        assert_eq!(report.conclusion, JobResult::Success);
        assert_eq!(report.jobs.len(), 2);
        assert_eq!(report.jobs[0].name, "probe (one)");
        assert_eq!(report.jobs[1].name, "probe (two)");
    }

    #[test]
    fn test_fail_fast_cancels_remaining_instances() {
        let base = TempDir::new().unwrap();
        let runner = LocalRunner::new().with_workspace_root(base.path());

        let matrix = Matrix::new().add_axis("v", vec!["bad".to_string(), "good".to_string()]);
        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "check",
                JobBuilder::new("u")
                    .matrix(matrix)
                    .max_parallel(1)
                    .step(Step::run_command(r#"test "${{ matrix.v }}" = "good""#))
                    .build_unchecked(),
            )
            .build_unchecked();

        let context = dispatch_context(&workflow);
        let report = runner.run(&workflow, &context).unwrap();

        assert_eq!(report.conclusion, JobResult::Failure);
        assert_eq!(report.jobs.len(), 2);
        assert_eq!(report.jobs[0].result, JobResult::Failure);
        assert_eq!(report.jobs[1].result, JobResult::Cancelled);
        assert!(report.jobs[1].steps.is_empty());
    }

    #[test]
    fn test_no_fail_fast_runs_every_instance() {
        let base = TempDir::new().unwrap();
        let runner = LocalRunner::new().with_workspace_root(base.path());

        let matrix = Matrix::new().add_axis("v", vec!["bad".to_string(), "good".to_string()]);
        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "check",
                JobBuilder::new("u")
                    .matrix(matrix)
                    .no_fail_fast()
                    .max_parallel(1)
                    .step(Step::run_command(r#"test "${{ matrix.v }}" = "good""#))
                    .build_unchecked(),
            )
            .build_unchecked();

        let context = dispatch_context(&workflow);
        let report = runner.run(&workflow, &context).unwrap();

        assert_eq!(report.conclusion, JobResult::Failure);
        assert_eq!(report.jobs[0].result, JobResult::Failure);
        assert_eq!(report.jobs[1].result, JobResult::Success);
        assert_eq!(report.jobs[1].steps.len(), 1);
    }

    #[test]
    fn test_retry_recovers_on_second_attempt() {
        let base = TempDir::new().unwrap();
        let runner = LocalRunner::new().with_workspace_root(base.path());

        let command = "if [ -f marker ]; then echo ok; else touch marker; exit 1; fi";
        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "flaky",
                JobBuilder::new("u")
                    .step(
                        Step::run_command(command)
                            .with_retry(RetryPolicy::new(2).with_delay_seconds(0)),
                    )
                    .build_unchecked(),
            )
            .build_unchecked();

        let context = dispatch_context(&workflow);
        let report = runner.run(&workflow, &context).unwrap();

        assert_eq!(report.conclusion, JobResult::Success);
        assert_eq!(report.jobs[0].steps[0].attempts, 2);
        assert_eq!(report.jobs[0].steps[0].status, StepStatus::Success);
    }

    #[test]
    fn test_checkout_then_run() {
        let base = TempDir::new().unwrap();
        let source = TempDir::new().unwrap();
        fs::write(source.path().join("probe.txt"), "here\n").unwrap();

        let runner = LocalRunner::new()
            .with_workspace_root(base.path())
            .with_source_dir(source.path());

        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "test",
                JobBuilder::new("u")
                    .step(Step::uses_action("actions/checkout@v4"))
                    .step(Step::run_command("test -f probe.txt"))
                    .build_unchecked(),
            )
            .build_unchecked();

        let context = dispatch_context(&workflow);
        let report = runner.run(&workflow, &context).unwrap();

        assert_eq!(report.conclusion, JobResult::Success);
        assert_eq!(report.jobs[0].steps[0].exit_code, None);
    }

    #[test]
    fn test_setup_python_exports_interpreter() {
        let base = TempDir::new().unwrap();
        let runner = LocalRunner::new()
            .with_workspace_root(base.path())
            .with_interpreter("3.10", "/bin/echo");

        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "test",
                JobBuilder::new("u")
                    .step(
                        Step::uses_action("actions/setup-python@v5")
                            .with_input("python-version", "3.10"),
                    )
                    .step(Step::run_command(r#"test "$PYTHON" = "/bin/echo""#))
                    .build_unchecked(),
            )
            .build_unchecked();

        let context = dispatch_context(&workflow);
        let report = runner.run(&workflow, &context).unwrap();

        assert_eq!(report.conclusion, JobResult::Success);
    }

    #[test]
    fn test_unknown_action_fails_the_step() {
        let base = TempDir::new().unwrap();
        let runner = LocalRunner::new().with_workspace_root(base.path());

        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "test",
                JobBuilder::new("u")
                    .step(Step::uses_action("actions/upload-artifact@v4"))
                    .build_unchecked(),
            )
            .build_unchecked();

        let context = dispatch_context(&workflow);
        let report = runner.run(&workflow, &context).unwrap();

        assert_eq!(report.conclusion, JobResult::Failure);
        let error = report.jobs[0].steps[0].error.as_deref().unwrap();
        assert!(error.contains("actions/upload-artifact"));
    }

    #[test]
    fn test_env_layering() {
        let base = TempDir::new().unwrap();
        let runner = LocalRunner::new().with_workspace_root(base.path());

        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .env("FOO", "workflow")
            .job(
                "test",
                JobBuilder::new("u")
                    .env("FOO", "job")
                    .step(Step::run_command(r#"test "$FOO" = "job""#))
                    .step(
                        Step::run_command(r#"test "$FOO" = "step""#).with_env("FOO", "step"),
                    )
                    .step(Step::run_command(
                        r#"test "$CI" = "true" && test -n "$FLOWLINE_RUN_ID""#,
                    ))
                    .build_unchecked(),
            )
            .build_unchecked();

        let context = dispatch_context(&workflow);
        let report = runner.run(&workflow, &context).unwrap();

        assert_eq!(report.conclusion, JobResult::Success);
    }

    #[test]
    fn test_job_filter_limits_the_run() {
        let base = TempDir::new().unwrap();
        let runner = LocalRunner::new().with_workspace_root(base.path());

        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "one",
                JobBuilder::new("u")
                    .step(Step::run_command("echo one"))
                    .build_unchecked(),
            )
            .job(
                "two",
                JobBuilder::new("u")
                    .step(Step::run_command("echo two"))
                    .build_unchecked(),
            )
            .build_unchecked();

        let context = dispatch_context(&workflow).with_job_filter("two");
        let report = runner.run(&workflow, &context).unwrap();

        assert_eq!(report.jobs.len(), 1);
        assert_eq!(report.jobs[0].job_id, "two");
    }

    #[test]
    fn test_dry_run_reports_steps_skipped() {
        let runner = LocalRunner::new();

        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "build",
                JobBuilder::new("u")
                    .step(Step::run_command("echo one"))
                    .step(Step::run_command("echo two"))
                    .build_unchecked(),
            )
            .build_unchecked();

        let context = dispatch_context(&workflow);
        let report = runner.dry_run(&workflow, &context).unwrap();

        assert_eq!(report.conclusion, JobResult::Success);
        assert_eq!(report.jobs.len(), 1);
        assert_eq!(report.jobs[0].steps.len(), 2);
        assert!(report.jobs[0].steps.iter().all(|s| s.status.is_skipped()));
    }

    #[test]
    fn test_run_validates_first() {
        let runner = LocalRunner::new();
        let workflow = Workflow::builder("ci").on_dispatch().build_unchecked();

        let context = dispatch_context(&workflow);
        let result = runner.run(&workflow, &context);

        assert!(result.is_err());
    }

    #[test]
    fn test_workspace_cleanup_and_keep() {
        let base = TempDir::new().unwrap();

        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "touch",
                JobBuilder::new("u")
                    .step(Step::run_command("echo scratch > file.txt"))
                    .build_unchecked(),
            )
            .build_unchecked();

        let runner = LocalRunner::new().with_workspace_root(base.path());
        let context = dispatch_context(&workflow);
        runner.run(&workflow, &context).unwrap();
        assert!(!base.path().join(&context.run_id).exists());

        let keeper = LocalRunner::new()
            .with_workspace_root(base.path())
            .with_keep_workspace();
        let context = dispatch_context(&workflow);
        keeper.run(&workflow, &context).unwrap();
        assert!(base.path().join(&context.run_id).exists());
    }
}
