//! Container runner (Docker/Podman)
//!
//! Executes job instances inside Docker or Podman containers. One container
//! is started per job instance; each step runs through `exec` in it, so
//! state written by one step is visible to the next. The project source is
//! mounted read-only and copied into the container's working directory by
//! `actions/checkout`.

use super::report::{JobReport, RunReport, StepReport, tail};
use super::traits::{HealthStatus, RunContext, RunnerCapabilities, WorkflowRunner};
use super::workspace::sanitize;
use crate::workflow::{
    ActionRef, JobInstance, JobResult, Step, StepKind, StepStatus, Validate, Workflow,
    WorkflowError,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

/// Mount point of the read-only project source inside the container
const SOURCE_MOUNT: &str = "/flowline/src";

/// Working directory of the job inside the container
const WORK_DIR: &str = "/flowline/work";

/// Container runtime type
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ContainerRuntime {
    /// Docker runtime
    #[default]
    Docker,
    /// Podman runtime
    Podman,
}

impl std::fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerRuntime::Docker => write!(f, "docker"),
            ContainerRuntime::Podman => write!(f, "podman"),
        }
    }
}

/// Runner that executes job instances inside containers (Docker or Podman)
#[derive(Debug, Clone)]
pub struct ContainerRunner {
    /// Image used when `runs-on` has no mapping
    default_image: String,
    /// Container runtime to use
    runtime: ContainerRuntime,
    /// `runs-on` label to image mappings
    platform_images: HashMap<String, String>,
    /// Project source directory mounted into the container
    source_dir: PathBuf,
    /// Number of output lines kept per step in the report
    tail_lines: usize,
}

impl ContainerRunner {
    /// Creates a new runner backed by Docker
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_image: "debian:bookworm-slim".to_string(),
            runtime: ContainerRuntime::Docker,
            platform_images: HashMap::new(),
            source_dir: std::env::current_dir().unwrap_or_default(),
            tail_lines: 20,
        }
    }

    /// Creates a new runner backed by Podman
    #[must_use]
    pub fn with_podman() -> Self {
        Self {
            runtime: ContainerRuntime::Podman,
            ..Self::new()
        }
    }

    /// Sets the fallback image
    #[must_use]
    pub fn with_default_image(mut self, image: impl Into<String>) -> Self {
        self.default_image = image.into();
        self
    }

    /// Sets the container runtime
    #[must_use]
    pub fn with_runtime(mut self, runtime: ContainerRuntime) -> Self {
        self.runtime = runtime;
        self
    }

    /// Maps a `runs-on` label to an image
    #[must_use]
    pub fn with_platform_image(
        mut self,
        runs_on: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        self.platform_images.insert(runs_on.into(), image.into());
        self
    }

    /// Sets the project source directory
    #[must_use]
    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = dir.into();
        self
    }

    /// Sets the number of output lines kept per step
    #[must_use]
    pub fn with_tail_lines(mut self, lines: usize) -> Self {
        self.tail_lines = lines;
        self
    }

    /// Gets the runtime executable name
    fn runtime_command(&self) -> &'static str {
        match self.runtime {
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::Podman => "podman",
        }
    }

    /// Checks if the container runtime is available
    fn is_runtime_available(&self) -> bool {
        Command::new(self.runtime_command())
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Gets the runtime version
    fn get_runtime_version(&self) -> String {
        let output = Command::new(self.runtime_command())
            .arg("--version")
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .unwrap_or_else(|| "unknown".to_string());
        output.trim().to_string()
    }

    /// Resolves the image for a `runs-on` label
    fn image_for(&self, runs_on: &str) -> &str {
        self.platform_images
            .get(runs_on)
            .map_or(&self.default_image, String::as_str)
    }

    /// Starts the long-lived container for a job instance
    fn start_container(&self, name: &str, image: &str) -> Result<(), WorkflowError> {
        let mut cmd = Command::new(self.runtime_command());
        cmd.arg("run")
            .arg("-d")
            .arg("--name")
            .arg(name)
            .arg("-v")
            .arg(format!("{}:{SOURCE_MOUNT}:ro", self.source_dir.display()))
            .arg("-w")
            .arg(WORK_DIR);

        if matches!(self.runtime, ContainerRuntime::Podman) {
            cmd.arg("--cgroup-manager=cgroupfs");
        }

        cmd.arg(image).arg("sleep").arg("infinity");

        let output = cmd.output().map_err(|e| WorkflowError::Io(e.to_string()))?;
        if !output.status.success() {
            return Err(WorkflowError::RunnerConfig(format!(
                "could not start container from image '{image}': {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    /// Runs a command inside a started container
    fn exec_in_container(
        &self,
        name: &str,
        command: &str,
        env: &HashMap<String, String>,
        workdir: &str,
    ) -> Result<ContainerOutput, WorkflowError> {
        let mut cmd = Command::new(self.runtime_command());
        cmd.arg("exec").arg("-w").arg(workdir);
        for (key, value) in env {
            cmd.arg("-e").arg(format!("{key}={value}"));
        }
        cmd.arg(name).arg("sh").arg("-c").arg(command);

        let output = cmd.output().map_err(|e| WorkflowError::Io(e.to_string()))?;
        Ok(ContainerOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// Removes a job container, ignoring failures
    fn remove_container(&self, name: &str) {
        let _ = Command::new(self.runtime_command())
            .arg("rm")
            .arg("-f")
            .arg(name)
            .output();
    }
}

impl Default for ContainerRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Captured output of one `exec` in a container
struct ContainerOutput {
    stdout: String,
    stderr: String,
    exit_code: i32,
}

impl ContainerOutput {
    fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

impl WorkflowRunner for ContainerRunner {
    fn run(&self, workflow: &Workflow, context: &RunContext) -> Result<RunReport, WorkflowError> {
        workflow.validate().map_err(WorkflowError::Validation)?;
        let order = workflow
            .execution_order()
            .map_err(WorkflowError::Validation)?;

        if !self.is_runtime_available() {
            return Err(WorkflowError::RunnerConfig(format!(
                "{} is not available",
                self.runtime
            )));
        }

        tracing::info!(
            runtime = %self.runtime,
            workflow = %workflow.name,
            run_id = %context.run_id,
            "Starting container workflow run"
        );

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
                report.push_job(JobReport::unstarted(
                    job_id,
                    &display,
                    &job.runs_on,
                    JobResult::Skipped,
                ));
                outcomes.insert(job_id.clone(), JobResult::Skipped);
                continue;
            }

            // Instances run one after another; fail-fast cancels the rest
            let fail_fast = job.fail_fast();
            let mut outcome = JobResult::Success;
            let mut cancelled = false;

            for instance in &instances {
                if cancelled {
                    report.push_job(JobReport::unstarted(
                        &instance.job_id,
                        &instance.name,
                        &instance.runs_on,
                        JobResult::Cancelled,
                    ));
                    outcome = outcome.worst(JobResult::Cancelled);
                    continue;
                }

                let env = context.instance_env(workflow, instance)?;
                let job_report = self.run_instance(instance, context, env);
                if job_report.result.is_failure() && fail_fast {
                    cancelled = true;
                }
                outcome = outcome.worst(job_report.result);
                report.push_job(job_report);
            }

            outcomes.insert(job_id.clone(), outcome);
        }

        report.duration = started.elapsed();
        tracing::info!(
            workflow = %workflow.name,
            conclusion = %report.conclusion,
            duration_ms = report.duration.as_millis(),
            "Container workflow run finished"
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

        tracing::info!(runtime = %self.runtime, workflow = %workflow.name, "Starting dry run");

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
                image = %self.image_for(&instance.runs_on),
                "Would run job in container"
            );
            let steps = instance
                .job
                .steps
                .iter()
                .map(|step| StepReport::skipped(step.display_name()))
                .collect();

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
            can_run_containers: self.is_runtime_available(),
            supports_parallel_matrix: false,
            supports_timeout: true,
            supports_retry: true,
        }
    }

    fn health_check(&self) -> HealthStatus {
        if !self.is_runtime_available() {
            return HealthStatus::Unhealthy {
                reason: format!("{} is not available", self.runtime),
            };
        }

        let version = self.get_runtime_version();
        tracing::info!(runtime = %self.runtime, version = %version, "Container runtime available");

        HealthStatus::Healthy
    }
}

impl ContainerRunner {
    /// Runs a single job instance inside its own container
    fn run_instance(
        &self,
        instance: &JobInstance,
        context: &RunContext,
        mut env: HashMap<String, String>,
    ) -> JobReport {
        let started = Instant::now();
        let image = self.image_for(&instance.runs_on).to_string();
        let short_id = context.run_id.get(..8).unwrap_or(&context.run_id);
        let container = format!("flowline-{short_id}-{}", sanitize(&instance.name));

        tracing::info!(
            job = %instance.name,
            image = %image,
            container = %container,
            "Starting job in container"
        );

        env.insert("WORKSPACE".to_string(), WORK_DIR.to_string());

        if let Err(error) = self.start_container(&container, &image) {
            tracing::error!(job = %instance.name, error = %error, "Could not start container");
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

        let deadline = instance
            .job
            .timeout_minutes
            .map(|minutes| started + Duration::from_secs(minutes.saturating_mul(60)));

        let matrix = instance.matrix.context();
        let mut steps = Vec::with_capacity(instance.job.steps.len());
        let mut failed = false;
        let mut timed_out = false;

        for step in &instance.job.steps {
            if !failed
                && !timed_out
                && let Some(limit) = deadline
                && Instant::now() >= limit
            {
                timed_out = true;
                tracing::warn!(
                    job = %instance.name,
                    timeout_minutes = instance.job.timeout_minutes,
                    "Job deadline reached"
                );
            }

            if failed || timed_out {
                steps.push(StepReport::skipped(step.display_name()));
                continue;
            }

            let step_report = self.run_step(step, instance, &container, &mut env, &matrix);
            if step_report.status.is_failure() && !step.continue_on_error {
                failed = true;
            }
            steps.push(step_report);
        }

        self.remove_container(&container);

        let result = if failed || timed_out {
            JobResult::Failure
        } else {
            JobResult::Success
        };
        let duration = started.elapsed();
        tracing::info!(
            job = %instance.name,
            result = %result,
            duration_ms = duration.as_millis(),
            "Container job finished"
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

    /// Runs one step in the container, honoring its retry policy
    fn run_step(
        &self,
        step: &Step,
        instance: &JobInstance,
        container: &str,
        env: &mut HashMap<String, String>,
        matrix: &HashMap<String, String>,
    ) -> StepReport {
        let name = step.display_name();
        let started = Instant::now();
        tracing::info!(job = %instance.name, step = %name, "Running step in container");

        let planned = step.retry.as_ref().map_or(1, |retry| retry.attempts.max(1));
        let mut attempt = 0;
        let mut outcome;

        loop {
            attempt += 1;
            outcome = self.run_step_once(step, container, env, matrix);
            if outcome.0.is_success() || attempt >= planned {
                break;
            }
            let delay = step
                .retry
                .as_ref()
                .map_or(Duration::ZERO, |retry| retry.delay_for(attempt));
            tracing::warn!(step = %name, attempt, planned, "Step failed, retrying");
            std::thread::sleep(delay);
        }

        let (status, exit_code, output, error) = outcome;
        StepReport {
            name,
            status,
            duration: started.elapsed(),
            exit_code,
            output_tail: tail(&output, self.tail_lines),
            error,
            attempts: attempt,
        }
    }

    /// Runs a single attempt of a step in the container
    fn run_step_once(
        &self,
        step: &Step,
        container: &str,
        env: &mut HashMap<String, String>,
        matrix: &HashMap<String, String>,
    ) -> (StepStatus, Option<i32>, String, Option<String>) {
        match step.kind() {
            Some(StepKind::Run(command)) => {
                let resolved = match crate::workflow::expr::interpolate(command, matrix, env) {
                    Ok(resolved) => resolved,
                    Err(error) => {
                        return (StepStatus::Failure, None, String::new(), Some(error.to_string()));
                    }
                };

                let mut step_env = env.clone();
                for (key, value) in &step.env {
                    match crate::workflow::expr::interpolate(value, matrix, env) {
                        Ok(resolved) => {
                            step_env.insert(key.clone(), resolved);
                        }
                        Err(error) => {
                            return (
                                StepStatus::Failure,
                                None,
                                String::new(),
                                Some(error.to_string()),
                            );
                        }
                    }
                }

                let workdir = step
                    .working_directory
                    .as_ref()
                    .map_or(WORK_DIR.to_string(), |dir| format!("{WORK_DIR}/{dir}"));

                match step.timeout_minutes {
                    Some(minutes) => {
                        // The exec runs on its own thread so the wait can be
                        // bounded; on timeout the container is torn down at
                        // the end of the job, which kills the command too.
                        let duration = Duration::from_secs(minutes.saturating_mul(60));
                        let (tx, rx) = std::sync::mpsc::channel();
                        let runner = self.clone();
                        let container = container.to_string();
                        let command = resolved.clone();
                        let exec_env = step_env.clone();

                        std::thread::spawn(move || {
                            let _ = tx.send(runner.exec_in_container(
                                &container,
                                &command,
                                &exec_env,
                                &workdir,
                            ));
                        });

                        match rx.recv_timeout(duration) {
                            Ok(result) => Self::exec_outcome(result),
                            Err(_) => {
                                let error = WorkflowError::Timeout { duration };
                                (StepStatus::Failure, None, String::new(), Some(error.to_string()))
                            }
                        }
                    }
                    None => Self::exec_outcome(self.exec_in_container(
                        container,
                        &resolved,
                        &step_env,
                        &workdir,
                    )),
                }
            }
            Some(StepKind::Uses(reference)) => self.run_action_step(step, reference, container, env, matrix),
            None => (
                StepStatus::Failure,
                None,
                String::new(),
                Some("step must set exactly one of 'uses' or 'run'".to_string()),
            ),
        }
    }

    /// Maps the built-in actions onto in-container behavior.
    ///
    /// `actions/checkout` copies the mounted source into the working
    /// directory; `actions/setup-python` exports the versioned interpreter
    /// the image is expected to ship.
    fn run_action_step(
        &self,
        step: &Step,
        reference: &str,
        container: &str,
        env: &mut HashMap<String, String>,
        matrix: &HashMap<String, String>,
    ) -> (StepStatus, Option<i32>, String, Option<String>) {
        let action_ref = match reference.parse::<ActionRef>() {
            Ok(parsed) => parsed,
            Err(error) => {
                return (StepStatus::Failure, None, String::new(), Some(error.to_string()));
            }
        };

        match action_ref.slug.as_str() {
            "actions/checkout" => {
                let destination = step
                    .with
                    .get("path")
                    .map_or(".".to_string(), |path| format!("./{path}"));
                let command = format!(
                    "mkdir -p {destination} && cp -a {SOURCE_MOUNT}/. {destination}"
                );
                Self::exec_outcome(self.exec_in_container(container, &command, env, WORK_DIR))
            }
            "actions/setup-python" => {
                let requested = step
                    .with
                    .get("python-version")
                    .map(|value| crate::workflow::expr::interpolate(value, matrix, env))
                    .transpose();
                let requested = match requested {
                    Ok(version) => version.unwrap_or_else(|| "3".to_string()),
                    Err(error) => {
                        return (
                            StepStatus::Failure,
                            None,
                            String::new(),
                            Some(error.to_string()),
                        );
                    }
                };

                let interpreter = format!("python{requested}");
                let probe = format!("command -v {interpreter}");
                match self.exec_in_container(container, &probe, env, WORK_DIR) {
                    Ok(output) if output.is_success() => {
                        env.insert("PYTHON".to_string(), interpreter);
                        env.insert("FLOWLINE_PYTHON_VERSION".to_string(), requested);
                        (StepStatus::Success, Some(0), output.combined(), None)
                    }
                    Ok(_) => {
                        let error = WorkflowError::InterpreterNotFound { version: requested };
                        (StepStatus::Failure, None, String::new(), Some(error.to_string()))
                    }
                    Err(error) => (StepStatus::Failure, None, String::new(), Some(error.to_string())),
                }
            }
            other => {
                let error = WorkflowError::UnknownAction {
                    action: other.to_string(),
                };
                (StepStatus::Failure, None, String::new(), Some(error.to_string()))
            }
        }
    }

    /// Maps an exec result onto a step outcome
    fn exec_outcome(
        result: Result<ContainerOutput, WorkflowError>,
    ) -> (StepStatus, Option<i32>, String, Option<String>) {
        match result {
            Ok(output) if output.is_success() => {
                (StepStatus::Success, Some(0), output.combined(), None)
            }
            Ok(output) => (
                StepStatus::Failure,
                Some(output.exit_code),
                output.combined(),
                Some(format!("exit code {}", output.exit_code)),
            ),
            Err(error) => (StepStatus::Failure, None, String::new(), Some(error.to_string())),
        }
    }
}

/// Docker runner (alias for [`ContainerRunner`])
pub type DockerRunner = ContainerRunner;
