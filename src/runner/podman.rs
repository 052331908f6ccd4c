//! Native Podman runner using the Podman REST API
//!
//! Talks to the Podman service over its Unix socket instead of shelling out
//! to a CLI. Every step runs in a fresh container; a bind-mounted host
//! directory at `/flowline/work` carries workspace state from one step to
//! the next.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use url::Url;

use super::report::{JobReport, RunReport, StepReport, tail};
use super::traits::{HealthStatus, RunContext, RunnerCapabilities, WorkflowRunner};
use super::workspace::RunWorkspace;
use crate::workflow::{
    ActionRef, JobInstance, JobResult, Step, StepKind, StepStatus, Validate, Workflow,
    WorkflowError,
};

const PODMAN_SOCKET_PATH: &str = "/run/podman/podman.sock";
const PODMAN_API_VERSION: &str = "v5.0.0";

/// Mount point of the read-only project source inside step containers
const SOURCE_MOUNT: &str = "/flowline/src";

/// Bind-mounted working directory shared by all step containers of a job
const WORK_DIR: &str = "/flowline/work";

/// Errors from the Podman REST client
#[derive(Error, Debug)]
pub enum PodmanError {
    /// Could not reach the Podman socket
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Request could not be sent
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// Response was an error or could not be parsed
    #[error("API response error: {0}")]
    ApiResponse(String),

    /// Container creation was rejected
    #[error("Container creation failed: {0}")]
    ContainerCreateFailed(String),

    /// Image pull was rejected
    #[error("Image pull failed: {0}")]
    ImagePullFailed(String),
}

#[derive(Debug, Clone)]
struct PodmanClientConfig {
    socket_path: PathBuf,
    timeout: Duration,
    api_version: String,
}

impl Default for PodmanClientConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(PODMAN_SOCKET_PATH),
            timeout: Duration::from_secs(300),
            api_version: PODMAN_API_VERSION.to_string(),
        }
    }
}

/// Minimal Podman REST client over the service's Unix socket
struct PodmanClient {
    socket_path: PathBuf,
    base_url: Url,
    timeout: Duration,
}

impl PodmanClient {
    async fn new(config: PodmanClientConfig) -> Result<Self, PodmanError> {
        let socket_path = config.socket_path.clone();

        let stream = UnixStream::connect(&socket_path).await.map_err(|e| {
            PodmanError::ConnectionFailed(format!("Failed to connect to Podman socket: {e}"))
        })?;
        drop(stream);

        let base_url = Url::parse(&format!(
            "http://localhost/{}",
            config.api_version.trim_start_matches('v')
        ))
        .map_err(|e| PodmanError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            socket_path,
            base_url,
            timeout: config.timeout,
        })
    }

    async fn ping(&self) -> Result<(), PodmanError> {
        self.request("GET", "/_ping", None).await?;
        Ok(())
    }

    async fn send_http_request(
        &self,
        method: &str,
        path: &str,
        body: Option<&[u8]>,
    ) -> Result<(StatusCode, Vec<u8>), PodmanError> {
        let mut stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            PodmanError::ConnectionFailed(format!("Failed to connect to Podman socket: {e}"))
        })?;

        let api_version = self.base_url.path().trim_start_matches('/');
        let path_prefixed = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        let mut request = format!("{method} {path_prefixed} HTTP/1.1\r\n");
        request.push_str("Host: localhost\r\n");
        request.push_str("Accept: application/json\r\n");
        request.push_str(&format!("Api-Version: {api_version}\r\n"));

        if let Some(body) = body {
            request.push_str("Content-Type: application/json\r\n");
            request.push_str(&format!("Content-Length: {}\r\n", body.len()));
            request.push_str("\r\n");
            request.push_str(
                std::str::from_utf8(body)
                    .map_err(|e| PodmanError::ApiRequest(format!("Invalid UTF-8 in body: {e}")))?,
            );
        } else {
            request.push_str("\r\n");
        }

        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|e| PodmanError::ApiRequest(format!("Failed to write request: {e}")))?;

        let mut response = Vec::new();
        let mut buf = [0u8; 8192];

        loop {
            let n = tokio::time::timeout(self.timeout, stream.read(&mut buf))
                .await
                .map_err(|_| PodmanError::ApiResponse("Response read timed out".to_string()))?
                .map_err(|e| PodmanError::ApiResponse(format!("Failed to read response: {e}")))?;

            if n == 0 {
                break;
            }

            response.extend_from_slice(&buf[..n]);

            if response.ends_with(b"\r\n\r\n") {
                break;
            }
        }

        let body_start = response
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .unwrap_or(response.len());
        let header_end = body_start + 4;

        let status_line = std::str::from_utf8(&response[..body_start])
            .map_err(|e| PodmanError::ApiResponse(format!("Invalid status line: {e}")))?;

        let status_code = parse_status_code(status_line)?;
        let body = response.get(header_end..).unwrap_or_default().to_vec();

        Ok((status_code, body))
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<&[u8]>,
    ) -> Result<serde_json::Value, PodmanError> {
        let (status, body) = self.send_http_request(method, path, body).await?;

        if !status.is_success() {
            let msg = String::from_utf8_lossy(&body);
            return Err(PodmanError::ApiResponse(format!(
                "API error {}: {msg}",
                status.as_u16()
            )));
        }

        if body.is_empty() {
            return Ok(serde_json::Value::Null);
        }

        let json: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| PodmanError::ApiResponse(format!("JSON parse failed: {e}")))?;

        Ok(json)
    }

    async fn create_container(
        &self,
        image: &str,
        command: &str,
        env: &HashMap<String, String>,
        working_dir: &str,
        binds: &[String],
    ) -> Result<String, PodmanError> {
        let env_vec: Vec<String> = env.iter().map(|(k, v)| format!("{k}={v}")).collect();

        let container_config = serde_json::json!({
            "Image": image,
            "Cmd": ["sh", "-c", command],
            "WorkingDir": working_dir,
            "Env": env_vec,
            "HostConfig": {
                "CgroupManager": "cgroupfs",
                "Binds": binds,
            },
            "Tty": false,
            "OpenStdin": false,
        });

        let body = serde_json::to_string(&container_config).map_err(|e| {
            PodmanError::ContainerCreateFailed(format!("JSON serialization failed: {e}"))
        })?;

        let response = self
            .request("POST", "/containers/create", Some(body.as_bytes()))
            .await?;

        let id = response
            .get("Id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                PodmanError::ContainerCreateFailed("No container ID in response".to_string())
            })?
            .to_string();

        Ok(id)
    }

    async fn start_container(&self, container_id: &str) -> Result<(), PodmanError> {
        let path = format!("/containers/{container_id}/start");
        self.request("POST", &path, None).await?;
        Ok(())
    }

    async fn wait_container(&self, container_id: &str) -> Result<i32, PodmanError> {
        let path = format!("/containers/{container_id}/wait");
        let response = self.request("POST", &path, None).await?;

        #[allow(clippy::cast_possible_truncation)]
        let exit_code = response.as_i64().unwrap_or(0) as i32;
        Ok(exit_code)
    }

    async fn logs(&self, container_id: &str) -> Result<(Vec<u8>, Vec<u8>), PodmanError> {
        let path = format!("/containers/{container_id}/logs?stdout=true&stderr=true");
        let response = self.request("GET", &path, None).await;

        match response {
            Ok(json) => {
                let logs = json.to_string().into_bytes();
                Ok((logs, Vec::new()))
            }
            Err(PodmanError::ApiResponse(_)) => Ok((Vec::new(), Vec::new())),
            Err(e) => Err(e),
        }
    }

    async fn remove_container(&self, container_id: &str) -> Result<(), PodmanError> {
        let path = format!("/containers/{container_id}?force=true");
        self.request("DELETE", &path, None).await?;
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<(), PodmanError> {
        let path = format!("/images/pull?reference={image}");
        self.request("POST", &path, None)
            .await
            .map_err(|e| PodmanError::ImagePullFailed(e.to_string()))?;
        Ok(())
    }
}

fn parse_status_code(status_line: &str) -> Result<StatusCode, PodmanError> {
    let parts: Vec<&str> = status_line.splitn(3, ' ').collect();
    if parts.len() < 2 {
        return Err(PodmanError::ApiResponse(format!(
            "Invalid status line: {status_line}"
        )));
    }

    let code: u16 = parts[1]
        .parse()
        .map_err(|_| PodmanError::ApiResponse(format!("Invalid status code in: {status_line}")))?;

    StatusCode::from_u16(code)
        .map_err(|()| PodmanError::ApiResponse(format!("Unknown status code: {code}")))
}

/// Status codes the libpod API actually answers with
#[derive(Debug, Clone, Copy, PartialEq)]
enum StatusCode {
    Ok = 200,
    Created = 201,
    Accepted = 202,
    NoContent = 204,
    NotModified = 304,
    BadRequest = 400,
    NotFound = 404,
    Conflict = 409,
    InternalServerError = 500,
}

impl StatusCode {
    fn from_u16(code: u16) -> Result<Self, ()> {
        Ok(match code {
            200 => Self::Ok,
            201 => Self::Created,
            202 => Self::Accepted,
            204 => Self::NoContent,
            304 => Self::NotModified,
            400 => Self::BadRequest,
            404 => Self::NotFound,
            409 => Self::Conflict,
            500 => Self::InternalServerError,
            _ => return Err(()),
        })
    }

    fn is_success(self) -> bool {
        matches!(
            self,
            Self::Ok | Self::Created | Self::Accepted | Self::NoContent
        )
    }

    fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Runner that executes job instances through the Podman REST API
#[derive(Debug, Clone)]
pub struct PodmanRunner {
    config: PodmanClientConfig,
    /// Image used when `runs-on` has no mapping
    default_image: String,
    /// `runs-on` label to image mappings
    platform_images: HashMap<String, String>,
    /// Project source directory bind-mounted into step containers
    source_dir: PathBuf,
    /// Host directory that holds per-run workspaces
    workspace_root: PathBuf,
    /// Keep run workspaces on disk after the run
    keep_workspace: bool,
    /// Number of output lines kept per step in the report
    tail_lines: usize,
}

impl PodmanRunner {
    /// Creates a runner against the default Podman socket
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PodmanClientConfig::default(),
            default_image: "debian:bookworm-slim".to_string(),
            platform_images: HashMap::new(),
            source_dir: std::env::current_dir().unwrap_or_default(),
            workspace_root: std::env::temp_dir().join("flowline"),
            keep_workspace: false,
            tail_lines: 20,
        }
    }

    /// Sets the Podman socket path
    #[must_use]
    pub fn with_socket(mut self, socket: impl Into<PathBuf>) -> Self {
        self.config.socket_path = socket.into();
        self
    }

    /// Sets the API request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets the fallback image
    #[must_use]
    pub fn with_default_image(mut self, image: impl Into<String>) -> Self {
        self.default_image = image.into();
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

    /// Sets the host directory that holds per-run workspaces
    #[must_use]
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// Keeps run workspaces on disk after the run
    #[must_use]
    pub fn with_keep_workspace(mut self, keep: bool) -> Self {
        self.keep_workspace = keep;
        self
    }

    /// Sets the number of output lines kept per step
    #[must_use]
    pub fn with_tail_lines(mut self, lines: usize) -> Self {
        self.tail_lines = lines;
        self
    }

    fn socket_exists(&self) -> bool {
        std::fs::exists(&self.config.socket_path).unwrap_or(false)
    }

    /// Resolves the image for a `runs-on` label
    fn image_for(&self, runs_on: &str) -> &str {
        self.platform_images
            .get(runs_on)
            .map_or(&self.default_image, String::as_str)
    }
}

impl Default for PodmanRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowRunner for PodmanRunner {
    fn run(&self, workflow: &Workflow, context: &RunContext) -> Result<RunReport, WorkflowError> {
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| WorkflowError::Io(format!("Failed to create runtime: {e}")))?;

        rt.block_on(async { self.run_async(workflow, context).await })
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
                image = %self.image_for(&instance.runs_on),
                "Would run job in Podman"
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
            can_run_containers: self.socket_exists(),
            supports_parallel_matrix: false,
            supports_timeout: true,
            supports_retry: true,
        }
    }

    fn health_check(&self) -> HealthStatus {
        if self.socket_exists() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy {
                reason: format!(
                    "Podman socket not found at {}",
                    self.config.socket_path.display()
                ),
            }
        }
    }
}

impl PodmanRunner {
    async fn run_async(
        &self,
        workflow: &Workflow,
        context: &RunContext,
    ) -> Result<RunReport, WorkflowError> {
        workflow.validate().map_err(WorkflowError::Validation)?;
        let order = workflow
            .execution_order()
            .map_err(WorkflowError::Validation)?;

        let client = match PodmanClient::new(self.config.clone()).await {
            Ok(client) => client,
            Err(error) => {
                tracing::error!(error = %error, "Failed to connect to Podman");
                return Err(WorkflowError::RunnerConfig(format!(
                    "Podman connection failed: {error}"
                )));
            }
        };

        if let Err(error) = client.ping().await {
            tracing::error!(error = %error, "Podman ping failed");
            return Err(WorkflowError::RunnerConfig(format!(
                "Podman ping failed: {error}"
            )));
        }

        tracing::info!(
            workflow = %workflow.name,
            run_id = %context.run_id,
            "Starting Podman workflow run"
        );

        let started = Instant::now();
        let workspace =
            RunWorkspace::create(&self.workspace_root, &context.run_id, self.keep_workspace)?;
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
                let job_report = self
                    .run_instance(instance, env, &client, &workspace)
                    .await;
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
            "Podman workflow run finished"
        );

        if workspace.is_kept() {
            tracing::info!(path = %workspace.root().display(), "Keeping run workspace");
        }

        Ok(report)
    }

    async fn run_instance(
        &self,
        instance: &JobInstance,
        mut env: HashMap<String, String>,
        client: &PodmanClient,
        workspace: &RunWorkspace,
    ) -> JobReport {
        let started = Instant::now();
        let image = self.image_for(&instance.runs_on).to_string();

        tracing::info!(job = %instance.name, image = %image, "Starting job in Podman");

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

        env.insert("WORKSPACE".to_string(), WORK_DIR.to_string());

        let binds = vec![
            format!("{}:{SOURCE_MOUNT}:ro", self.source_dir.display()),
            format!("{}:{WORK_DIR}", job_dir.display()),
        ];

        let deadline = instance
            .job
            .timeout_minutes
            .map(|minutes| started + Duration::from_secs(minutes.saturating_mul(60)));

        let matrix = instance.matrix.context();
        let mut steps = Vec::with_capacity(instance.job.steps.len());
        let mut failed = false;
        let mut timed_out = false;

        for (index, step) in instance.job.steps.iter().enumerate() {
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

            let step_report = self
                .run_step(step, instance, &image, &binds, &mut env, &matrix, client)
                .await;

            if let Err(error) = workspace.write_step_log(
                &instance.name,
                index,
                &step_report.name,
                &step_report.output_tail,
            ) {
                tracing::warn!(step = %step_report.name, error = %error, "Could not write step log");
            }

            if step_report.status.is_failure() && !step.continue_on_error {
                failed = true;
            }
            steps.push(step_report);
        }

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
            "Podman job finished"
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

    #[allow(clippy::too_many_arguments)]
    async fn run_step(
        &self,
        step: &Step,
        instance: &JobInstance,
        image: &str,
        binds: &[String],
        env: &mut HashMap<String, String>,
        matrix: &HashMap<String, String>,
        client: &PodmanClient,
    ) -> StepReport {
        let name = step.display_name();
        let started = Instant::now();
        tracing::info!(job = %instance.name, step = %name, "Running step in Podman");

        let planned = step.retry.as_ref().map_or(1, |retry| retry.attempts.max(1));
        let mut attempt = 0;
        let mut outcome;

        loop {
            attempt += 1;
            outcome = self
                .run_step_once(step, image, binds, env, matrix, client)
                .await;
            if outcome.0.is_success() || attempt >= planned {
                break;
            }
            let delay = step
                .retry
                .as_ref()
                .map_or(Duration::ZERO, |retry| retry.delay_for(attempt));
            tracing::warn!(step = %name, attempt, planned, "Step failed, retrying");
            tokio::time::sleep(delay).await;
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

    async fn run_step_once(
        &self,
        step: &Step,
        image: &str,
        binds: &[String],
        env: &mut HashMap<String, String>,
        matrix: &HashMap<String, String>,
        client: &PodmanClient,
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
                let timeout = step
                    .timeout_minutes
                    .map(|minutes| Duration::from_secs(minutes.saturating_mul(60)));

                self.run_in_container(image, &resolved, &step_env, &workdir, binds, timeout, client)
                    .await
            }
            Some(StepKind::Uses(reference)) => {
                self.run_action_step(step, reference, image, binds, env, matrix, client)
                    .await
            }
            None => (
                StepStatus::Failure,
                None,
                String::new(),
                Some("step must set exactly one of 'uses' or 'run'".to_string()),
            ),
        }
    }

    /// Maps the built-in actions onto in-container behavior
    #[allow(clippy::too_many_arguments)]
    async fn run_action_step(
        &self,
        step: &Step,
        reference: &str,
        image: &str,
        binds: &[String],
        env: &mut HashMap<String, String>,
        matrix: &HashMap<String, String>,
        client: &PodmanClient,
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
                let command =
                    format!("mkdir -p {destination} && cp -a {SOURCE_MOUNT}/. {destination}");
                self.run_in_container(image, &command, env, WORK_DIR, binds, None, client)
                    .await
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
                let outcome = self
                    .run_in_container(image, &probe, env, WORK_DIR, binds, None, client)
                    .await;

                if outcome.0.is_success() {
                    env.insert("PYTHON".to_string(), interpreter);
                    env.insert("FLOWLINE_PYTHON_VERSION".to_string(), requested);
                    outcome
                } else if outcome.3.is_some() && outcome.1.is_none() {
                    outcome
                } else {
                    let error = WorkflowError::InterpreterNotFound { version: requested };
                    (StepStatus::Failure, None, String::new(), Some(error.to_string()))
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

    /// Runs one command in a fresh container and collects its outcome
    #[allow(clippy::too_many_arguments)]
    async fn run_in_container(
        &self,
        image: &str,
        command: &str,
        env: &HashMap<String, String>,
        working_dir: &str,
        binds: &[String],
        timeout: Option<Duration>,
        client: &PodmanClient,
    ) -> (StepStatus, Option<i32>, String, Option<String>) {
        tracing::debug!(image = %image, command = %command, "Creating container");

        let created = match client
            .create_container(image, command, env, working_dir, binds)
            .await
        {
            Err(PodmanError::ApiResponse(msg)) if msg.contains("no such image") => {
                tracing::info!(image = %image, "Image not present, pulling");
                if let Err(error) = client.pull_image(image).await {
                    return (StepStatus::Failure, None, String::new(), Some(error.to_string()));
                }
                client
                    .create_container(image, command, env, working_dir, binds)
                    .await
            }
            other => other,
        };

        let container_id = match created {
            Ok(id) => id,
            Err(error) => {
                return (StepStatus::Failure, None, String::new(), Some(error.to_string()));
            }
        };

        tracing::debug!(container_id = %container_id, "Starting container");

        if let Err(error) = client.start_container(&container_id).await {
            client.remove_container(&container_id).await.ok();
            return (StepStatus::Failure, None, String::new(), Some(error.to_string()));
        }

        tracing::debug!(container_id = %container_id, "Waiting for container");

        let waited = match timeout {
            Some(limit) => match tokio::time::timeout(limit, client.wait_container(&container_id))
                .await
            {
                Ok(waited) => waited,
                Err(_) => {
                    client.remove_container(&container_id).await.ok();
                    let error = WorkflowError::Timeout { duration: limit };
                    return (StepStatus::Failure, None, String::new(), Some(error.to_string()));
                }
            },
            None => client.wait_container(&container_id).await,
        };

        let exit_code = match waited {
            Ok(code) => code,
            Err(error) => {
                client.remove_container(&container_id).await.ok();
                return (StepStatus::Failure, None, String::new(), Some(error.to_string()));
            }
        };

        let (stdout, stderr) = client
            .logs(&container_id)
            .await
            .unwrap_or((Vec::new(), Vec::new()));
        client.remove_container(&container_id).await.ok();

        let mut output = String::from_utf8_lossy(&stdout).into_owned();
        if !stderr.is_empty() {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&String::from_utf8_lossy(&stderr));
        }

        if exit_code == 0 {
            (StepStatus::Success, Some(0), output, None)
        } else {
            (
                StepStatus::Failure,
                Some(exit_code),
                output,
                Some(format!("exit code {exit_code}")),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{JobBuilder, TriggerEvent};

    #[test]
    fn test_podman_runner_creation() {
        let runner = PodmanRunner::new();
        assert_eq!(runner.config.socket_path, PathBuf::from(PODMAN_SOCKET_PATH));
        assert_eq!(runner.default_image, "debian:bookworm-slim");
    }

    #[test]
    fn test_podman_runner_capabilities() {
        let runner = PodmanRunner::new();
        let caps = runner.capabilities();

        assert!(caps.can_execute_shell);
        assert!(!caps.supports_parallel_matrix);
        assert!(caps.supports_timeout);
        assert!(caps.supports_retry);
    }

    #[test]
    fn test_podman_runner_health_check() {
        let runner = PodmanRunner::new().with_socket("/nonexistent/podman.sock");
        let health = runner.health_check();

        assert!(matches!(health, HealthStatus::Unhealthy { .. }));
    }

    #[test]
    fn test_status_code_parsing() {
        let status = parse_status_code("HTTP/1.1 200 OK").unwrap();
        assert_eq!(status, StatusCode::Ok);
        assert!(status.is_success());
        assert_eq!(status.as_u16(), 200);

        let status = parse_status_code("HTTP/1.1 404 Not Found").unwrap();
        assert!(!status.is_success());

        assert!(parse_status_code("garbage").is_err());
        assert!(parse_status_code("HTTP/1.1 999 Weird").is_err());
    }

    #[test]
    fn test_podman_image_resolution() {
        let runner = PodmanRunner::new()
            .with_default_image("alpine:3.20")
            .with_platform_image("ubuntu-22.04", "ubuntu:22.04");

        assert_eq!(runner.image_for("ubuntu-22.04"), "ubuntu:22.04");
        assert_eq!(runner.image_for("windows-2022"), "alpine:3.20");
    }

    #[test]
    fn test_podman_dry_run() {
        let runner = PodmanRunner::new();
        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "build",
                JobBuilder::new("ubuntu-22.04")
                    .step(Step::run_command("echo test"))
                    .build_unchecked(),
            )
            .build_unchecked();

        let context = RunContext::prepare(&workflow, TriggerEvent::dispatch()).unwrap();
        let report = runner.dry_run(&workflow, &context).unwrap();

        assert_eq!(report.conclusion, JobResult::Success);
        assert_eq!(report.jobs.len(), 1);
    }

    #[test]
    fn test_podman_run_without_socket() {
        let runner = PodmanRunner::new().with_socket("/nonexistent/podman.sock");
        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "build",
                JobBuilder::new("u")
                    .step(Step::run_command("echo test"))
                    .build_unchecked(),
            )
            .build_unchecked();

        let context = RunContext::prepare(&workflow, TriggerEvent::dispatch()).unwrap();
        let result = runner.run(&workflow, &context);

        assert!(matches!(result, Err(WorkflowError::RunnerConfig(_))));
    }
}
