//! `flowline run` - Execute a workflow
//!
//! Wires the layered configuration, the trigger event and the chosen
//! runner backend together, executes the workflow and hands the report
//! back for rendering.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use flowline::infrastructure::{Config, RunMetrics, init_logging};
use flowline::runner::{
    ContainerRunner, LocalRunner, LocalRunnerConfig, PodmanRunner, RunContext, RunReport,
    WorkflowRunner,
};
use flowline::workflow::{TriggerEvent, Workflow};

/// Options for a single `flowline run` invocation
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// The event offered to the workflow's triggers
    pub event: TriggerEvent,
    /// Restrict execution to this job id
    pub job: Option<String>,
    /// Runner backend override (`local`, `docker` or `podman`)
    pub runner: Option<String>,
    /// Walk the workflow without executing anything
    pub dry_run: bool,
    /// Keep run workspaces on disk after the run
    pub keep_workspace: bool,
    /// Explicit config file
    pub config_file: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            event: TriggerEvent::dispatch(),
            job: None,
            runner: None,
            dry_run: false,
            keep_workspace: false,
            config_file: None,
        }
    }
}

/// Executes a workflow file and returns the run report
///
/// # Errors
///
/// Returns an error when configuration or the workflow cannot be loaded,
/// the event matches no declared trigger, the job filter names an unknown
/// job, or the runner fails outright. A completed run with failing jobs is
/// not an error; the report carries the conclusion.
pub fn run_workflow(file: &Path, options: &RunOptions) -> Result<RunReport> {
    let mut config = Config::load(options.config_file.as_deref())?;
    if let Some(runner) = &options.runner {
        config.runner.clone_from(runner);
    }
    if options.keep_workspace {
        config.keep_workspace = true;
    }
    init_logging(&config.log_level);

    let workflow = Workflow::load(file)
        .with_context(|| format!("Failed to load workflow: {}", file.display()))?;

    let mut context = RunContext::prepare(&workflow, options.event.clone())?;
    if let Some(job) = &options.job {
        if workflow.job(job).is_none() {
            bail!(
                "workflow '{}' has no job '{}' (jobs: {})",
                workflow.name,
                job,
                workflow.job_ids().join(", ")
            );
        }
        context = context.with_job_filter(job.clone());
    }

    let runner = build_runner(&config)?;
    let report = if options.dry_run {
        runner.dry_run(&workflow, &context)?
    } else {
        runner.run(&workflow, &context)?
    };

    let metrics = RunMetrics::from_report(&report);
    tracing::info!(
        run_id = %report.run_id,
        conclusion = %report.conclusion,
        jobs = metrics.job_count,
        failed_jobs = metrics.failed_jobs,
        duration_ms = metrics.duration.as_millis(),
        "run finished"
    );

    Ok(report)
}

/// Parses repeated `KEY=VALUE` arguments into dispatch inputs
///
/// # Errors
///
/// Returns an error for any argument without a `=`.
pub fn parse_inputs(pairs: &[String]) -> Result<HashMap<String, String>> {
    let mut inputs = HashMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("input '{pair}' is not of the form KEY=VALUE");
        };
        inputs.insert(key.to_string(), value.to_string());
    }
    Ok(inputs)
}

/// Builds the runner the configuration names
fn build_runner(config: &Config) -> Result<Box<dyn WorkflowRunner>> {
    match config.runner.as_str() {
        "local" => {
            let runner_config = LocalRunnerConfig {
                workspace_root: config.workspace_root.clone(),
                source_dir: config.source_dir.clone(),
                interpreters: config.interpreters.clone(),
                keep_workspace: config.keep_workspace,
                tail_lines: config.tail_lines,
                max_parallel: config.max_parallel,
                ..LocalRunnerConfig::default()
            };
            Ok(Box::new(LocalRunner::with_config(runner_config)))
        }
        "docker" => {
            let mut runner = ContainerRunner::new()
                .with_source_dir(config.source_dir.clone())
                .with_tail_lines(config.tail_lines);
            for (platform, image) in &config.platform_images {
                runner = runner.with_platform_image(platform.clone(), image.clone());
            }
            Ok(Box::new(runner))
        }
        "podman" => {
            let mut runner = PodmanRunner::new()
                .with_source_dir(config.source_dir.clone())
                .with_workspace_root(config.workspace_root.clone())
                .with_keep_workspace(config.keep_workspace)
                .with_tail_lines(config.tail_lines);
            for (platform, image) in &config.platform_images {
                runner = runner.with_platform_image(platform.clone(), image.clone());
            }
            Ok(Box::new(runner))
        }
        other => bail!("unknown runner '{other}' (expected local, docker or podman)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline::workflow::JobResult;
    use std::fs;
    use tempfile::TempDir;

    const WORKFLOW: &str = r#"
name: ci
on:
  pull_request:
    branches: [main]
  dispatch:
    inputs:
      suite:
        default: smoke
jobs:
  test:
    runs-on: ubuntu-22.04
    steps:
      - run: echo "suite=$FLOWLINE_INPUT_SUITE"
"#;

    fn write_workflow(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("ci.yaml");
        fs::write(&path, WORKFLOW).unwrap();
        path
    }

    fn local_options(dir: &TempDir) -> (RunOptions, PathBuf) {
        let config_path = dir.path().join("config.yaml");
        fs::write(
            &config_path,
            format!(
                "runner: local\nworkspace-root: {}\n",
                dir.path().join("work").display()
            ),
        )
        .unwrap();
        (
            RunOptions {
                config_file: Some(config_path.clone()),
                ..RunOptions::default()
            },
            config_path,
        )
    }

    #[test]
    fn test_parse_inputs() {
        let pairs = vec!["suite=full".to_string(), "target=staging=eu".to_string()];
        let inputs = parse_inputs(&pairs).unwrap();
        assert_eq!(inputs.get("suite").map(String::as_str), Some("full"));
        // only the first `=` splits
        assert_eq!(inputs.get("target").map(String::as_str), Some("staging=eu"));

        assert!(parse_inputs(&["no-equals".to_string()]).is_err());
    }

    #[test]
    fn test_run_dispatch() {
        let dir = TempDir::new().unwrap();
        let file = write_workflow(&dir);
        let (options, _config) = local_options(&dir);

        let report = run_workflow(&file, &options).unwrap();
        assert_eq!(report.conclusion, JobResult::Success);
        assert_eq!(report.jobs.len(), 1);
        assert!(report.jobs[0].steps[0].output_tail.contains("suite=smoke"));
    }

    #[test]
    fn test_run_dry_run() {
        let dir = TempDir::new().unwrap();
        let file = write_workflow(&dir);
        let (mut options, _config) = local_options(&dir);
        options.dry_run = true;

        let report = run_workflow(&file, &options).unwrap();
        assert_eq!(report.conclusion, JobResult::Success);
        assert!(report.jobs[0].steps.iter().all(|s| s.status.is_skipped()));
    }

    #[test]
    fn test_run_unmatched_event() {
        let dir = TempDir::new().unwrap();
        let file = write_workflow(&dir);
        let (mut options, _config) = local_options(&dir);
        options.event = TriggerEvent::pull_request("develop");

        let err = run_workflow(&file, &options).unwrap_err();
        assert!(err.to_string().contains("pull-request[main]"));
    }

    #[test]
    fn test_run_unknown_job_filter() {
        let dir = TempDir::new().unwrap();
        let file = write_workflow(&dir);
        let (mut options, _config) = local_options(&dir);
        options.job = Some("deploy".to_string());

        let err = run_workflow(&file, &options).unwrap_err();
        assert!(err.to_string().contains("no job 'deploy'"));
        assert!(err.to_string().contains("jobs: test"));
    }

    #[test]
    fn test_build_runner_rejects_unknown_backend() {
        let config = Config {
            runner: "kubernetes".to_string(),
            ..Config::default()
        };
        let err = build_runner(&config).unwrap_err();
        assert!(err.to_string().contains("unknown runner"));
    }

    #[test]
    fn test_build_runner_known_backends() {
        for name in ["local", "docker", "podman"] {
            let config = Config {
                runner: name.to_string(),
                ..Config::default()
            };
            assert!(build_runner(&config).is_ok(), "runner {name} should build");
        }
    }
}
