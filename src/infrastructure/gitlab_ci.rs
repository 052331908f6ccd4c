//! GitLab CI backend
//!
//! Translates a workflow to a GitLab CI configuration. Jobs become GitLab
//! jobs with one stage each, ordered by the dependency graph; the matrix
//! maps to `parallel:matrix`, `runs-on` to runner tags, and `${{ … }}`
//! expressions to `$VAR` references. Action steps have no GitLab
//! equivalent and are carried as comments.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::workflow::{Job, Matrix, Step, Validate, Workflow, WorkflowError};

/// `${{ matrix.x }}` / `${{ env.x }}` references in exported commands
static EXPRESSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{\{\s*(matrix|env)\.([A-Za-z_][A-Za-z0-9_-]*)\s*\}\}").unwrap()
});

/// Backend for generating GitLab CI configuration
pub struct GitLabCIBackend;

impl GitLabCIBackend {
    /// Creates a new GitLab CI backend
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Translates a workflow to GitLab CI YAML.
    ///
    /// # Errors
    ///
    /// Returns an error when the workflow fails validation.
    pub fn translate(&self, workflow: &Workflow) -> Result<String, WorkflowError> {
        workflow.validate().map_err(WorkflowError::Validation)?;
        let order = workflow
            .execution_order()
            .map_err(WorkflowError::Validation)?;

        let mut yaml = String::new();
        yaml.push_str(&format!("# Generated from workflow '{}'\n", workflow.name));
        yaml.push_str(&self.translate_rules(workflow));

        if !workflow.env.is_empty() {
            yaml.push_str("variables:\n");
            for (key, value) in sorted_pairs(&workflow.env) {
                yaml.push_str(&format!("  {key}: \"{value}\"\n"));
            }
            yaml.push('\n');
        }

        yaml.push_str("stages:\n");
        for job_id in &order {
            yaml.push_str(&format!("  - {job_id}\n"));
        }
        yaml.push('\n');

        for job_id in &order {
            if let Some(job) = workflow.job(job_id) {
                yaml.push_str(&self.translate_job(job_id, job));
                yaml.push('\n');
            }
        }

        Ok(yaml)
    }

    /// Maps the workflow triggers onto pipeline-level rules
    #[allow(clippy::unused_self)]
    fn translate_rules(&self, workflow: &Workflow) -> String {
        let mut conditions = Vec::new();

        if let Some(pr) = &workflow.on.pull_request {
            if pr.branches.is_empty() {
                conditions.push("$CI_PIPELINE_SOURCE == \"merge_request_event\"".to_string());
            } else {
                for branch in &pr.branches {
                    conditions.push(format!(
                        "$CI_PIPELINE_SOURCE == \"merge_request_event\" && $CI_MERGE_REQUEST_TARGET_BRANCH_NAME == \"{branch}\""
                    ));
                }
            }
        }
        if workflow.on.dispatch.is_some() {
            conditions.push("$CI_PIPELINE_SOURCE == \"web\"".to_string());
        }

        if conditions.is_empty() {
            return String::new();
        }

        let mut yaml = String::from("workflow:\n  rules:\n");
        for condition in conditions {
            yaml.push_str(&format!("    - if: {condition}\n"));
        }
        yaml.push('\n');
        yaml
    }

    fn translate_job(&self, job_id: &str, job: &Job) -> String {
        let mut yaml = String::new();

        yaml.push_str(&format!("{job_id}:\n"));
        yaml.push_str(&format!("  stage: {job_id}\n"));

        let tags = rewrite_expressions(&job.runs_on);
        yaml.push_str(&format!("  tags: [{tags}]\n"));

        if !job.needs.is_empty() {
            yaml.push_str(&format!("  needs: [{}]\n", job.needs.join(", ")));
        }

        if let Some(minutes) = job.timeout_minutes {
            yaml.push_str(&format!("  timeout: {minutes}m\n"));
        }

        // GitLab retries whole jobs, capped at 2 attempts
        if let Some(retry) = job.steps.iter().find_map(|step| step.retry.as_ref()) {
            let max = retry.attempts.saturating_sub(1).min(2);
            if max > 0 {
                yaml.push_str("  retry:\n");
                yaml.push_str(&format!("    max: {max}\n"));
            }
        }

        if let Some(matrix) = job.matrix() {
            yaml.push_str(&self.translate_matrix(job_id, job, matrix));
        }

        if !job.env.is_empty() {
            yaml.push_str("  variables:\n");
            for (key, value) in sorted_pairs(&job.env) {
                yaml.push_str(&format!("    {key}: \"{}\"\n", rewrite_expressions(value)));
            }
        }

        yaml.push_str("  script:\n");
        let mut runnable = 0;
        for step in &job.steps {
            let rendered = self.translate_step(step);
            if !rendered.starts_with("    #") {
                runnable += 1;
            }
            yaml.push_str(&rendered);
        }
        if runnable == 0 {
            yaml.push_str("    - echo \"no runnable steps\"\n");
        }

        yaml
    }

    /// Maps the matrix to `parallel:matrix`.
    ///
    /// Plain axes export directly. With `exclude`/`include` present the
    /// expanded instances are listed one by one, since GitLab has no
    /// exclusion vocabulary.
    #[allow(clippy::unused_self)]
    fn translate_matrix(&self, job_id: &str, job: &Job, matrix: &Matrix) -> String {
        let mut yaml = String::from("  parallel:\n    matrix:\n");

        if matrix.exclude.is_empty() && matrix.include.is_empty() {
            let mut first = true;
            for axis in &matrix.axes {
                let marker = if first { "-" } else { " " };
                first = false;
                let values: Vec<String> =
                    axis.values.iter().map(|v| format!("\"{v}\"")).collect();
                yaml.push_str(&format!(
                    "      {marker} {}: [{}]\n",
                    axis_variable(&axis.name),
                    values.join(", ")
                ));
            }
            return yaml;
        }

        match job.instances(job_id) {
            Ok(instances) => {
                for instance in instances {
                    let mut first = true;
                    for (key, value) in instance.matrix.pairs() {
                        let marker = if first { "-" } else { " " };
                        first = false;
                        yaml.push_str(&format!(
                            "      {marker} {}: \"{value}\"\n",
                            axis_variable(key)
                        ));
                    }
                }
            }
            Err(_) => {
                yaml.push_str("      # matrix could not be expanded\n");
            }
        }
        yaml
    }

    #[allow(clippy::unused_self)]
    fn translate_step(&self, step: &Step) -> String {
        if let Some(uses) = &step.uses {
            return format!("    # uses: {uses} (no GitLab equivalent)\n");
        }

        let Some(run) = &step.run else {
            return "    # step with neither 'uses' nor 'run'\n".to_string();
        };

        let mut yaml = String::new();
        for (key, value) in sorted_pairs(&step.env) {
            yaml.push_str(&format!(
                "    - export {key}=\"{}\"\n",
                rewrite_expressions(value)
            ));
        }

        let command = rewrite_expressions(run);
        let command = match &step.working_directory {
            Some(dir) => format!("(cd {dir} && {command})"),
            None => command,
        };

        if command.contains('\n') {
            yaml.push_str("    - |\n");
            for line in command.lines() {
                yaml.push_str(&format!("      {line}\n"));
            }
        } else {
            yaml.push_str(&format!("    - {command}\n"));
        }
        yaml
    }
}

impl Default for GitLabCIBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// GitLab variable name for a matrix axis
fn axis_variable(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Rewrites `${{ matrix.x }}` / `${{ env.x }}` to `$VAR` references
fn rewrite_expressions(input: &str) -> String {
    EXPRESSION
        .replace_all(input, |captures: &regex::Captures<'_>| {
            let name = &captures[2];
            if &captures[1] == "matrix" {
                format!("${}", axis_variable(name))
            } else {
                format!("${name}")
            }
        })
        .into_owned()
}

fn sorted_pairs(map: &std::collections::HashMap<String, String>) -> Vec<(&String, &String)> {
    let mut pairs: Vec<_> = map.iter().collect();
    pairs.sort_by_key(|(key, _)| key.as_str());
    pairs
}
