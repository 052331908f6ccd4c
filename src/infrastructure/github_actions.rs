//! GitHub Actions backend
//!
//! Writes a workflow as a GitHub Actions workflow file. The schema is
//! already GitHub-flavored so most of the mapping is direct; the step
//! `retry:` policy has no equivalent and is carried as a comment.

use crate::workflow::{Job, Step, Strategy, Validate, Workflow, WorkflowError};

/// Backend for generating GitHub Actions workflow files
pub struct GitHubActionsBackend;

impl GitHubActionsBackend {
    /// Creates a new GitHub Actions backend
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Translates a workflow to GitHub Actions workflow YAML.
    ///
    /// # Errors
    ///
    /// Returns an error when the workflow fails validation.
    pub fn translate(&self, workflow: &Workflow) -> Result<String, WorkflowError> {
        workflow.validate().map_err(WorkflowError::Validation)?;

        let mut yaml = String::new();
        yaml.push_str(&format!("name: {}\n\n", workflow.name));
        yaml.push_str(&self.translate_triggers(workflow));

        if !workflow.env.is_empty() {
            yaml.push_str("env:\n");
            for (key, value) in sorted_pairs(&workflow.env) {
                yaml.push_str(&format!("  {key}: {value}\n"));
            }
            yaml.push('\n');
        }

        yaml.push_str("jobs:\n");
        for (id, job) in &workflow.jobs {
            yaml.push_str(&self.translate_job(id, job));
        }

        Ok(yaml)
    }

    #[allow(clippy::unused_self)]
    fn translate_triggers(&self, workflow: &Workflow) -> String {
        let mut yaml = String::from("on:\n");

        if let Some(pr) = &workflow.on.pull_request {
            if pr.branches.is_empty() {
                yaml.push_str("  pull_request: {}\n");
            } else {
                yaml.push_str("  pull_request:\n");
                yaml.push_str(&format!("    branches: [{}]\n", pr.branches.join(", ")));
            }
        }

        if let Some(dispatch) = &workflow.on.dispatch {
            if dispatch.inputs.is_empty() {
                yaml.push_str("  workflow_dispatch: {}\n");
            } else {
                yaml.push_str("  workflow_dispatch:\n");
                yaml.push_str("    inputs:\n");
                for (name, input) in sorted_pairs(&dispatch.inputs) {
                    yaml.push_str(&format!("      {name}:\n"));
                    if let Some(description) = &input.description {
                        yaml.push_str(&format!("        description: {description}\n"));
                    }
                    if input.required {
                        yaml.push_str("        required: true\n");
                    }
                    if let Some(default) = &input.default {
                        yaml.push_str(&format!("        default: \"{default}\"\n"));
                    }
                }
            }
        }

        yaml.push('\n');
        yaml
    }

    fn translate_job(&self, id: &str, job: &Job) -> String {
        let mut yaml = String::new();

        yaml.push_str(&format!("  {id}:\n"));
        if let Some(name) = &job.name {
            yaml.push_str(&format!("    name: {name}\n"));
        }
        yaml.push_str(&format!("    runs-on: {}\n", job.runs_on));

        if !job.needs.is_empty() {
            yaml.push_str(&format!("    needs: [{}]\n", job.needs.join(", ")));
        }

        if let Some(strategy) = &job.strategy {
            yaml.push_str(&self.translate_strategy(strategy));
        }

        if let Some(minutes) = job.timeout_minutes {
            yaml.push_str(&format!("    timeout-minutes: {minutes}\n"));
        }

        if !job.env.is_empty() {
            yaml.push_str("    env:\n");
            for (key, value) in sorted_pairs(&job.env) {
                yaml.push_str(&format!("      {key}: {value}\n"));
            }
        }

        yaml.push_str("    steps:\n");
        for step in &job.steps {
            yaml.push_str(&self.translate_step(step));
        }

        yaml
    }

    #[allow(clippy::unused_self)]
    fn translate_strategy(&self, strategy: &Strategy) -> String {
        let mut yaml = String::from("    strategy:\n");

        if !strategy.fail_fast {
            yaml.push_str("      fail-fast: false\n");
        }
        if let Some(limit) = strategy.max_parallel {
            yaml.push_str(&format!("      max-parallel: {limit}\n"));
        }

        if let Some(matrix) = &strategy.matrix {
            yaml.push_str("      matrix:\n");
            for axis in &matrix.axes {
                let values: Vec<String> =
                    axis.values.iter().map(|v| format!("\"{v}\"")).collect();
                yaml.push_str(&format!("        {}: [{}]\n", axis.name, values.join(", ")));
            }
            if !matrix.include.is_empty() {
                yaml.push_str("        include:\n");
                for entry in &matrix.include {
                    yaml.push_str(&render_matrix_entry(entry));
                }
            }
            if !matrix.exclude.is_empty() {
                yaml.push_str("        exclude:\n");
                for entry in &matrix.exclude {
                    yaml.push_str(&render_matrix_entry(entry));
                }
            }
        }

        yaml
    }

    #[allow(clippy::unused_self)]
    fn translate_step(&self, step: &Step) -> String {
        let mut lines: Vec<String> = Vec::new();

        if let Some(name) = &step.name {
            lines.push(format!("name: {name}"));
        }

        if let Some(uses) = &step.uses {
            lines.push(format!("uses: {uses}"));
            if !step.with.is_empty() {
                lines.push("with:".to_string());
                for (key, value) in sorted_pairs(&step.with) {
                    lines.push(format!("  {key}: \"{value}\""));
                }
            }
        }

        if let Some(run) = &step.run {
            if run.contains('\n') {
                lines.push("run: |".to_string());
                for line in run.lines() {
                    lines.push(format!("  {line}"));
                }
            } else {
                lines.push(format!("run: {run}"));
            }
            if let Some(shell) = &step.shell {
                lines.push(format!("shell: {shell}"));
            }
            if let Some(dir) = &step.working_directory {
                lines.push(format!("working-directory: {dir}"));
            }
        }

        if !step.env.is_empty() {
            lines.push("env:".to_string());
            for (key, value) in sorted_pairs(&step.env) {
                lines.push(format!("  {key}: {value}"));
            }
        }

        if step.continue_on_error {
            lines.push("continue-on-error: true".to_string());
        }
        if let Some(minutes) = step.timeout_minutes {
            lines.push(format!("timeout-minutes: {minutes}"));
        }
        if let Some(retry) = &step.retry {
            lines.push(format!(
                "# retried {} times by flowline; no GitHub Actions equivalent",
                retry.attempts
            ));
        }

        let mut yaml = String::new();
        for (index, line) in lines.iter().enumerate() {
            if index == 0 {
                yaml.push_str(&format!("      - {line}\n"));
            } else {
                yaml.push_str(&format!("        {line}\n"));
            }
        }
        yaml
    }
}

impl Default for GitHubActionsBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn render_matrix_entry(entry: &std::collections::HashMap<String, String>) -> String {
    let mut yaml = String::new();
    for (index, (key, value)) in sorted_pairs(entry).into_iter().enumerate() {
        if index == 0 {
            yaml.push_str(&format!("          - {key}: \"{value}\"\n"));
        } else {
            yaml.push_str(&format!("            {key}: \"{value}\"\n"));
        }
    }
    yaml
}

/// Deterministic iteration order for map-backed sections
fn sorted_pairs<V>(map: &std::collections::HashMap<String, V>) -> Vec<(&String, &V)> {
    let mut pairs: Vec<_> = map.iter().collect();
    pairs.sort_by_key(|(key, _)| key.as_str());
    pairs
}
