//! `flowline doc` - Summarize a workflow as documentation

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

use flowline::workflow::{StepKind, Workflow};

/// Documentation model extracted from a workflow
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowDoc {
    /// Workflow name
    pub name: String,
    /// Human-readable trigger list
    pub triggers: String,
    /// Declared dispatch inputs, sorted by name
    pub inputs: Vec<InputDoc>,
    /// Workflow-level environment, sorted by key
    pub env: Vec<String>,
    /// Jobs in declaration order
    pub jobs: Vec<JobDoc>,
}

/// A declared dispatch input
#[derive(Debug, Clone, Serialize)]
pub struct InputDoc {
    /// Input name
    pub name: String,
    /// What the input is for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Value used when none is provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Whether a value must be available at dispatch time
    pub required: bool,
}

/// One job of the workflow
#[derive(Debug, Clone, Serialize)]
pub struct JobDoc {
    /// The job's key in the workflow
    pub id: String,
    /// Platform label
    pub runs_on: String,
    /// Jobs this one waits for
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,
    /// Matrix axes as `name: v1, v2` lines
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matrix: Vec<String>,
    /// Concrete instances after expansion
    pub instances: usize,
    /// Steps in execution order
    pub steps: Vec<StepDoc>,
}

/// One step of a job
#[derive(Debug, Clone, Serialize)]
pub struct StepDoc {
    /// Display name
    pub name: String,
    /// `uses` or `run`
    pub kind: String,
    /// The action reference or the command's first line
    pub detail: String,
}

/// Output format for `flowline doc`
#[derive(Debug, Clone, Copy)]
pub enum DocFormat {
    /// Markdown suitable for a README
    Markdown,
    /// Pretty-printed JSON
    Json,
}

/// Renders a workflow file as documentation
///
/// # Errors
///
/// Returns an error when the file cannot be loaded or the matrix does not
/// expand.
pub fn generate_doc(file: &Path, format: DocFormat) -> Result<String> {
    let workflow = Workflow::load(file)
        .with_context(|| format!("Failed to load workflow: {}", file.display()))?;

    let doc = describe_workflow(&workflow)?;

    match format {
        DocFormat::Markdown => Ok(render_markdown(&doc)),
        DocFormat::Json => Ok(render_json(&doc)),
    }
}

/// Builds the documentation model for a parsed workflow
fn describe_workflow(workflow: &Workflow) -> Result<WorkflowDoc> {
    let mut inputs = Vec::new();
    if let Some(dispatch) = &workflow.on.dispatch {
        let mut names: Vec<&String> = dispatch.inputs.keys().collect();
        names.sort();
        for name in names {
            let spec = &dispatch.inputs[name];
            inputs.push(InputDoc {
                name: name.clone(),
                description: spec.description.clone(),
                default: spec.default.clone(),
                required: spec.required,
            });
        }
    }

    let mut env_keys: Vec<&String> = workflow.env.keys().collect();
    env_keys.sort();
    let env = env_keys
        .into_iter()
        .map(|key| format!("{key}={}", workflow.env[key]))
        .collect();

    let mut jobs = Vec::new();
    for (id, job) in &workflow.jobs {
        let matrix = job.matrix().map_or_else(Vec::new, |matrix| {
            matrix
                .axes
                .iter()
                .map(|axis| format!("{}: {}", axis.name, axis.values.join(", ")))
                .collect()
        });

        let instances = job
            .instances(id)
            .with_context(|| format!("Failed to expand job '{id}'"))?
            .len();

        let steps = job
            .steps
            .iter()
            .map(|step| {
                let (kind, detail) = match step.kind() {
                    Some(StepKind::Uses(reference)) => ("uses", reference.to_string()),
                    Some(StepKind::Run(command)) => {
                        ("run", command.lines().next().unwrap_or_default().to_string())
                    }
                    None => ("invalid", String::new()),
                };
                StepDoc {
                    name: step.display_name(),
                    kind: kind.to_string(),
                    detail,
                }
            })
            .collect();

        jobs.push(JobDoc {
            id: id.clone(),
            runs_on: job.runs_on.clone(),
            needs: job.needs.clone(),
            matrix,
            instances,
            steps,
        });
    }

    Ok(WorkflowDoc {
        name: workflow.name.clone(),
        triggers: workflow.on.describe(),
        inputs,
        env,
        jobs,
    })
}

fn render_markdown(doc: &WorkflowDoc) -> String {
    let mut output = String::new();

    output.push_str(&format!("# {}\n\n", doc.name));
    output.push_str(&format!("Triggers: {}\n\n", doc.triggers));

    if !doc.inputs.is_empty() {
        output.push_str("## Dispatch inputs\n\n");
        for input in &doc.inputs {
            output.push_str(&format!("- **{}**", input.name));
            if input.required {
                output.push_str(" (required)");
            }
            if let Some(description) = &input.description {
                output.push_str(&format!(": {description}"));
            }
            if let Some(default) = &input.default {
                output.push_str(&format!(" [default: `{default}`]"));
            }
            output.push('\n');
        }
        output.push('\n');
    }

    if !doc.env.is_empty() {
        output.push_str("## Environment\n\n");
        for entry in &doc.env {
            output.push_str(&format!("- `{entry}`\n"));
        }
        output.push('\n');
    }

    output.push_str("## Jobs\n\n");
    for job in &doc.jobs {
        output.push_str(&format!("### {}\n\n", job.id));
        output.push_str(&format!("Runs on `{}`", job.runs_on));
        if !job.needs.is_empty() {
            output.push_str(&format!(" after {}", job.needs.join(", ")));
        }
        output.push_str(".\n");
        if !job.matrix.is_empty() {
            output.push_str(&format!(
                "Matrix over {} ({} instances).\n",
                job.matrix.join("; "),
                job.instances
            ));
        }
        output.push('\n');
        for step in &job.steps {
            if step.name == step.detail {
                output.push_str(&format!("- `{}`\n", step.detail));
            } else {
                output.push_str(&format!("- {}: `{}`\n", step.name, step.detail));
            }
        }
        output.push('\n');
    }

    output
}

fn render_json(doc: &WorkflowDoc) -> String {
    serde_json::to_string_pretty(doc).unwrap_or_else(|_| "{}".to_string())
}

/// Writes rendered documentation to the given path
///
/// # Errors
///
/// Returns an error when the file cannot be written.
pub fn save_doc(doc: &str, output_path: &Path) -> Result<()> {
    fs::write(output_path, doc).with_context(|| {
        format!(
            "Failed to write documentation to: {}",
            output_path.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const WORKFLOW: &str = r#"
name: integration
on:
  pull_request:
    branches: [main]
  dispatch:
    inputs:
      suite:
        description: Test suite to run
        default: smoke
env:
  PYTHONUNBUFFERED: "1"
jobs:
  test:
    runs-on: ubuntu-22.04
    strategy:
      matrix:
        python: ["3.10", "3.11"]
    steps:
      - uses: actions/checkout@v4
      - name: Unit tests
        run: |
          tox -e py
          tox -e report
"#;

    fn write_workflow(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("ci.yaml");
        fs::write(&path, WORKFLOW).unwrap();
        path
    }

    #[test]
    fn test_markdown_summary() {
        let dir = TempDir::new().unwrap();
        let markdown = generate_doc(&write_workflow(&dir), DocFormat::Markdown).unwrap();

        assert!(markdown.contains("# integration"));
        assert!(markdown.contains("Triggers: pull-request[main], dispatch"));
        assert!(markdown.contains("- **suite**: Test suite to run [default: `smoke`]"));
        assert!(markdown.contains("- `PYTHONUNBUFFERED=1`"));
        assert!(markdown.contains("### test"));
        assert!(markdown.contains("Matrix over python: 3.10, 3.11 (2 instances)."));
        assert!(markdown.contains("- `actions/checkout@v4`"));
        assert!(markdown.contains("- Unit tests: `tox -e py`"));
    }

    #[test]
    fn test_json_summary() {
        let dir = TempDir::new().unwrap();
        let json = generate_doc(&write_workflow(&dir), DocFormat::Json).unwrap();

        assert!(json.contains("\"name\": \"integration\""));
        assert!(json.contains("\"instances\": 2"));
        assert!(json.contains("\"kind\": \"uses\""));
    }

    #[test]
    fn test_save_doc() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("README.md");
        save_doc("# hello\n", &out).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "# hello\n");
    }
}
