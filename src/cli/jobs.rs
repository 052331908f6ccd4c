//! `flowline jobs` - List the expanded matrix job instances

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use flowline::workflow::Workflow;

/// Output format for the instance listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobsFormat {
    /// Human-readable listing
    Text,
    /// Pretty-printed JSON array
    Json,
}

/// One expanded instance, as reported to the user
#[derive(Debug, Clone, Serialize)]
struct InstanceRow {
    job_id: String,
    name: String,
    runs_on: String,
    steps: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    needs: Vec<String>,
}

/// Lists the concrete job instances a workflow expands into
///
/// # Errors
///
/// Returns an error when the file cannot be loaded or the matrix does not
/// expand (cycles, unknown axis references).
pub fn list_jobs(file: &Path, format: JobsFormat) -> Result<String> {
    let workflow = Workflow::load(file)
        .with_context(|| format!("Failed to load workflow: {}", file.display()))?;

    let rows: Vec<InstanceRow> = workflow
        .expand_jobs()
        .with_context(|| format!("Failed to expand jobs of '{}'", workflow.name))?
        .into_iter()
        .map(|instance| InstanceRow {
            job_id: instance.job_id,
            name: instance.name,
            runs_on: instance.runs_on,
            steps: instance.job.steps.len(),
            needs: instance.job.needs,
        })
        .collect();

    match format {
        JobsFormat::Json => {
            serde_json::to_string_pretty(&rows).context("Failed to serialize instances")
        }
        JobsFormat::Text => Ok(render_text(&workflow.name, &rows)),
    }
}

fn render_text(workflow: &str, rows: &[InstanceRow]) -> String {
    let mut out = format!("{workflow}: {} job instances\n", rows.len());
    for row in rows {
        out.push_str(&format!(
            "  {} [{}] {} steps",
            row.name, row.runs_on, row.steps
        ));
        if !row.needs.is_empty() {
            out.push_str(&format!(" (needs {})", row.needs.join(", ")));
        }
        out.push('\n');
    }
    out
}
