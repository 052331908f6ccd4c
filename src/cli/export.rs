//! `flowline export` - Convert workflows to hosted CI formats

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use flowline::infrastructure::{GitHubActionsBackend, GitLabCIBackend};
use flowline::workflow::Workflow;

/// Target CI system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// GitHub Actions workflow YAML
    GitHubActions,
    /// GitLab CI pipeline YAML
    GitLabCI,
}

/// Translates a workflow file into the named CI system's format
///
/// # Errors
///
/// Returns an error when the file cannot be loaded or the workflow does
/// not validate; the exporters refuse invalid input.
pub fn export_workflow(file: &Path, format: ExportFormat) -> Result<String> {
    let workflow = Workflow::load(file)
        .with_context(|| format!("Failed to load workflow: {}", file.display()))?;

    let exported = match format {
        ExportFormat::GitHubActions => GitHubActionsBackend::new().translate(&workflow),
        ExportFormat::GitLabCI => GitLabCIBackend::new().translate(&workflow),
    }
    .with_context(|| format!("Failed to export workflow '{}'", workflow.name))?;

    Ok(exported)
}

/// Writes an exported workflow to the given path
///
/// # Errors
///
/// Returns an error when the file cannot be written.
pub fn save_export(content: &str, output_path: &Path) -> Result<()> {
    fs::write(output_path, content)
        .with_context(|| format!("Failed to write export to: {}", output_path.display()))?;
    Ok(())
}
