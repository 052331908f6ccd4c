//! `flowline check` - Parse and validate workflow files
//!
//! Loads a workflow file, runs schema validation and matrix expansion, and
//! reports the result. The exit code is the contract: 0 for a valid file,
//! 1 for anything else.
//!
//! ## Usage
//!
//! ```bash
//! flowline check <workflow.yaml>
//! ```
//!
//! ## Example
//!
//! ```bash
//! flowline check .flowline/ci.yaml
//! # Exit code 0: workflow is valid
//! # Exit code 1: parse or validation error
//! ```

use anyhow::{Context, Result};
use std::path::Path;

use flowline::workflow::{Validate, Workflow};

/// Validate a workflow file
///
/// Parses the file, validates the workflow and expands its matrices. With
/// `quiet` set, nothing is printed and only the exit code speaks.
///
/// # Errors
///
/// Returns an error when the file cannot be read, the YAML does not parse,
/// validation fails, or matrix expansion fails.
pub fn check_workflow(file: &Path, quiet: bool) -> Result<()> {
    let workflow = Workflow::load(file)
        .with_context(|| format!("Failed to load workflow: {}", file.display()))?;

    workflow
        .validate()
        .with_context(|| format!("Workflow '{}' is invalid", workflow.name))?;

    // Expansion can still fail on malformed expressions validation
    // does not see, so it is part of the check.
    let instances = workflow
        .expand_jobs()
        .with_context(|| format!("Workflow '{}' does not expand", workflow.name))?;

    if !quiet {
        println!("✓ {} is valid", file.display());
        println!("  workflow: {}", workflow.name);
        println!("  triggers: {}", workflow.on.describe());
        println!(
            "  jobs: {} ({} instances after matrix expansion)",
            workflow.job_count(),
            instances.len()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const VALID: &str = r#"
name: ci
on:
  dispatch: {}
jobs:
  test:
    runs-on: ubuntu-22.04
    steps:
      - run: echo hello
"#;

    fn write_workflow(dir: &TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("workflow.yaml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_check_valid_workflow() {
        let dir = TempDir::new().unwrap();
        let path = write_workflow(&dir, VALID);
        assert!(check_workflow(&path, true).is_ok());
        assert!(check_workflow(&path, false).is_ok());
    }

    #[test]
    fn test_check_missing_file() {
        let result = check_workflow(Path::new("/nonexistent/workflow.yaml"), true);
        assert!(result.is_err());
    }

    #[test]
    fn test_check_rejects_workflow_without_triggers() {
        let dir = TempDir::new().unwrap();
        let path = write_workflow(
            &dir,
            "name: ci\njobs:\n  test:\n    runs-on: linux\n    steps:\n      - run: ls\n",
        );
        let err = check_workflow(&path, true).unwrap_err();
        assert!(format!("{err:#}").contains("invalid"));
    }

    #[test]
    fn test_check_rejects_unparseable_yaml() {
        let dir = TempDir::new().unwrap();
        let path = write_workflow(&dir, "name: [unclosed");
        assert!(check_workflow(&path, true).is_err());
    }
}
