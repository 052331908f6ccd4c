//! `flowline completions` - Generate shell completions
//!
//! Supports bash, zsh, fish, and PowerShell. The generated script covers
//! every subcommand and flag of the real CLI.

use anyhow::{Context, Result};
use clap_complete::Shell;
use std::fs;
use std::path::Path;

/// Renders the completion script for the given shell
///
/// # Errors
///
/// Returns an error when the generated script is not valid UTF-8.
pub fn generate_completions(shell: Shell) -> Result<String> {
    use clap_complete::generate;

    let mut cmd = super::build_cli();
    let mut buf = Vec::new();
    generate(shell, &mut cmd, "flowline", &mut buf);

    String::from_utf8(buf).context("Failed to generate completions")
}

/// Writes a completion script to the given path
///
/// # Errors
///
/// Returns an error when the file cannot be written.
pub fn save_completions(completions: &str, output_path: &Path) -> Result<()> {
    fs::write(output_path, completions)
        .with_context(|| format!("Failed to write completions to: {}", output_path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_bash_completions() {
        let completions = generate_completions(Shell::Bash).unwrap();
        assert!(!completions.is_empty());
        assert!(completions.contains("flowline"));
    }

    #[test]
    fn test_generate_zsh_completions() {
        let completions = generate_completions(Shell::Zsh).unwrap();
        assert!(!completions.is_empty());
        assert!(completions.contains("flowline"));
    }

    #[test]
    fn test_completions_cover_subcommands() {
        let completions = generate_completions(Shell::Bash).unwrap();
        for subcommand in ["check", "lint", "jobs", "run", "doc", "export"] {
            assert!(
                completions.contains(subcommand),
                "missing completion for {subcommand}"
            );
        }
    }

    #[test]
    fn test_save_completions() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("flowline.bash");
        save_completions("complete -F _flowline flowline", &path).unwrap();
        assert!(path.exists());
    }
}
