//! Run workspaces
//!
//! Every run gets its own directory tree under the configured workspace
//! root, one subdirectory per job instance with a working directory and a
//! log directory. The tree is removed when the workspace is dropped unless
//! the run asked to keep it.

use std::fs;
use std::path::{Path, PathBuf};

/// Directory tree for a single workflow run
///
/// # Example
///
/// ```rust
/// use flowline::runner::RunWorkspace;
/// use tempfile::TempDir;
///
/// let base = TempDir::new().unwrap();
/// let workspace = RunWorkspace::create(base.path(), "run-1", false).unwrap();
///
/// let job_dir = workspace.job_dir("test (ubuntu-22.04, 3.10)").unwrap();
/// assert!(job_dir.exists());
/// ```
#[derive(Debug)]
pub struct RunWorkspace {
    /// Root directory of this run
    root: PathBuf,

    /// Leave the tree on disk after the run
    keep: bool,
}

impl RunWorkspace {
    /// Creates the workspace root for a run
    ///
    /// # Errors
    ///
    /// Returns `std::io::Error` if the directory cannot be created
    pub fn create(base: impl Into<PathBuf>, run_id: &str, keep: bool) -> std::io::Result<Self> {
        let root = base.into().join(run_id);
        fs::create_dir_all(&root)?;
        Ok(Self { root, keep })
    }

    /// The root directory of this run
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the tree survives the drop
    #[must_use]
    pub fn is_kept(&self) -> bool {
        self.keep
    }

    /// Creates and returns the working directory for a job instance
    ///
    /// # Errors
    ///
    /// Returns `std::io::Error` if the directory cannot be created
    pub fn job_dir(&self, instance: &str) -> std::io::Result<PathBuf> {
        let dir = self.root.join(sanitize(instance)).join("workspace");
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Writes the captured output of a step to the instance's log directory
    ///
    /// # Errors
    ///
    /// Returns `std::io::Error` if the log cannot be written
    pub fn write_step_log(
        &self,
        instance: &str,
        index: usize,
        step_name: &str,
        contents: &str,
    ) -> std::io::Result<PathBuf> {
        let logs = self.root.join(sanitize(instance)).join("logs");
        fs::create_dir_all(&logs)?;
        let path = logs.join(format!("{:02}-{}.log", index, sanitize(step_name)));
        fs::write(&path, contents)?;
        Ok(path)
    }
}

impl Drop for RunWorkspace {
    fn drop(&mut self) {
        if !self.keep {
            let _ = fs::remove_dir_all(&self.root);
        }
    }
}

/// Turns an instance or step name into a safe directory or container name
pub(crate) fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
            out.push(c);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    out.trim_matches('-').to_string()
}
