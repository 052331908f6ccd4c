//! Configuration management
//!
//! Runner configuration assembled in layers: built-in defaults, then an
//! optional YAML config file, then `FLOWLINE_*` environment variables.
//! CLI flags are applied on top by the caller.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::workflow::WorkflowError;

/// Config file picked up from the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = ".flowline.yaml";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Default runner (`local`, `docker` or `podman`)
    pub runner: String,
    /// Directory that holds per-run workspaces
    pub workspace_root: PathBuf,
    /// Project source directory used by `actions/checkout`
    pub source_dir: PathBuf,
    /// `runs-on` label to container image mappings
    pub platform_images: HashMap<String, String>,
    /// Python version to interpreter path mappings
    pub interpreters: HashMap<String, String>,
    /// Log level
    pub log_level: String,
    /// Matrix instances run at once per job
    pub max_parallel: usize,
    /// Keep run workspaces on disk after the run
    pub keep_workspace: bool,
    /// Output lines kept per step in the report
    pub tail_lines: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            runner: "local".to_string(),
            workspace_root: std::env::temp_dir().join("flowline"),
            source_dir: PathBuf::from("."),
            platform_images: HashMap::new(),
            interpreters: HashMap::new(),
            log_level: "info".to_string(),
            max_parallel: 4,
            keep_workspace: false,
            tail_lines: 20,
        }
    }
}

/// Partial configuration as it appears in a config file
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ConfigOverlay {
    runner: Option<String>,
    workspace_root: Option<PathBuf>,
    source_dir: Option<PathBuf>,
    #[serde(default)]
    platform_images: HashMap<String, String>,
    #[serde(default)]
    interpreters: HashMap<String, String>,
    log_level: Option<String>,
    max_parallel: Option<usize>,
    keep_workspace: Option<bool>,
    tail_lines: Option<usize>,
}

impl Config {
    /// Loads configuration from the standard layers.
    ///
    /// A config file named explicitly must exist; the default
    /// `.flowline.yaml` is only read when present.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed, or when a
    /// `FLOWLINE_*` variable holds an unusable value.
    pub fn load(path: Option<&Path>) -> Result<Self, WorkflowError> {
        let mut config = Self::default();

        if let Some(path) = path {
            config.apply_file(path)?;
        } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
            config.apply_file(Path::new(DEFAULT_CONFIG_FILE))?;
        }

        config.apply_env_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), WorkflowError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            WorkflowError::RunnerConfig(format!("could not read config {}: {e}", path.display()))
        })?;
        let overlay: ConfigOverlay = serde_yaml::from_str(&text).map_err(|e| {
            WorkflowError::RunnerConfig(format!("could not parse config {}: {e}", path.display()))
        })?;
        self.apply_overlay(overlay);
        Ok(())
    }

    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        if let Some(runner) = overlay.runner {
            self.runner = runner;
        }
        if let Some(root) = overlay.workspace_root {
            self.workspace_root = root;
        }
        if let Some(dir) = overlay.source_dir {
            self.source_dir = dir;
        }
        self.platform_images.extend(overlay.platform_images);
        self.interpreters.extend(overlay.interpreters);
        if let Some(level) = overlay.log_level {
            self.log_level = level;
        }
        if let Some(parallel) = overlay.max_parallel {
            self.max_parallel = parallel.max(1);
        }
        if let Some(keep) = overlay.keep_workspace {
            self.keep_workspace = keep;
        }
        if let Some(lines) = overlay.tail_lines {
            self.tail_lines = lines;
        }
    }

    fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), WorkflowError> {
        if let Some(runner) = lookup("FLOWLINE_RUNNER") {
            self.runner = runner;
        }
        if let Some(root) = lookup("FLOWLINE_WORKSPACE_ROOT") {
            self.workspace_root = PathBuf::from(root);
        }
        if let Some(dir) = lookup("FLOWLINE_SOURCE_DIR") {
            self.source_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup("FLOWLINE_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(parallel) = lookup("FLOWLINE_MAX_PARALLEL") {
            let parallel: usize = parallel.parse().map_err(|_| {
                WorkflowError::RunnerConfig(format!(
                    "FLOWLINE_MAX_PARALLEL must be a number, got '{parallel}'"
                ))
            })?;
            self.max_parallel = parallel.max(1);
        }
        if let Some(keep) = lookup("FLOWLINE_KEEP_WORKSPACE") {
            self.keep_workspace = parse_bool("FLOWLINE_KEEP_WORKSPACE", &keep)?;
        }
        if let Some(lines) = lookup("FLOWLINE_TAIL_LINES") {
            self.tail_lines = lines.parse().map_err(|_| {
                WorkflowError::RunnerConfig(format!(
                    "FLOWLINE_TAIL_LINES must be a number, got '{lines}'"
                ))
            })?;
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, WorkflowError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(WorkflowError::RunnerConfig(format!(
            "{key} must be a boolean, got '{other}'"
        ))),
    }
}
