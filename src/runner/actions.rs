//! Built-in actions and the action registry
//!
//! `uses:` steps resolve against an [`ActionRegistry`]. The two built-ins
//! cover the usual opening of a job: `actions/checkout` copies the project
//! source into the job workspace, and `actions/setup-python` resolves an
//! interpreter version and exports it to later steps.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::workflow::WorkflowError;

/// Context handed to an action when it runs
///
/// Carries the step's interpolated `with:` inputs, the job environment the
/// action may export into, and the directories it is allowed to touch.
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// `with:` inputs of the step, already interpolated
    pub inputs: HashMap<String, String>,

    /// Environment for this and later steps of the job
    pub env: HashMap<String, String>,

    /// Working directory of the job instance
    pub workspace: PathBuf,

    /// Project source directory, read by `actions/checkout`
    pub source_dir: PathBuf,

    /// Interpreter version table, consulted by `actions/setup-python`
    pub interpreters: HashMap<String, String>,
}

impl ActionContext {
    /// Creates a context rooted at the given workspace directory
    #[must_use]
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            inputs: HashMap::new(),
            env: HashMap::new(),
            workspace: workspace.into(),
            source_dir: std::env::current_dir().unwrap_or_default(),
            interpreters: HashMap::new(),
        }
    }

    /// Sets a `with:` input
    pub fn set_input(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inputs.insert(key.into(), value.into());
    }

    /// Gets a `with:` input
    #[must_use]
    pub fn input(&self, key: &str) -> Option<&String> {
        self.inputs.get(key)
    }

    /// Exports an environment variable to this and later steps
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    /// Gets an environment variable
    #[must_use]
    pub fn get_env(&self, key: &str) -> Option<&String> {
        self.env.get(key)
    }

    /// Sets the project source directory
    pub fn set_source_dir(&mut self, path: impl Into<PathBuf>) {
        self.source_dir = path.into();
    }

    /// Replaces the interpreter version table
    pub fn set_interpreters(&mut self, table: HashMap<String, String>) {
        self.interpreters = table;
    }
}

/// Trait for actions invoked by `uses:` steps
pub trait Action: Send + Sync {
    /// Runs the action
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError` when the action cannot complete
    fn run(&self, context: &mut ActionContext) -> Result<(), WorkflowError>;

    /// The `owner/name` slug this action answers to
    fn slug(&self) -> &str;

    /// Short description of what the action does
    fn description(&self) -> &str;
}

/// Registry of actions keyed by `owner/name` slug
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    /// Creates a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// Creates a registry with the built-in actions registered
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(CheckoutAction);
        registry.register(SetupPythonAction);
        registry
    }

    /// Registers an action under its slug
    pub fn register<T: Action + 'static>(&mut self, action: T) {
        let arc: Arc<dyn Action> = Arc::new(action);
        self.actions.insert(arc.slug().to_string(), arc);
    }

    /// Gets an action by slug
    #[must_use]
    pub fn get(&self, slug: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(slug).cloned()
    }

    /// Checks if an action is registered
    #[must_use]
    pub fn contains(&self, slug: &str) -> bool {
        self.actions.contains_key(slug)
    }

    /// Gets all registered slugs
    #[must_use]
    pub fn slugs(&self) -> Vec<&str> {
        self.actions.keys().map(|s| s.as_str()).collect()
    }
}

/// `actions/checkout` — copies the project source into the job workspace
///
/// Skips `.git`; a `with: path` input places the copy in a subdirectory of
/// the workspace instead of its root.
#[derive(Debug, Default)]
pub struct CheckoutAction;

impl Action for CheckoutAction {
    fn run(&self, context: &mut ActionContext) -> Result<(), WorkflowError> {
        let destination = match context.input("path") {
            Some(path) => context.workspace.join(path),
            None => context.workspace.clone(),
        };
        fs::create_dir_all(&destination)?;
        let copied = copy_tree(&context.source_dir, &destination)?;
        debug!(
            files = copied,
            source = %context.source_dir.display(),
            "checked out project source"
        );
        Ok(())
    }

    fn slug(&self) -> &str {
        "actions/checkout"
    }

    fn description(&self) -> &str {
        "Copies the project source into the job workspace"
    }
}

/// Recursively copies a directory tree, skipping `.git`
fn copy_tree(from: &Path, to: &Path) -> Result<usize, WorkflowError> {
    let mut copied = 0;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let name = entry.file_name();
        if name == ".git" {
            continue;
        }
        let target = to.join(&name);
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
            copied += copy_tree(&entry.path(), &target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// `actions/setup-python` — resolves an interpreter for later steps
///
/// Reads `with: python-version`, resolves it against the configured
/// interpreter table (exact match first, then the highest matching
/// `major.minor` entry, then a versioned binary on `PATH`) and exports
/// `PYTHON` and `FLOWLINE_PYTHON_VERSION` into the job environment.
#[derive(Debug, Default)]
pub struct SetupPythonAction;

impl Action for SetupPythonAction {
    fn run(&self, context: &mut ActionContext) -> Result<(), WorkflowError> {
        let requested = context
            .input("python-version")
            .cloned()
            .unwrap_or_else(|| "3".to_string());
        let interpreter = resolve_interpreter(&requested, &context.interpreters)?;
        info!(version = %requested, interpreter = %interpreter, "resolved interpreter");
        context.set_env("PYTHON", interpreter);
        context.set_env("FLOWLINE_PYTHON_VERSION", requested);
        Ok(())
    }

    fn slug(&self) -> &str {
        "actions/setup-python"
    }

    fn description(&self) -> &str {
        "Resolves a Python interpreter version for later steps"
    }
}

/// Resolves a requested interpreter version to a binary path or name
fn resolve_interpreter(
    requested: &str,
    table: &HashMap<String, String>,
) -> Result<String, WorkflowError> {
    if let Some(path) = table.get(requested) {
        return Ok(path.clone());
    }

    let prefix = format!("{requested}.");
    let mut candidates: Vec<(&String, &String)> = table
        .iter()
        .filter(|(version, _)| version.starts_with(&prefix))
        .collect();
    candidates.sort_by_key(|(version, _)| version_key(version));
    if let Some((_, path)) = candidates.last() {
        return Ok((*path).clone());
    }

    let binary = format!("python{requested}");
    if binary_exists(&binary) {
        return Ok(binary);
    }

    Err(WorkflowError::InterpreterNotFound {
        version: requested.to_string(),
    })
}

/// Numeric sort key for dotted version strings
fn version_key(version: &str) -> Vec<u32> {
    version
        .split('.')
        .map(|part| part.parse().unwrap_or(0))
        .collect()
}

/// Checks whether a binary can be spawned from `PATH`
fn binary_exists(binary: &str) -> bool {
    std::process::Command::new(binary)
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok()
}
