//! Workflow steps and action references
//!
//! A step is either a reference to a reusable action (`uses:`) or a literal
//! command line (`run:`), never both. Steps execute in declaration order and
//! a failing step halts the remaining steps of its job unless it opted into
//! `continue-on-error`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{ValidationError, WorkflowError};

/// A single step of a job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Display name; defaults to the action reference or command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Reference to a reusable action, e.g. `actions/checkout@v4`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,

    /// Literal command line, passed to the shell
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,

    /// Inputs for a `uses` step
    #[serde(
        default,
        deserialize_with = "super::yaml::string_map",
        skip_serializing_if = "HashMap::is_empty"
    )]
    pub with: HashMap<String, String>,

    /// Extra environment variables for this step only
    #[serde(
        default,
        deserialize_with = "super::yaml::string_map",
        skip_serializing_if = "HashMap::is_empty"
    )]
    pub env: HashMap<String, String>,

    /// Directory the command runs in, relative to the job workspace
    #[serde(
        rename = "working-directory",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub working_directory: Option<String>,

    /// Shell binary for `run` steps; defaults to `sh`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,

    /// Record a failure but keep executing the remaining steps
    #[serde(
        rename = "continue-on-error",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub continue_on_error: bool,

    /// Hard limit on the step's runtime; the process is killed on expiry
    #[serde(
        rename = "timeout-minutes",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout_minutes: Option<u64>,

    /// Re-run the step on failure according to this policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
}

/// What a step does, borrowed from its definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind<'a> {
    /// Invoke a reusable action
    Uses(&'a str),
    /// Run a command line
    Run(&'a str),
}

impl Step {
    /// Creates a command step
    #[must_use]
    pub fn run_command(command: impl Into<String>) -> Self {
        Self {
            run: Some(command.into()),
            ..Self::default()
        }
    }

    /// Creates an action step
    #[must_use]
    pub fn uses_action(reference: impl Into<String>) -> Self {
        Self {
            uses: Some(reference.into()),
            ..Self::default()
        }
    }

    /// Sets the display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds an action input
    #[must_use]
    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.with.insert(key.into(), value.into());
        self
    }

    /// Adds a step-scoped environment variable
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the working directory
    #[must_use]
    pub fn with_working_directory(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Sets the shell for a command step
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }

    /// Marks the step as non-fatal
    #[must_use]
    pub fn with_continue_on_error(mut self) -> Self {
        self.continue_on_error = true;
        self
    }

    /// Sets the step timeout in minutes
    #[must_use]
    pub fn with_timeout_minutes(mut self, minutes: u64) -> Self {
        self.timeout_minutes = Some(minutes);
        self
    }

    /// Attaches a retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Classifies the step, or `None` when the shape is invalid
    #[must_use]
    pub fn kind(&self) -> Option<StepKind<'_>> {
        match (self.uses.as_deref(), self.run.as_deref()) {
            (Some(uses), None) => Some(StepKind::Uses(uses)),
            (None, Some(run)) => Some(StepKind::Run(run)),
            _ => None,
        }
    }

    /// Human-readable name for logs and reports
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match self.kind() {
            Some(StepKind::Uses(reference)) => reference.to_string(),
            Some(StepKind::Run(command)) => {
                let line = command.lines().next().unwrap_or_default();
                if line.chars().count() > 60 {
                    let head: String = line.chars().take(57).collect();
                    format!("{head}...")
                } else {
                    line.to_string()
                }
            }
            None => "<invalid step>".to_string(),
        }
    }

    /// Validates the step in the context of the named job
    #[allow(clippy::missing_errors_doc)]
    pub fn validate_for(&self, job: &str, index: usize) -> Result<(), ValidationError> {
        let shape_error = || ValidationError::StepShape {
            job: job.to_string(),
            index,
        };

        match self.kind() {
            None => return Err(shape_error()),
            Some(StepKind::Run(command)) if command.trim().is_empty() => {
                return Err(shape_error());
            }
            Some(StepKind::Uses(reference)) => {
                if ActionRef::from_str(reference).is_err() {
                    return Err(ValidationError::BadActionRef {
                        job: job.to_string(),
                        index,
                        reference: reference.to_string(),
                    });
                }
            }
            Some(StepKind::Run(_)) => {}
        }

        if let Some(retry) = &self.retry
            && retry.attempts == 0
        {
            return Err(ValidationError::InvalidRetry {
                job: job.to_string(),
                index,
            });
        }

        if self.timeout_minutes == Some(0) {
            return Err(ValidationError::InvalidTimeout {
                job: job.to_string(),
            });
        }

        Ok(())
    }
}

/// A parsed action reference: a namespaced slug plus an optional version,
/// e.g. `actions/checkout@v4`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRef {
    /// The action identifier without version, e.g. `actions/checkout`
    pub slug: String,
    /// The pinned version after `@`, if any
    pub version: Option<String>,
}

impl ActionRef {
    /// Returns true when the reference pins a version
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.version.is_some()
    }
}

impl FromStr for ActionRef {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || WorkflowError::Parse(format!("invalid action reference '{s}'"));

        let (slug, version) = match s.split_once('@') {
            Some((slug, version)) => {
                if version.trim().is_empty() {
                    return Err(invalid());
                }
                (slug, Some(version.to_string()))
            }
            None => (s, None),
        };

        // Slugs are namespaced (owner/name) and carry no whitespace
        if slug.trim().is_empty()
            || !slug.contains('/')
            || slug.starts_with('/')
            || slug.ends_with('/')
            || s.chars().any(char::is_whitespace)
        {
            return Err(invalid());
        }

        Ok(Self {
            slug: slug.to_string(),
            version,
        })
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{}", self.slug, version),
            None => write!(f, "{}", self.slug),
        }
    }
}

/// Bounded retry with a linearly growing delay.
///
/// After a failed attempt `n` (1-based) the runner sleeps
/// `delay + increment * (n - 1)` seconds before trying again, up to
/// `attempts` total attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first
    pub attempts: u32,

    /// Base delay between attempts in seconds
    #[serde(
        rename = "delay-seconds",
        default = "default_delay",
        skip_serializing_if = "is_default_delay"
    )]
    pub delay_seconds: u64,

    /// Added to the delay after every further failure
    #[serde(
        rename = "increment-seconds",
        default,
        skip_serializing_if = "is_zero"
    )]
    pub increment_seconds: u64,
}

impl RetryPolicy {
    /// Creates a policy with the default one second delay
    #[must_use]
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts,
            delay_seconds: default_delay(),
            increment_seconds: 0,
        }
    }

    /// Sets the base delay
    #[must_use]
    pub fn with_delay_seconds(mut self, seconds: u64) -> Self {
        self.delay_seconds = seconds;
        self
    }

    /// Sets the per-failure increment
    #[must_use]
    pub fn with_increment_seconds(mut self, seconds: u64) -> Self {
        self.increment_seconds = seconds;
        self
    }

    /// The sleep after the given failed attempt (1-based)
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let extra = self
            .increment_seconds
            .saturating_mul(u64::from(attempt.saturating_sub(1)));
        Duration::from_secs(self.delay_seconds.saturating_add(extra))
    }
}

fn default_delay() -> u64 {
    1
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_default_delay(value: &u64) -> bool {
    *value == default_delay()
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(value: &u64) -> bool {
    *value == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_kind() {
        let run = Step::run_command("tox -e lint");
        assert!(matches!(run.kind(), Some(StepKind::Run("tox -e lint"))));

        let uses = Step::uses_action("actions/checkout@v4");
        assert!(matches!(
            uses.kind(),
            Some(StepKind::Uses("actions/checkout@v4"))
        ));

        let both = Step {
            uses: Some("actions/checkout@v4".to_string()),
            run: Some("ls".to_string()),
            ..Step::default()
        };
        assert!(both.kind().is_none());
        assert!(Step::default().kind().is_none());
    }

    #[test]
    fn test_display_name() {
        let named = Step::run_command("ls").with_name("List files");
        assert_eq!(named.display_name(), "List files");

        let uses = Step::uses_action("actions/setup-python@v5");
        assert_eq!(uses.display_name(), "actions/setup-python@v5");

        let long = Step::run_command("x".repeat(80));
        assert_eq!(long.display_name().chars().count(), 60);
        assert!(long.display_name().ends_with("..."));

        let multiline = Step::run_command("tox -e py\necho done");
        assert_eq!(multiline.display_name(), "tox -e py");
    }

    #[test]
    fn test_validate_for() {
        assert!(Step::run_command("ls").validate_for("build", 0).is_ok());
        assert!(Step::uses_action("actions/checkout@v4")
            .validate_for("build", 0)
            .is_ok());

        let err = Step::default().validate_for("build", 2).unwrap_err();
        assert!(matches!(err, ValidationError::StepShape { index: 2, .. }));

        let err = Step::run_command("   ").validate_for("build", 0).unwrap_err();
        assert!(matches!(err, ValidationError::StepShape { .. }));

        let err = Step::uses_action("checkout").validate_for("build", 1).unwrap_err();
        assert!(matches!(err, ValidationError::BadActionRef { reference, .. } if reference == "checkout"));

        let err = Step::run_command("ls")
            .with_retry(RetryPolicy::new(0))
            .validate_for("build", 0)
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidRetry { .. }));

        let err = Step::run_command("ls")
            .with_timeout_minutes(0)
            .validate_for("build", 0)
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidTimeout { .. }));
    }

    #[test]
    fn test_action_ref_parsing() {
        let pinned: ActionRef = "actions/checkout@v4".parse().unwrap();
        assert_eq!(pinned.slug, "actions/checkout");
        assert_eq!(pinned.version.as_deref(), Some("v4"));
        assert!(pinned.is_pinned());
        assert_eq!(pinned.to_string(), "actions/checkout@v4");

        let unpinned: ActionRef = "actions/setup-python".parse().unwrap();
        assert!(!unpinned.is_pinned());
        assert_eq!(unpinned.to_string(), "actions/setup-python");

        assert!("checkout".parse::<ActionRef>().is_err());
        assert!("actions/checkout@".parse::<ActionRef>().is_err());
        assert!("/checkout".parse::<ActionRef>().is_err());
        assert!("actions/check out@v4".parse::<ActionRef>().is_err());
        assert!("".parse::<ActionRef>().is_err());
    }

    #[test]
    fn test_retry_delay_schedule() {
        let policy = RetryPolicy::new(3)
            .with_delay_seconds(2)
            .with_increment_seconds(5);
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(7));
        assert_eq!(policy.delay_for(3), Duration::from_secs(12));

        let defaults = RetryPolicy::new(2);
        assert_eq!(defaults.delay_for(1), Duration::from_secs(1));
        assert_eq!(defaults.delay_for(5), Duration::from_secs(1));
    }

    #[test]
    fn test_step_yaml_parsing() {
        let yaml = r#"
name: Set up Python
uses: actions/setup-python@v5
with:
  python-version: "3.10"
"#;
        let step: Step = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(step.name.as_deref(), Some("Set up Python"));
        assert_eq!(step.uses.as_deref(), Some("actions/setup-python@v5"));
        assert_eq!(
            step.with.get("python-version").map(String::as_str),
            Some("3.10")
        );

        let yaml = r#"
run: tox -e py
env:
  RETRIES: 3
continue-on-error: true
timeout-minutes: 10
retry:
  attempts: 3
  delay-seconds: 2
"#;
        let step: Step = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(step.run.as_deref(), Some("tox -e py"));
        assert_eq!(step.env.get("RETRIES").map(String::as_str), Some("3"));
        assert!(step.continue_on_error);
        assert_eq!(step.timeout_minutes, Some(10));
        let retry = step.retry.unwrap();
        assert_eq!(retry.attempts, 3);
        assert_eq!(retry.delay_seconds, 2);
        assert_eq!(retry.increment_seconds, 0);
    }

    #[test]
    fn test_step_yaml_skips_defaults() {
        let yaml = serde_yaml::to_string(&Step::run_command("ls")).unwrap();
        assert!(!yaml.contains("continue-on-error"));
        assert!(!yaml.contains("with"));
        assert!(!yaml.contains("env"));
    }
}
