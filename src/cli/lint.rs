//! `flowline lint` - Analyze workflows for best practices
//!
//! Lint works on the parsed workflow, not the raw text, and deliberately
//! does not require the file to pass validation: a broken workflow still
//! gets a report instead of a single hard error. `flowline check` is the
//! validation gate.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use flowline::workflow::{ActionRef, Step, Workflow};

/// Env keys that look like they hold credentials
static SECRET_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(secret|token|password|passwd|api[_-]?key|private[_-]?key)")
        .expect("secret key pattern")
});

/// A single lint finding
#[derive(Debug, Clone, Serialize)]
pub struct LintMessage {
    /// Rule identifier, e.g. `W003`
    pub code: String,
    /// What was found
    pub message: String,
    /// Where in the workflow, e.g. `job 'test' step 2` (zero-based, matching
    /// validation errors)
    pub location: String,
    /// How serious the finding is
    pub severity: LintSeverity,
    /// Suggested fix, when the rule has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Severity of a lint finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LintSeverity {
    /// Worth knowing, never blocking
    Info,
    /// Likely a mistake
    Warning,
    /// Will not work as written
    Error,
}

impl LintSeverity {
    fn rank(self) -> u8 {
        match self {
            Self::Info => 0,
            Self::Warning => 1,
            Self::Error => 2,
        }
    }
}

impl std::fmt::Display for LintSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// How the lint command reports its findings
#[derive(Debug)]
pub struct LintConfig {
    /// Findings below this severity are dropped
    pub min_severity: LintSeverity,
    /// Include the suggested fix in every finding
    pub show_suggestions: bool,
    /// Output format
    pub format: OutputFormat,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            min_severity: LintSeverity::Info,
            show_suggestions: false,
            format: OutputFormat::Text,
        }
    }
}

/// Output format for lint findings
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable listing
    Text,
    /// Pretty-printed JSON array
    Json,
}

/// Lints a workflow file and returns the findings the config keeps
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed. Findings,
/// including validation-level problems, are data rather than errors.
pub fn lint_workflow(file: &Path, config: &LintConfig) -> Result<Vec<LintMessage>> {
    let workflow = Workflow::load(file)
        .with_context(|| format!("Failed to load workflow: {}", file.display()))?;

    let mut messages = lint(&workflow);
    messages.retain(|msg| msg.severity.rank() >= config.min_severity.rank());
    if !config.show_suggestions {
        for msg in &mut messages {
            msg.suggestion = None;
        }
    }
    Ok(messages)
}

/// Runs every lint rule against a parsed workflow
#[must_use]
pub fn lint(workflow: &Workflow) -> Vec<LintMessage> {
    let mut messages = Vec::new();
    check_triggers(workflow, &mut messages);
    check_empty_jobs(workflow, &mut messages);
    check_action_pins(workflow, &mut messages);
    check_checkout_order(workflow, &mut messages);
    check_network_retries(workflow, &mut messages);
    check_secrets(workflow, &mut messages);
    check_degenerate_matrices(workflow, &mut messages);
    messages
}

fn check_triggers(workflow: &Workflow, messages: &mut Vec<LintMessage>) {
    if workflow.on.is_empty() {
        messages.push(LintMessage {
            code: "W001".to_string(),
            message: "Workflow declares no triggers and can never run".to_string(),
            location: "workflow".to_string(),
            severity: LintSeverity::Error,
            suggestion: Some(
                "Declare `on: { dispatch: {} }` or a pull_request trigger".to_string(),
            ),
        });
    }
}

fn check_empty_jobs(workflow: &Workflow, messages: &mut Vec<LintMessage>) {
    for (id, job) in &workflow.jobs {
        if job.steps.is_empty() {
            messages.push(LintMessage {
                code: "W004".to_string(),
                message: format!("Job '{id}' has no steps"),
                location: format!("job '{id}'"),
                severity: LintSeverity::Error,
                suggestion: Some("Add at least one step or remove the job".to_string()),
            });
        }
    }
}

fn check_action_pins(workflow: &Workflow, messages: &mut Vec<LintMessage>) {
    for (id, job) in &workflow.jobs {
        for (index, step) in job.steps.iter().enumerate() {
            let Some(reference) = step.uses.as_deref() else {
                continue;
            };
            let Ok(action) = ActionRef::from_str(reference) else {
                continue; // malformed refs are validation's problem
            };
            if !action.is_pinned() {
                messages.push(LintMessage {
                    code: "W002".to_string(),
                    message: format!("Action '{}' is not pinned to a version", action.slug),
                    location: format!("job '{id}' step {index}"),
                    severity: LintSeverity::Warning,
                    suggestion: Some(format!("Pin the action, e.g. '{}@v4'", action.slug)),
                });
            }
        }
    }
}

fn check_checkout_order(workflow: &Workflow, messages: &mut Vec<LintMessage>) {
    for (id, job) in &workflow.jobs {
        let Some(checkout_at) = job.steps.iter().position(is_checkout) else {
            continue;
        };
        let early_run = job.steps[..checkout_at]
            .iter()
            .position(|step| step.run.is_some());
        if let Some(index) = early_run {
            messages.push(LintMessage {
                code: "W006".to_string(),
                message: format!(
                    "Job '{id}' runs commands before checking out the repository"
                ),
                location: format!("job '{id}' step {index}"),
                severity: LintSeverity::Warning,
                suggestion: Some("Move the checkout step first".to_string()),
            });
        }
    }
}

fn check_network_retries(workflow: &Workflow, messages: &mut Vec<LintMessage>) {
    for (id, job) in &workflow.jobs {
        for (index, step) in job.steps.iter().enumerate() {
            let Some(command) = step.run.as_deref() else {
                continue;
            };
            if step.retry.is_some() {
                continue;
            }
            if let Some(tool) = command.lines().find_map(network_tool) {
                messages.push(LintMessage {
                    code: "W003".to_string(),
                    message: format!("Network-dependent command '{tool}' has no retry policy"),
                    location: format!("job '{id}' step {index}"),
                    severity: LintSeverity::Info,
                    suggestion: Some(
                        "Add `retry: { attempts: 3, delay-seconds: 2 }` to ride out transient failures"
                            .to_string(),
                    ),
                });
            }
        }
    }
}

fn check_secrets(workflow: &Workflow, messages: &mut Vec<LintMessage>) {
    check_env_block(&workflow.env, "workflow env", messages);
    for (id, job) in &workflow.jobs {
        check_env_block(&job.env, &format!("job '{id}' env"), messages);
        for (index, step) in job.steps.iter().enumerate() {
            check_env_block(&step.env, &format!("job '{id}' step {index} env"), messages);
        }
    }
}

fn check_env_block(
    env: &std::collections::HashMap<String, String>,
    location: &str,
    messages: &mut Vec<LintMessage>,
) {
    let mut keys: Vec<&String> = env.keys().collect();
    keys.sort();
    for key in keys {
        let value = &env[key];
        // values holding a `$` reference get filled in at runtime
        if SECRET_KEY.is_match(key) && !value.is_empty() && !value.contains('$') {
            messages.push(LintMessage {
                code: "W005".to_string(),
                message: format!("'{key}' looks like a hardcoded credential"),
                location: format!("{location} '{key}'"),
                severity: LintSeverity::Error,
                suggestion: Some(
                    "Inject credentials through dispatch inputs or the environment".to_string(),
                ),
            });
        }
    }
}

fn check_degenerate_matrices(workflow: &Workflow, messages: &mut Vec<LintMessage>) {
    for (id, job) in &workflow.jobs {
        if job.matrix().is_none() {
            continue;
        }
        let Ok(instances) = job.instances(id) else {
            continue;
        };
        match instances.len() {
            0 => messages.push(LintMessage {
                code: "W007".to_string(),
                message: format!("Job '{id}' has a matrix that excludes every entry"),
                location: format!("job '{id}'"),
                severity: LintSeverity::Warning,
                suggestion: Some("Loosen the exclude rules or drop the job".to_string()),
            }),
            1 => messages.push(LintMessage {
                code: "W007".to_string(),
                message: format!("Job '{id}' has a matrix with a single entry"),
                location: format!("job '{id}'"),
                severity: LintSeverity::Info,
                suggestion: Some("Inline the values and drop the matrix".to_string()),
            }),
            _ => {}
        }
    }
}

fn is_checkout(step: &Step) -> bool {
    step.uses
        .as_deref()
        .and_then(|reference| ActionRef::from_str(reference).ok())
        .is_some_and(|action| action.slug == "actions/checkout")
}

/// Names the network-dependent tool a command line starts with, if any
fn network_tool(line: &str) -> Option<String> {
    let tokens = shell_words::split(line).ok()?;
    let mut parts = tokens.iter().map(String::as_str);
    let mut tool = parts.next()?;
    // sudo and env prefix the real command
    while tool == "sudo" || tool == "env" {
        tool = parts.next()?;
    }
    match tool {
        "curl" | "wget" | "pip" | "pip3" | "npm" | "yarn" | "apt-get" | "apk" => {
            Some(tool.to_string())
        }
        "git" => matches!(parts.next(), Some("clone" | "fetch" | "pull" | "push"))
            .then(|| "git".to_string()),
        _ => None,
    }
}

/// Renders findings in the requested format
#[must_use]
pub fn format_lint_messages(messages: &[LintMessage], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            if messages.is_empty() {
                return "No lint issues found.".to_string();
            }
            let mut output = String::new();
            for msg in messages {
                output.push_str(&format!(
                    "{}: {} ({}) [{}]\n",
                    msg.code, msg.message, msg.location, msg.severity
                ));
                if let Some(suggestion) = &msg.suggestion {
                    output.push_str(&format!("  {suggestion}\n"));
                }
            }
            let errors = messages
                .iter()
                .filter(|m| m.severity == LintSeverity::Error)
                .count();
            let warnings = messages
                .iter()
                .filter(|m| m.severity == LintSeverity::Warning)
                .count();
            output.push_str(&format!(
                "\n{} findings ({errors} errors, {warnings} warnings)",
                messages.len()
            ));
            output
        }
        OutputFormat::Json => {
            serde_json::to_string_pretty(messages).unwrap_or_else(|_| "[]".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline::workflow::{Job, Matrix, RetryPolicy};
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn codes(messages: &[LintMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.code.as_str()).collect()
    }

    #[test]
    fn test_clean_workflow_has_no_findings() {
        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "test",
                Job::new("ubuntu-22.04")
                    .with_step(Step::uses_action("actions/checkout@v4"))
                    .with_step(Step::run_command("echo ok")),
            )
            .build()
            .unwrap();
        assert!(lint(&workflow).is_empty());
    }

    #[test]
    fn test_missing_triggers() {
        let workflow = Workflow::builder("ci")
            .job("test", Job::new("linux").with_step(Step::run_command("ls")))
            .build_unchecked();
        let messages = lint(&workflow);
        assert!(codes(&messages).contains(&"W001"));
        assert_eq!(messages[0].severity, LintSeverity::Error);
    }

    #[test]
    fn test_unpinned_action() {
        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "test",
                Job::new("linux").with_step(Step::uses_action("actions/checkout")),
            )
            .build()
            .unwrap();
        let messages = lint(&workflow);
        assert!(codes(&messages).contains(&"W002"));
        assert!(messages[0].message.contains("actions/checkout"));
    }

    #[test]
    fn test_network_command_without_retry() {
        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "fetch",
                Job::new("linux")
                    .with_step(Step::run_command("git clone https://example.com/repo.git"))
                    .with_step(
                        Step::run_command("curl -fsSL https://example.com")
                            .with_retry(RetryPolicy::new(3)),
                    ),
            )
            .build()
            .unwrap();
        let messages = lint(&workflow);
        // only the step without a retry policy fires
        let w003: Vec<_> = messages.iter().filter(|m| m.code == "W003").collect();
        assert_eq!(w003.len(), 1);
        assert!(w003[0].message.contains("git"));
        assert_eq!(w003[0].location, "job 'fetch' step 0");
    }

    #[test]
    fn test_network_tool_detection() {
        assert_eq!(network_tool("curl -s https://x").as_deref(), Some("curl"));
        assert_eq!(network_tool("sudo apt-get update").as_deref(), Some("apt-get"));
        assert_eq!(network_tool("git clone repo").as_deref(), Some("git"));
        assert_eq!(network_tool("git status"), None);
        assert_eq!(network_tool("echo curl"), None);
        // mismatched quotes are not worth a finding
        assert_eq!(network_tool("echo 'unterminated"), None);
    }

    #[test]
    fn test_run_before_checkout() {
        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "test",
                Job::new("linux")
                    .with_step(Step::run_command("ls"))
                    .with_step(Step::uses_action("actions/checkout@v4")),
            )
            .build()
            .unwrap();
        let messages = lint(&workflow);
        assert!(codes(&messages).contains(&"W006"));
    }

    #[test]
    fn test_no_checkout_is_not_flagged() {
        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "test",
                Job::new("linux").with_step(Step::run_command("echo self-contained")),
            )
            .build()
            .unwrap();
        assert!(!codes(&lint(&workflow)).contains(&"W006"));
    }

    #[test]
    fn test_hardcoded_secret() {
        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .env("API_TOKEN", "hunter2")
            .env("LOG_LEVEL", "debug")
            .job(
                "test",
                Job::new("linux")
                    .with_step(Step::run_command("ls").with_env("DB_PASSWORD", "$VAULT_PW")),
            )
            .build()
            .unwrap();
        let messages = lint(&workflow);
        let w005: Vec<_> = messages.iter().filter(|m| m.code == "W005").collect();
        // the `$VAULT_PW` reference is resolved at runtime, not hardcoded
        assert_eq!(w005.len(), 1);
        assert!(w005[0].location.contains("API_TOKEN"));
    }

    #[test]
    fn test_single_entry_matrix() {
        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "test",
                Job::new("linux")
                    .with_matrix(Matrix::new().add_axis("python", vec!["3.10".to_string()]))
                    .with_step(Step::run_command("pytest")),
            )
            .build()
            .unwrap();
        let messages = lint(&workflow);
        assert!(codes(&messages).contains(&"W007"));
        assert_eq!(messages[0].severity, LintSeverity::Info);
    }

    #[test]
    fn test_fully_excluded_matrix() {
        let mut rule = HashMap::new();
        rule.insert("python".to_string(), "3.10".to_string());
        let workflow = Workflow::builder("ci")
            .on_dispatch()
            .job(
                "test",
                Job::new("linux")
                    .with_matrix(
                        Matrix::new()
                            .add_axis("python", vec!["3.10".to_string()])
                            .add_exclude(rule),
                    )
                    .with_step(Step::run_command("pytest")),
            )
            .build()
            .unwrap();
        let messages = lint(&workflow);
        let w007 = messages.iter().find(|m| m.code == "W007").unwrap();
        assert_eq!(w007.severity, LintSeverity::Warning);
        assert!(w007.message.contains("excludes every entry"));
    }

    #[test]
    fn test_severity_filter_and_suggestions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("workflow.yaml");
        fs::write(
            &path,
            "name: ci\non:\n  dispatch: {}\njobs:\n  test:\n    runs-on: linux\n    steps:\n      - uses: actions/checkout\n      - run: curl https://example.com\n",
        )
        .unwrap();

        let config = LintConfig {
            min_severity: LintSeverity::Warning,
            show_suggestions: false,
            format: OutputFormat::Text,
        };
        let messages = lint_workflow(&path, &config).unwrap();
        assert_eq!(codes(&messages), vec!["W002"]);
        assert!(messages[0].suggestion.is_none());

        let config = LintConfig {
            min_severity: LintSeverity::Info,
            show_suggestions: true,
            format: OutputFormat::Text,
        };
        let messages = lint_workflow(&path, &config).unwrap();
        assert_eq!(codes(&messages), vec!["W002", "W003"]);
        assert!(messages[0].suggestion.is_some());
    }

    #[test]
    fn test_format_text_and_json() {
        let messages = vec![LintMessage {
            code: "W001".to_string(),
            message: "Workflow declares no triggers and can never run".to_string(),
            location: "workflow".to_string(),
            severity: LintSeverity::Error,
            suggestion: None,
        }];

        let text = format_lint_messages(&messages, OutputFormat::Text);
        assert!(text.contains("W001"));
        assert!(text.contains("[error]"));
        assert!(text.contains("1 findings (1 errors, 0 warnings)"));

        let json = format_lint_messages(&messages, OutputFormat::Json);
        assert!(json.contains("\"code\": \"W001\""));
        assert!(json.contains("\"severity\": \"error\""));

        assert_eq!(
            format_lint_messages(&[], OutputFormat::Text),
            "No lint issues found."
        );
    }
}
