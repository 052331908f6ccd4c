//! Run reports
//!
//! A run produces one report tree: the run itself, one entry per job
//! instance, one entry per step. Reports render as text for the terminal
//! and serialize to JSON for tooling.

use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::workflow::types::{JobResult, StepStatus};
use crate::workflow::{WorkflowError, WorkflowResult};

/// Outcome of a single step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    /// Step display name
    pub name: String,

    /// Final status
    pub status: StepStatus,

    /// Wall-clock time spent, including retries
    #[serde(rename = "duration_ms", serialize_with = "millis")]
    pub duration: Duration,

    /// Exit code of the last attempt, if a process ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Last lines of combined output
    #[serde(skip_serializing_if = "String::is_empty")]
    pub output_tail: String,

    /// Error description when the step did not succeed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Number of attempts made
    pub attempts: u32,
}

impl StepReport {
    /// Creates a report for a step that never ran
    #[must_use]
    pub fn skipped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Skipped,
            duration: Duration::ZERO,
            exit_code: None,
            output_tail: String::new(),
            error: None,
            attempts: 0,
        }
    }
}

/// Outcome of a single job instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    /// The job's key in the workflow
    pub job_id: String,

    /// Instance name, including the matrix label
    pub name: String,

    /// Platform label the instance ran on
    pub runs_on: String,

    /// Final result
    pub result: JobResult,

    /// Wall-clock time spent
    #[serde(rename = "duration_ms", serialize_with = "millis")]
    pub duration: Duration,

    /// Per-step outcomes in execution order
    pub steps: Vec<StepReport>,
}

impl JobReport {
    /// Creates a report for an instance that never started
    #[must_use]
    pub fn unstarted(job_id: impl Into<String>, name: impl Into<String>, runs_on: impl Into<String>, result: JobResult) -> Self {
        Self {
            job_id: job_id.into(),
            name: name.into(),
            runs_on: runs_on.into(),
            result,
            duration: Duration::ZERO,
            steps: Vec::new(),
        }
    }
}

/// Outcome of a whole workflow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Workflow name
    pub workflow: String,

    /// Unique id of this run
    pub run_id: String,

    /// The event that triggered the run
    pub event: String,

    /// Worst result across all jobs
    pub conclusion: JobResult,

    /// Wall-clock time of the whole run
    #[serde(rename = "duration_ms", serialize_with = "millis")]
    pub duration: Duration,

    /// Per-instance outcomes in execution order
    pub jobs: Vec<JobReport>,
}

impl RunReport {
    /// Creates an empty report for the given run
    #[must_use]
    pub fn new(
        workflow: impl Into<String>,
        run_id: impl Into<String>,
        event: impl Into<String>,
    ) -> Self {
        Self {
            workflow: workflow.into(),
            run_id: run_id.into(),
            event: event.into(),
            conclusion: JobResult::Success,
            duration: Duration::ZERO,
            jobs: Vec::new(),
        }
    }

    /// Appends a job outcome and folds it into the conclusion
    pub fn push_job(&mut self, job: JobReport) {
        self.conclusion = self.conclusion.worst(job.result);
        self.jobs.push(job);
    }

    /// Returns true if every job succeeded or was skipped
    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(self.conclusion, JobResult::Failure | JobResult::Cancelled)
    }

    /// Serializes the report as pretty-printed JSON
    #[allow(clippy::missing_errors_doc)]
    pub fn to_json(&self) -> WorkflowResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| WorkflowError::Parse(e.to_string()))
    }

    /// Renders the report for the terminal
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Workflow: {} ({})\n", self.workflow, self.event));
        out.push_str(&format!("Run: {}\n\n", self.run_id));

        for job in &self.jobs {
            out.push_str(&format!(
                "  {} {} [{}] {}\n",
                job_symbol(job.result),
                job.name,
                job.runs_on,
                format_duration(job.duration)
            ));
            for step in &job.steps {
                let mut line = format!(
                    "      {} {} ({})",
                    step_symbol(step.status),
                    step.name,
                    format_duration(step.duration)
                );
                if let Some(code) = step.exit_code
                    && code != 0
                {
                    line.push_str(&format!(" exit {code}"));
                }
                if step.attempts > 1 {
                    line.push_str(&format!(" after {} attempts", step.attempts));
                }
                out.push_str(&line);
                out.push('\n');
                if let Some(error) = &step.error {
                    out.push_str(&format!("        {error}\n"));
                }
            }
        }

        out.push_str(&format!(
            "\n{} {} in {} ({} jobs)\n",
            job_symbol(self.conclusion),
            self.conclusion,
            format_duration(self.duration),
            self.jobs.len()
        ));
        out
    }
}

fn job_symbol(result: JobResult) -> char {
    match result {
        JobResult::Success => '✓',
        JobResult::Failure => '✗',
        JobResult::Skipped => '-',
        JobResult::Cancelled => '~',
    }
}

fn step_symbol(status: StepStatus) -> char {
    match status {
        StepStatus::Success => '✓',
        StepStatus::Failure => '✗',
        StepStatus::Skipped => '-',
    }
}

/// Formats a duration as a compact human-readable value
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else if secs >= 1 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Keeps the last `max_lines` lines of a command's output.
///
/// Truncation is visible: the kept lines are preceded by a marker naming
/// how many lines were dropped.
#[must_use]
pub fn tail(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max_lines {
        text.trim_end().to_string()
    } else {
        let omitted = lines.len() - max_lines;
        let kept = lines[lines.len() - max_lines..].join("\n");
        format!("[... {omitted} earlier lines omitted]\n{kept}")
    }
}

fn millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn step_ok(name: &str) -> StepReport {
        StepReport {
            name: name.to_string(),
            status: StepStatus::Success,
            duration: Duration::from_millis(120),
            exit_code: Some(0),
            output_tail: String::new(),
            error: None,
            attempts: 1,
        }
    }

    fn job_report(name: &str, result: JobResult) -> JobReport {
        JobReport {
            job_id: "test".to_string(),
            name: name.to_string(),
            runs_on: "ubuntu-22.04".to_string(),
            result,
            duration: Duration::from_secs(2),
            steps: vec![step_ok("checkout")],
        }
    }

    #[test]
    fn test_conclusion_folds_worst() {
        let mut report = RunReport::new("ci", "run-1", "dispatch");
        assert!(report.is_success());

        report.push_job(job_report("test (a)", JobResult::Success));
        assert_eq!(report.conclusion, JobResult::Success);

        report.push_job(job_report("test (b)", JobResult::Skipped));
        assert_eq!(report.conclusion, JobResult::Skipped);
        assert!(report.is_success());

        report.push_job(job_report("test (c)", JobResult::Failure));
        assert_eq!(report.conclusion, JobResult::Failure);
        assert!(!report.is_success());
    }

    #[test]
    fn test_render_text() {
        let mut report = RunReport::new("ci", "run-1", "dispatch");
        let mut job = job_report("test (ubuntu-22.04, 3.10)", JobResult::Failure);
        job.steps.push(StepReport {
            name: "Unit tests".to_string(),
            status: StepStatus::Failure,
            duration: Duration::from_secs(3),
            exit_code: Some(1),
            output_tail: String::new(),
            error: Some("command exited with code 1".to_string()),
            attempts: 2,
        });
        job.steps.push(StepReport::skipped("Docs"));
        report.push_job(job);

        let text = report.render_text();
        assert!(text.contains("Workflow: ci (dispatch)"));
        assert!(text.contains("✗ test (ubuntu-22.04, 3.10) [ubuntu-22.04]"));
        assert!(text.contains("✓ checkout"));
        assert!(text.contains("exit 1 after 2 attempts"));
        assert!(text.contains("- Docs"));
        assert!(text.contains("✗ FAILURE"));
    }

    #[test]
    fn test_to_json() {
        let mut report = RunReport::new("ci", "run-1", "dispatch");
        report.push_job(job_report("test", JobResult::Success));
        let json = report.to_json().unwrap();
        assert!(json.contains("\"conclusion\": \"success\""));
        assert!(json.contains("\"duration_ms\""));
        assert!(json.contains("\"runs_on\": \"ubuntu-22.04\""));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(80)), "80ms");
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(75)), "1m 15s");
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("a\nb\nc", 5), "a\nb\nc");
        assert_eq!(tail("a\nb\nc\nd", 2), "[... 2 earlier lines omitted]\nc\nd");
        assert_eq!(tail("", 2), "");
    }
}
