//! Job types for workflow definition
//!
//! This module defines jobs, their builder pattern, and the concrete
//! instances produced by matrix expansion.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::Validate;
use super::errors::ValidationError;
use super::expr;
use super::matrix::{Matrix, MatrixEntry, Strategy};
use super::steps::Step;
use super::types::WorkflowResult;

/// A job in a workflow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Display name; defaults to the job's key in the workflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Platform label, e.g. `ubuntu-22.04`; may reference `${{ matrix.* }}`
    #[serde(rename = "runs-on", default)]
    pub runs_on: String,

    /// Matrix and scheduling strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,

    /// Jobs that must finish successfully before this one starts
    #[serde(
        default,
        deserialize_with = "super::yaml::string_or_seq",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub needs: Vec<String>,

    /// Environment variables for every step of this job
    #[serde(
        default,
        deserialize_with = "super::yaml::string_map",
        skip_serializing_if = "HashMap::is_empty"
    )]
    pub env: HashMap<String, String>,

    /// Steps in execution order
    #[serde(default)]
    pub steps: Vec<Step>,

    /// Soft deadline for the whole job, checked between steps
    #[serde(
        rename = "timeout-minutes",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout_minutes: Option<u64>,
}

impl Job {
    /// Creates a new job on the given platform
    pub fn new(runs_on: impl Into<String>) -> Self {
        Self {
            runs_on: runs_on.into(),
            ..Self::default()
        }
    }

    /// Sets the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the matrix, wrapping it in a default strategy
    pub fn with_matrix(mut self, matrix: Matrix) -> Self {
        self.strategy.get_or_insert_with(Strategy::default).matrix = Some(matrix);
        self
    }

    /// Sets the full strategy
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Adds a dependency on another job
    pub fn with_need(mut self, job: impl Into<String>) -> Self {
        self.needs.push(job.into());
        self
    }

    /// Adds a job-scoped environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Appends a step
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Appends multiple steps
    pub fn with_steps(mut self, mut steps: Vec<Step>) -> Self {
        self.steps.append(&mut steps);
        self
    }

    /// Sets the job deadline in minutes
    pub fn with_timeout_minutes(mut self, minutes: u64) -> Self {
        self.timeout_minutes = Some(minutes);
        self
    }

    /// Whether a failing instance cancels the remaining ones
    pub fn fail_fast(&self) -> bool {
        self.strategy.as_ref().is_none_or(|s| s.fail_fast)
    }

    /// Upper bound on concurrently running instances, if any
    pub fn max_parallel(&self) -> Option<usize> {
        self.strategy.as_ref().and_then(|s| s.max_parallel)
    }

    /// The job's matrix, if one is declared
    pub fn matrix(&self) -> Option<&Matrix> {
        self.strategy.as_ref().and_then(|s| s.matrix.as_ref())
    }

    /// Validates the job under its workflow key
    #[allow(clippy::missing_errors_doc)]
    pub fn validate_for(&self, id: &str) -> Result<(), ValidationError> {
        if self.steps.is_empty() {
            return Err(ValidationError::EmptyJob {
                job: id.to_string(),
            });
        }

        if self.runs_on.trim().is_empty() {
            return Err(ValidationError::MissingRunsOn {
                job: id.to_string(),
            });
        }

        if self.timeout_minutes == Some(0) {
            return Err(ValidationError::InvalidTimeout {
                job: id.to_string(),
            });
        }

        if let Some(matrix) = self.matrix() {
            matrix.validate_for(id)?;
        }

        for (index, step) in self.steps.iter().enumerate() {
            step.validate_for(id, index)?;
        }

        Ok(())
    }

    /// Expands the job into concrete instances.
    ///
    /// A job without a matrix yields exactly one instance. A matrix job
    /// yields one instance per expanded entry, with `${{ matrix.* }}` in
    /// `runs-on` resolved; a matrix whose exclusions remove every entry
    /// yields none, and the job is skipped.
    #[allow(clippy::missing_errors_doc)]
    pub fn instances(&self, id: &str) -> WorkflowResult<Vec<JobInstance>> {
        let entries = match self.matrix() {
            Some(matrix) => matrix.expand(),
            None => vec![MatrixEntry::empty()],
        };

        let base = self.name.as_deref().unwrap_or(id);
        let no_env = HashMap::new();
        let mut instances = Vec::with_capacity(entries.len());
        for entry in entries {
            let runs_on = expr::interpolate(&self.runs_on, &entry.context(), &no_env)?;
            let name = if entry.is_empty() {
                base.to_string()
            } else {
                format!("{base} ({})", entry.label())
            };
            instances.push(JobInstance {
                job_id: id.to_string(),
                name,
                runs_on,
                matrix: entry,
                job: self.clone(),
            });
        }
        Ok(instances)
    }
}

impl Validate for Job {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        let id = self.name.as_deref().unwrap_or("job");
        self.validate_for(id)
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Job({}): {} steps", self.runs_on, self.steps.len())
    }
}

/// A concrete, runnable instance of a job after matrix expansion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInstance {
    /// The job's key in the workflow
    pub job_id: String,
    /// Instance name: the job name plus the matrix label
    pub name: String,
    /// Platform label with matrix references resolved
    pub runs_on: String,
    /// The matrix entry this instance was expanded from
    pub matrix: MatrixEntry,
    /// The job definition
    pub job: Job,
}

impl fmt::Display for JobInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Builder for creating jobs
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    /// Creates a new job builder
    pub fn new(runs_on: impl Into<String>) -> Self {
        Self {
            job: Job::new(runs_on),
        }
    }

    /// Sets the display name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.job.name = Some(name.into());
        self
    }

    /// Sets the matrix
    pub fn matrix(mut self, matrix: Matrix) -> Self {
        self.job = self.job.with_matrix(matrix);
        self
    }

    /// Disables fail-fast for the matrix
    pub fn no_fail_fast(mut self) -> Self {
        self.job.strategy.get_or_insert_with(Strategy::default).fail_fast = false;
        self
    }

    /// Caps concurrent matrix instances
    pub fn max_parallel(mut self, limit: usize) -> Self {
        self.job
            .strategy
            .get_or_insert_with(Strategy::default)
            .max_parallel = Some(limit);
        self
    }

    /// Adds a dependency
    pub fn needs(mut self, job: impl Into<String>) -> Self {
        self.job.needs.push(job.into());
        self
    }

    /// Adds an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.job.env.insert(key.into(), value.into());
        self
    }

    /// Adds a step
    pub fn step(mut self, step: Step) -> Self {
        self.job.steps.push(step);
        self
    }

    /// Adds multiple steps
    pub fn steps(mut self, mut steps: Vec<Step>) -> Self {
        self.job.steps.append(&mut steps);
        self
    }

    /// Sets the job deadline
    pub fn timeout_minutes(mut self, minutes: u64) -> Self {
        self.job.timeout_minutes = Some(minutes);
        self
    }

    /// Builds the job
    #[allow(clippy::missing_errors_doc)]
    pub fn build(self) -> Result<Job, ValidationError> {
        self.job.validate()?;
        Ok(self.job)
    }

    /// Builds the job without validation (for internal use)
    #[must_use]
    pub fn build_unchecked(self) -> Job {
        self.job
    }
}
