//! Core types for the workflow domain
//!
//! This module contains fundamental types that represent
//! the outcome of workflow, job and step execution.

#![allow(clippy::must_use_candidate)]

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for workflow execution
pub type WorkflowResult<T> = std::result::Result<T, super::errors::WorkflowError>;

/// Possible outcomes of a job (or of a whole run)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobResult {
    /// Every step completed successfully
    Success,
    /// A step exited with a failure status
    Failure,
    /// The job never started (unmatched filter, failed dependency, empty matrix)
    Skipped,
    /// The job was cancelled before completion (fail-fast)
    Cancelled,
}

impl JobResult {
    /// Returns true if the job succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if the job failed
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure)
    }

    /// Returns true if the job was skipped
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    /// Returns true if the job was cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Combines two results, keeping the worse of the two.
    ///
    /// Ordering from best to worst: success, skipped, cancelled, failure.
    #[must_use]
    pub fn worst(self, other: Self) -> Self {
        fn rank(r: JobResult) -> u8 {
            match r {
                JobResult::Success => 0,
                JobResult::Skipped => 1,
                JobResult::Cancelled => 2,
                JobResult::Failure => 3,
            }
        }
        if rank(other) > rank(self) { other } else { self }
    }
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failure => write!(f, "FAILURE"),
            Self::Skipped => write!(f, "SKIPPED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Possible outcomes of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// The step completed successfully
    Success,
    /// The step exited with a failure status
    Failure,
    /// The step never ran (an earlier step failed)
    Skipped,
}

impl StepStatus {
    /// Returns true if the step succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if the step failed
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure)
    }

    /// Returns true if the step was skipped
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failure => write!(f, "FAILURE"),
            Self::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Trait for types that can be validated
#[allow(clippy::missing_errors_doc)]
pub trait Validate {
    /// Type of validation error
    type Error;

    /// Validates this type
    fn validate(&self) -> std::result::Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_result_predicates() {
        assert!(JobResult::Success.is_success());
        assert!(JobResult::Failure.is_failure());
        assert!(JobResult::Skipped.is_skipped());
        assert!(JobResult::Cancelled.is_cancelled());
        assert!(!JobResult::Failure.is_success());
    }

    #[test]
    fn test_job_result_worst() {
        assert_eq!(
            JobResult::Success.worst(JobResult::Failure),
            JobResult::Failure
        );
        assert_eq!(
            JobResult::Failure.worst(JobResult::Skipped),
            JobResult::Failure
        );
        assert_eq!(
            JobResult::Success.worst(JobResult::Skipped),
            JobResult::Skipped
        );
        assert_eq!(
            JobResult::Cancelled.worst(JobResult::Skipped),
            JobResult::Cancelled
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(JobResult::Success.to_string(), "SUCCESS");
        assert_eq!(JobResult::Cancelled.to_string(), "CANCELLED");
        assert_eq!(StepStatus::Failure.to_string(), "FAILURE");
    }

    #[test]
    fn test_serde_round_trip() {
        let json = serde_json::to_string(&JobResult::Failure).unwrap();
        assert_eq!(json, "\"failure\"");
        let back: JobResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, JobResult::Failure);
    }
}
