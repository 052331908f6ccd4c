//! Metrics collection
//!
//! Provides metrics for workflow runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::runner::RunReport;
use crate::workflow::{JobResult, StepStatus};

/// Metrics for one workflow run
#[derive(Debug, Clone)]
pub struct RunMetrics {
    /// Workflow name
    pub workflow: String,

    /// Run identifier
    pub run_id: String,

    /// Run duration
    pub duration: Duration,

    /// Number of job instances
    pub job_count: usize,

    /// Job instances that succeeded
    pub successful_jobs: usize,

    /// Job instances that failed
    pub failed_jobs: usize,

    /// Job instances that were skipped or cancelled
    pub skipped_jobs: usize,

    /// Number of steps across all job instances
    pub step_count: usize,

    /// Steps that failed
    pub failed_steps: usize,
}

impl RunMetrics {
    /// Derives metrics from a finished run report
    #[must_use]
    pub fn from_report(report: &RunReport) -> Self {
        let mut metrics = Self {
            workflow: report.workflow.clone(),
            run_id: report.run_id.clone(),
            duration: report.duration,
            job_count: report.jobs.len(),
            successful_jobs: 0,
            failed_jobs: 0,
            skipped_jobs: 0,
            step_count: 0,
            failed_steps: 0,
        };

        for job in &report.jobs {
            match job.result {
                JobResult::Success => metrics.successful_jobs += 1,
                JobResult::Failure => metrics.failed_jobs += 1,
                JobResult::Skipped | JobResult::Cancelled => metrics.skipped_jobs += 1,
            }
            metrics.step_count += job.steps.len();
            metrics.failed_steps += job
                .steps
                .iter()
                .filter(|step| step.status == StepStatus::Failure)
                .count();
        }

        metrics
    }
}

/// Metrics collector for workflow runs
pub struct MetricsCollector {
    /// Collected metrics, keyed by workflow name
    metrics: Arc<RwLock<HashMap<String, RunMetrics>>>,
}

impl MetricsCollector {
    /// Creates a new metrics collector
    #[must_use]
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Records metrics for a workflow run
    pub fn record(&self, metrics: RunMetrics) {
        let mut metrics_map = self.metrics.write();
        metrics_map.insert(metrics.workflow.clone(), metrics);
    }

    /// Gets metrics for a specific workflow
    #[must_use]
    pub fn get(&self, workflow: &str) -> Option<RunMetrics> {
        let metrics_map = self.metrics.read();
        metrics_map.get(workflow).cloned()
    }

    /// Gets all recorded metrics
    #[must_use]
    pub fn get_all(&self) -> Vec<RunMetrics> {
        let metrics_map = self.metrics.read();
        metrics_map.values().cloned().collect()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
