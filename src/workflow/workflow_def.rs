//! Workflow definition and builder

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::workflow::errors::ValidationError;
use crate::workflow::job::{Job, JobInstance};
use crate::workflow::triggers::{DispatchTrigger, PullRequestTrigger, Triggers};
use crate::workflow::types::{Validate, WorkflowResult};
use crate::workflow::{WorkflowError, yaml};

/// Main workflow structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow name
    #[serde(default)]
    pub name: String,

    /// Trigger conditions
    #[serde(default, skip_serializing_if = "Triggers::is_empty")]
    pub on: Triggers,

    /// Environment variables for every job
    #[serde(
        default,
        deserialize_with = "yaml::string_map",
        skip_serializing_if = "HashMap::is_empty"
    )]
    pub env: HashMap<String, String>,

    /// Jobs keyed by id, in declaration order
    #[serde(default, with = "yaml::ordered_map")]
    pub jobs: Vec<(String, Job)>,
}

impl Validate for Workflow {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }

        if self.name.len() > 100 {
            return Err(ValidationError::NameTooLong {
                max: 100,
                len: self.name.len(),
            });
        }

        if self.on.is_empty() {
            return Err(ValidationError::NoTriggers);
        }

        if self.jobs.is_empty() {
            return Err(ValidationError::EmptyWorkflow);
        }

        for (id, job) in &self.jobs {
            job.validate_for(id)?;

            for need in &job.needs {
                if !self.jobs.iter().any(|(other, _)| other == need) {
                    return Err(ValidationError::UnknownDependency {
                        job: id.clone(),
                        needs: need.clone(),
                    });
                }
            }
        }

        self.execution_order().map(|_| ())
    }
}

impl Workflow {
    /// Creates a new workflow builder
    pub fn builder(name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder::new(name)
    }

    /// Parses a workflow from YAML text
    #[allow(clippy::missing_errors_doc)]
    pub fn from_yaml_str(yaml: &str) -> WorkflowResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| WorkflowError::Parse(e.to_string()))
    }

    /// Loads and parses a workflow file
    #[allow(clippy::missing_errors_doc)]
    pub fn load(path: impl AsRef<Path>) -> WorkflowResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Serializes the workflow back to YAML
    #[allow(clippy::missing_errors_doc)]
    pub fn to_yaml(&self) -> WorkflowResult<String> {
        serde_yaml::to_string(self).map_err(|e| WorkflowError::Parse(e.to_string()))
    }

    /// Looks up a job by id
    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs
            .iter()
            .find(|(job_id, _)| job_id == id)
            .map(|(_, job)| job)
    }

    /// Returns the job ids in declaration order
    pub fn job_ids(&self) -> Vec<&str> {
        self.jobs.iter().map(|(id, _)| id.as_str()).collect()
    }

    /// Number of jobs in the workflow
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Computes a dependency-respecting job order.
    ///
    /// Jobs with satisfied dependencies are emitted in declaration order,
    /// so the result is deterministic. Unknown dependency names are caught
    /// by [`Validate::validate`]; here they surface as a cycle.
    #[allow(clippy::missing_errors_doc)]
    pub fn execution_order(&self) -> Result<Vec<String>, ValidationError> {
        let index_of: HashMap<&str, usize> = self
            .jobs
            .iter()
            .enumerate()
            .map(|(index, (id, _))| (id.as_str(), index))
            .collect();

        let mut done = vec![false; self.jobs.len()];
        let mut order = Vec::with_capacity(self.jobs.len());

        while order.len() < self.jobs.len() {
            let mut progressed = false;
            for (index, (id, job)) in self.jobs.iter().enumerate() {
                if done[index] {
                    continue;
                }
                let ready = job
                    .needs
                    .iter()
                    .all(|need| index_of.get(need.as_str()).is_some_and(|&p| done[p]));
                if ready {
                    done[index] = true;
                    order.push(id.clone());
                    progressed = true;
                }
            }
            if !progressed {
                let stuck = self
                    .jobs
                    .iter()
                    .enumerate()
                    .find(|(index, _)| !done[*index])
                    .map(|(_, (id, _))| id.clone())
                    .unwrap_or_default();
                return Err(ValidationError::DependencyCycle { job: stuck });
            }
        }

        Ok(order)
    }

    /// Expands every job into its concrete instances, in execution order.
    ///
    /// Matrix jobs contribute one instance per entry; a matrix whose
    /// exclusions remove every entry contributes none.
    #[allow(clippy::missing_errors_doc)]
    pub fn expand_jobs(&self) -> WorkflowResult<Vec<JobInstance>> {
        let order = self.execution_order()?;
        let mut instances = Vec::new();
        for id in &order {
            if let Some(job) = self.job(id) {
                instances.extend(job.instances(id)?);
            }
        }
        Ok(instances)
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Workflow({}): {} jobs", self.name, self.jobs.len())
    }
}

/// Builder for creating workflows
#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    workflow: Workflow,
}

impl WorkflowBuilder {
    /// Creates a new workflow builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            workflow: Workflow {
                name: name.into(),
                ..Workflow::default()
            },
        }
    }

    /// Declares a pull request trigger for the given target branches
    pub fn on_pull_request<I, S>(mut self, branches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.workflow.on.pull_request = Some(PullRequestTrigger::new(branches));
        self
    }

    /// Declares a manual dispatch trigger
    pub fn on_dispatch(mut self) -> Self {
        self.workflow.on.dispatch = Some(DispatchTrigger::default());
        self
    }

    /// Sets the full trigger block
    pub fn on(mut self, triggers: Triggers) -> Self {
        self.workflow.on = triggers;
        self
    }

    /// Adds a workflow-wide environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.workflow.env.insert(key.into(), value.into());
        self
    }

    /// Adds a job under the given id
    pub fn job(mut self, id: impl Into<String>, job: Job) -> Self {
        self.workflow.jobs.push((id.into(), job));
        self
    }

    /// Builds workflow
    #[allow(clippy::missing_errors_doc)]
    pub fn build(self) -> Result<Workflow, ValidationError> {
        self.workflow.validate()?;
        Ok(self.workflow)
    }

    /// Builds workflow without validation (for internal use)
    #[must_use]
    pub fn build_unchecked(self) -> Workflow {
        self.workflow
    }
}
