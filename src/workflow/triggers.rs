//! Workflow triggers and the events matched against them
//!
//! A workflow declares the conditions under which it runs: pull requests
//! targeting one of a set of branches, and manual dispatch with optional
//! typed inputs. A [`TriggerEvent`] is a concrete occurrence offered to the
//! workflow; [`Triggers::matches`] decides whether the workflow fires.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::WorkflowError;

/// The trigger conditions a workflow declares
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triggers {
    /// Fire on pull requests targeting one of the listed branches
    #[serde(
        default,
        deserialize_with = "super::yaml::null_is_default",
        skip_serializing_if = "Option::is_none"
    )]
    pub pull_request: Option<PullRequestTrigger>,

    /// Fire on manual dispatch
    #[serde(
        default,
        alias = "workflow_dispatch",
        deserialize_with = "super::yaml::null_is_default",
        skip_serializing_if = "Option::is_none"
    )]
    pub dispatch: Option<DispatchTrigger>,
}

impl Triggers {
    /// Returns true if no trigger is declared
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pull_request.is_none() && self.dispatch.is_none()
    }

    /// Returns true if the event matches one of the declared triggers
    #[must_use]
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        match event {
            TriggerEvent::PullRequest { target_branch } => self
                .pull_request
                .as_ref()
                .is_some_and(|pr| pr.matches_branch(target_branch)),
            TriggerEvent::Dispatch { .. } => self.dispatch.is_some(),
        }
    }

    /// Human-readable list of the declared triggers, for error messages
    #[must_use]
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(pr) = &self.pull_request {
            if pr.branches.is_empty() {
                parts.push("pull-request[any branch]".to_string());
            } else {
                parts.push(format!("pull-request[{}]", pr.branches.join(", ")));
            }
        }
        if self.dispatch.is_some() {
            parts.push("dispatch".to_string());
        }
        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Pull request trigger with target branch filters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestTrigger {
    /// Target branches that fire the workflow; empty matches any branch
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<String>,
}

impl PullRequestTrigger {
    /// Creates a trigger for the given target branches
    pub fn new<I, S>(branches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            branches: branches.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true if a pull request targeting `branch` fires this trigger
    #[must_use]
    pub fn matches_branch(&self, branch: &str) -> bool {
        self.branches.is_empty() || self.branches.iter().any(|b| b == branch)
    }
}

/// Manual dispatch trigger with optional typed inputs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchTrigger {
    /// Declared inputs, resolved against the values provided at dispatch time
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub inputs: HashMap<String, DispatchInput>,
}

impl DispatchTrigger {
    /// Resolves the provided input values against the declared inputs.
    ///
    /// Declared defaults fill in missing values; a required input with no
    /// default and no provided value is an error. Values for undeclared
    /// inputs are passed through untouched.
    #[allow(clippy::missing_errors_doc)]
    pub fn resolve_inputs(
        &self,
        provided: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>, WorkflowError> {
        let mut resolved = provided.clone();
        for (name, spec) in &self.inputs {
            if resolved.contains_key(name) {
                continue;
            }
            match &spec.default {
                Some(default) => {
                    resolved.insert(name.clone(), default.clone());
                }
                None if spec.required => {
                    return Err(WorkflowError::MissingInput { name: name.clone() });
                }
                None => {}
            }
        }
        Ok(resolved)
    }
}

/// A single declared dispatch input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchInput {
    /// What the input is for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Value used when none is provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Whether a value must be available at dispatch time
    #[serde(default)]
    pub required: bool,
}

/// A concrete occurrence matched against a workflow's triggers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    /// A pull request targeting the named branch
    PullRequest {
        /// The branch the pull request targets
        target_branch: String,
    },

    /// A manual dispatch with the provided input values
    Dispatch {
        /// Input values supplied by the caller
        inputs: HashMap<String, String>,
    },
}

impl TriggerEvent {
    /// Creates a pull request event targeting `branch`
    pub fn pull_request(branch: impl Into<String>) -> Self {
        Self::PullRequest {
            target_branch: branch.into(),
        }
    }

    /// Creates a dispatch event with no inputs
    #[must_use]
    pub fn dispatch() -> Self {
        Self::Dispatch {
            inputs: HashMap::new(),
        }
    }

    /// Creates a dispatch event with the given inputs
    #[must_use]
    pub fn dispatch_with_inputs(inputs: HashMap<String, String>) -> Self {
        Self::Dispatch { inputs }
    }
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PullRequest { target_branch } => {
                write!(f, "pull-request targeting '{target_branch}'")
            }
            Self::Dispatch { .. } => write!(f, "dispatch"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pr_triggers(branches: &[&str]) -> Triggers {
        Triggers {
            pull_request: Some(PullRequestTrigger::new(branches.iter().copied())),
            dispatch: None,
        }
    }

    #[test]
    fn test_pull_request_matches_listed_branch() {
        let triggers = pr_triggers(&["main"]);
        assert!(triggers.matches(&TriggerEvent::pull_request("main")));
        assert!(!triggers.matches(&TriggerEvent::pull_request("develop")));
    }

    #[test]
    fn test_pull_request_empty_branches_matches_any() {
        let triggers = pr_triggers(&[]);
        assert!(triggers.matches(&TriggerEvent::pull_request("anything")));
    }

    #[test]
    fn test_dispatch_requires_declared_trigger() {
        let triggers = pr_triggers(&["main"]);
        assert!(!triggers.matches(&TriggerEvent::dispatch()));

        let triggers = Triggers {
            pull_request: None,
            dispatch: Some(DispatchTrigger::default()),
        };
        assert!(triggers.matches(&TriggerEvent::dispatch()));
        assert!(!triggers.matches(&TriggerEvent::pull_request("main")));
    }

    #[test]
    fn test_describe() {
        let triggers = Triggers {
            pull_request: Some(PullRequestTrigger::new(["main", "develop"])),
            dispatch: Some(DispatchTrigger::default()),
        };
        assert_eq!(triggers.describe(), "pull-request[main, develop], dispatch");
        assert_eq!(Triggers::default().describe(), "none");
    }

    #[test]
    fn test_resolve_inputs_applies_defaults() {
        let mut inputs = HashMap::new();
        inputs.insert(
            "suite".to_string(),
            DispatchInput {
                description: None,
                default: Some("smoke".to_string()),
                required: false,
            },
        );
        let trigger = DispatchTrigger { inputs };

        let resolved = trigger.resolve_inputs(&HashMap::new()).unwrap();
        assert_eq!(resolved.get("suite").map(String::as_str), Some("smoke"));

        let mut provided = HashMap::new();
        provided.insert("suite".to_string(), "full".to_string());
        let resolved = trigger.resolve_inputs(&provided).unwrap();
        assert_eq!(resolved.get("suite").map(String::as_str), Some("full"));
    }

    #[test]
    fn test_resolve_inputs_missing_required() {
        let mut inputs = HashMap::new();
        inputs.insert(
            "target".to_string(),
            DispatchInput {
                description: Some("deploy target".to_string()),
                default: None,
                required: true,
            },
        );
        let trigger = DispatchTrigger { inputs };

        let err = trigger.resolve_inputs(&HashMap::new()).unwrap_err();
        assert!(matches!(err, WorkflowError::MissingInput { name } if name == "target"));
    }

    #[test]
    fn test_triggers_yaml_round_trip() {
        let yaml = "pull_request:\n  branches: [main]\ndispatch: {}\n";
        let triggers: Triggers = serde_yaml::from_str(yaml).unwrap();
        assert!(triggers.pull_request.is_some());
        assert!(triggers.dispatch.is_some());
        assert_eq!(
            triggers.pull_request.as_ref().unwrap().branches,
            vec!["main"]
        );

        let back = serde_yaml::to_string(&triggers).unwrap();
        let reparsed: Triggers = serde_yaml::from_str(&back).unwrap();
        assert_eq!(triggers, reparsed);
    }

    #[test]
    fn test_bare_trigger_keys_still_declare() {
        // a key with no body is a declaration, not an omission
        let triggers: Triggers = serde_yaml::from_str("dispatch:\n").unwrap();
        assert!(triggers.dispatch.is_some());
        assert!(triggers.matches(&TriggerEvent::dispatch()));

        let triggers: Triggers = serde_yaml::from_str("pull_request:\n").unwrap();
        let pr = triggers.pull_request.unwrap();
        assert!(pr.branches.is_empty());
    }

    #[test]
    fn test_workflow_dispatch_alias() {
        let triggers: Triggers = serde_yaml::from_str("workflow_dispatch: {}\n").unwrap();
        assert!(triggers.dispatch.is_some());
    }
}
