//! Infrastructure layer
//!
//! This module contains configuration, observability and CI exporters.

mod config;
mod github_actions;
mod gitlab_ci;
mod logging;
mod metrics;

pub use config::{Config, DEFAULT_CONFIG_FILE};
pub use github_actions::GitHubActionsBackend;
pub use gitlab_ci::GitLabCIBackend;
pub use logging::init_logging;
pub use metrics::{MetricsCollector, RunMetrics};
