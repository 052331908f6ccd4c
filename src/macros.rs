//! Declarative macros for building workflows
//!
//! This module contains macros for defining workflows in Rust code with
//! a block syntax that mirrors the YAML schema.

/// Creates a command step
#[macro_export]
macro_rules! run_cmd {
    ($cmd:expr) => {
        $crate::workflow::Step::run_command($cmd)
    };
    ($name:expr, $cmd:expr) => {
        $crate::workflow::Step::run_command($cmd).with_name($name)
    };
}

/// Creates an action step, optionally with inputs
#[macro_export]
macro_rules! uses {
    ($reference:expr) => {
        $crate::workflow::Step::uses_action($reference)
    };
    ($reference:expr, { $($key:expr => $value:expr),* $(,)? }) => {{
        let mut step = $crate::workflow::Step::uses_action($reference);
        $(
            step = step.with_input($key, $value.to_string());
        )*
        step
    }};
}

/// Creates a list of steps
#[macro_export]
macro_rules! steps {
    ($($step:expr),* $(,)?) => {
        vec![$($step),*]
    };
}

/// Creates a job on a platform, optionally with a matrix
#[macro_export]
macro_rules! job {
    ($runs_on:expr, $steps:expr) => {
        $crate::workflow::Job::new($runs_on).with_steps($steps)
    };
    ($runs_on:expr, $matrix:expr, $steps:expr) => {
        $crate::workflow::Job::new($runs_on)
            .with_matrix($matrix)
            .with_steps($steps)
    };
}

/// Creates a matrix from named axes
#[macro_export]
macro_rules! matrix {
    ( $( $axis:ident = [ $($value:expr),* $(,)? ] ),* $(,)? ) => {{
        let mut matrix = $crate::workflow::Matrix::new();
        $(
            matrix = matrix.add_axis(stringify!($axis), vec![$($value.to_string()),*]);
        )*
        matrix
    }};
}

/// Creates a trigger block firing on pull requests.
///
/// Listing no branches matches pull requests against any branch.
#[macro_export]
macro_rules! on_pull_request {
    ( $($branch:expr),* $(,)? ) => {
        $crate::workflow::Triggers {
            pull_request: Some($crate::workflow::PullRequestTrigger {
                branches: vec![$($branch.to_string()),*],
            }),
            dispatch: None,
        }
    };
}

/// Creates a trigger block firing on manual dispatch
#[macro_export]
macro_rules! on_dispatch {
    () => {
        $crate::workflow::Triggers {
            pull_request: None,
            dispatch: Some($crate::workflow::DispatchTrigger::default()),
        }
    };
}

/// Creates a workflow using declarative block syntax.
///
/// The macro does not validate the result; call
/// [`Validate::validate`](crate::workflow::Validate::validate) on it or
/// assemble through [`WorkflowBuilder::build`](crate::workflow::WorkflowBuilder::build)
/// when validation should gate construction.
#[macro_export]
macro_rules! workflow {
    // Dispatch-only workflow
    (
        name($name:expr)
        on {
            dispatch()
        }
        jobs {
            $( $job_id:expr => $job:expr ),* $(,)?
        }
    ) => {{
        let mut builder = $crate::workflow::Workflow::builder($name).on_dispatch();
        $(
            builder = builder.job($job_id, $job);
        )*
        builder.build_unchecked()
    }};
    // Pull-request workflow
    (
        name($name:expr)
        on {
            pull_request($($branch:expr),* $(,)?)
        }
        jobs {
            $( $job_id:expr => $job:expr ),* $(,)?
        }
    ) => {{
        let triggers = $crate::workflow::Triggers {
            pull_request: Some($crate::workflow::PullRequestTrigger {
                branches: vec![$($branch.to_string()),*],
            }),
            dispatch: None,
        };
        let mut builder = $crate::workflow::Workflow::builder($name).on(triggers);
        $(
            builder = builder.job($job_id, $job);
        )*
        builder.build_unchecked()
    }};
    // Workflow with both triggers
    (
        name($name:expr)
        on {
            pull_request($($branch:expr),* $(,)?)
            dispatch()
        }
        jobs {
            $( $job_id:expr => $job:expr ),* $(,)?
        }
    ) => {{
        let triggers = $crate::workflow::Triggers {
            pull_request: Some($crate::workflow::PullRequestTrigger {
                branches: vec![$($branch.to_string()),*],
            }),
            dispatch: Some($crate::workflow::DispatchTrigger::default()),
        };
        let mut builder = $crate::workflow::Workflow::builder($name).on(triggers);
        $(
            builder = builder.job($job_id, $job);
        )*
        builder.build_unchecked()
    }};
    // Dispatch workflow with environment
    (
        name($name:expr)
        on {
            dispatch()
        }
        env {
            $($env_key:ident = $env_value:expr),* $(,)?
        }
        jobs {
            $( $job_id:expr => $job:expr ),* $(,)?
        }
    ) => {{
        let mut builder = $crate::workflow::Workflow::builder($name).on_dispatch();
        $(
            builder = builder.env(stringify!($env_key), $env_value.to_string());
        )*
        $(
            builder = builder.job($job_id, $job);
        )*
        builder.build_unchecked()
    }};
    // Full workflow
    (
        name($name:expr)
        on {
            pull_request($($branch:expr),* $(,)?)
            dispatch()
        }
        env {
            $($env_key:ident = $env_value:expr),* $(,)?
        }
        jobs {
            $( $job_id:expr => $job:expr ),* $(,)?
        }
    ) => {{
        let triggers = $crate::workflow::Triggers {
            pull_request: Some($crate::workflow::PullRequestTrigger {
                branches: vec![$($branch.to_string()),*],
            }),
            dispatch: Some($crate::workflow::DispatchTrigger::default()),
        };
        let mut builder = $crate::workflow::Workflow::builder($name).on(triggers);
        $(
            builder = builder.env(stringify!($env_key), $env_value.to_string());
        )*
        $(
            builder = builder.job($job_id, $job);
        )*
        builder.build_unchecked()
    }};
}

#[cfg(test)]
mod tests {
    use crate::workflow::{StepKind, TriggerEvent, Validate};

    #[test]
    fn test_run_cmd_macro() {
        let step = run_cmd!("tox -e py");
        assert!(matches!(step.kind(), Some(StepKind::Run("tox -e py"))));
    }

    #[test]
    fn test_run_cmd_macro_named() {
        let step = run_cmd!("Unit tests", "tox -e py");
        assert_eq!(step.display_name(), "Unit tests");
        assert_eq!(step.run.as_deref(), Some("tox -e py"));
    }

    #[test]
    fn test_uses_macro() {
        let step = uses!("actions/checkout@v4");
        assert!(matches!(
            step.kind(),
            Some(StepKind::Uses("actions/checkout@v4"))
        ));
    }

    #[test]
    fn test_uses_macro_with_inputs() {
        let step = uses!("actions/setup-python@v5", {
            "python-version" => "3.10",
        });
        assert_eq!(
            step.with.get("python-version").map(String::as_str),
            Some("3.10")
        );
    }

    #[test]
    fn test_steps_macro() {
        let steps = steps!(run_cmd!("echo 1"), run_cmd!("echo 2"));
        assert_eq!(steps.len(), 2);
    }

    #[test]
    fn test_steps_macro_trailing_comma() {
        let steps = steps!(uses!("actions/checkout@v4"), run_cmd!("make"),);
        assert_eq!(steps.len(), 2);
    }

    #[test]
    fn test_matrix_macro() {
        let matrix = matrix!(
            os = ["ubuntu-22.04", "macos-13"],
            interpreter = ["3.10"],
        );
        assert_eq!(matrix.axes.len(), 2);
        assert_eq!(matrix.axes[0].name, "os");
        assert_eq!(matrix.axes[1].values, vec!["3.10"]);
        assert_eq!(matrix.expand().len(), 2);
    }

    #[test]
    fn test_job_macro() {
        let job = job!("ubuntu-22.04", steps!(run_cmd!("make")));
        assert_eq!(job.runs_on, "ubuntu-22.04");
        assert_eq!(job.steps.len(), 1);
        assert!(job.strategy.is_none());
    }

    #[test]
    fn test_job_macro_with_matrix() {
        let job = job!(
            "${{ matrix.os }}",
            matrix!(os = ["ubuntu-22.04", "macos-13"]),
            steps!(run_cmd!("tox -e py"))
        );
        let instances = job.instances("test").unwrap();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].runs_on, "ubuntu-22.04");
        assert_eq!(instances[1].name, "test (macos-13)");
    }

    #[test]
    fn test_workflow_macro_dispatch() {
        let workflow = workflow! {
            name("ci")
            on {
                dispatch()
            }
            jobs {
                "test" => job!("ubuntu-22.04", steps!(run_cmd!("tox -e py"))),
            }
        };
        assert_eq!(workflow.name, "ci");
        assert!(workflow.on.dispatch.is_some());
        assert!(workflow.on.pull_request.is_none());
        assert!(workflow.validate().is_ok());
    }

    #[test]
    fn test_workflow_macro_pull_request() {
        let workflow = workflow! {
            name("ci")
            on {
                pull_request("main", "develop")
            }
            jobs {
                "lint" => job!("ubuntu-22.04", steps!(run_cmd!("tox -e lint"))),
            }
        };
        let pr = workflow.on.pull_request.as_ref().unwrap();
        assert_eq!(pr.branches, vec!["main", "develop"]);
        assert!(workflow.on.matches(&TriggerEvent::pull_request("main")));
        assert!(!workflow.on.matches(&TriggerEvent::dispatch()));
    }

    #[test]
    fn test_workflow_macro_both_triggers() {
        let workflow = workflow! {
            name("ci")
            on {
                pull_request("main")
                dispatch()
            }
            jobs {
                "test" => job!("ubuntu-22.04", steps!(run_cmd!("tox -e py"))),
            }
        };
        assert!(workflow.on.matches(&TriggerEvent::pull_request("main")));
        assert!(workflow.on.matches(&TriggerEvent::dispatch()));
    }

    #[test]
    fn test_workflow_macro_with_env() {
        let workflow = workflow! {
            name("ci")
            on {
                dispatch()
            }
            env {
                PYTHONUNBUFFERED = "1",
                RETRIES = 2
            }
            jobs {
                "test" => job!("ubuntu-22.04", steps!(run_cmd!("tox -e py"))),
            }
        };
        assert_eq!(
            workflow.env.get("PYTHONUNBUFFERED").map(String::as_str),
            Some("1")
        );
        assert_eq!(workflow.env.get("RETRIES").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_workflow_macro_full() {
        let workflow = workflow! {
            name("ci")
            on {
                pull_request("main")
                dispatch()
            }
            env {
                CI = "true"
            }
            jobs {
                "lint" => job!("ubuntu-22.04", steps!(run_cmd!("tox -e lint"))),
                "test" => job!(
                    "${{ matrix.os }}",
                    matrix!(os = ["ubuntu-22.04", "macos-13"]),
                    steps!(
                        uses!("actions/checkout@v4"),
                        run_cmd!("Unit tests", "tox -e py"),
                    )
                )
                .with_need("lint"),
            }
        };

        assert!(workflow.validate().is_ok());
        assert_eq!(workflow.job_ids(), vec!["lint", "test"]);
        assert_eq!(workflow.expand_jobs().unwrap().len(), 3);
        assert_eq!(
            workflow.execution_order().unwrap(),
            vec!["lint".to_string(), "test".to_string()]
        );
    }
}
