//! CLI for flowline
//!
//! The `flowline` binary's subcommands:
//! - `check`: Parse and validate a workflow file
//! - `lint`: Analyze workflows for best practices
//! - `jobs`: List the expanded matrix job instances
//! - `run`: Execute a workflow
//! - `doc`: Summarize a workflow as documentation
//! - `export`: Convert workflows to hosted CI formats
//! - `completions`: Generate shell completions

pub mod check;
pub mod completions;
pub mod doc;
pub mod export;
pub mod jobs;
pub mod lint;
pub mod run;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use flowline::workflow::TriggerEvent;

/// CLI arguments for flowline
#[derive(Parser, Debug)]
#[command(name = "flowline")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse and validate a workflow file
    Check {
        /// Workflow file to validate
        file: PathBuf,
        /// Only set the exit code, print nothing
        #[arg(short, long)]
        quiet: bool,
    },

    /// Analyze a workflow for best practices
    Lint {
        /// Workflow file to lint
        file: PathBuf,
        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<LintFormat>,
        /// Minimum severity to show
        #[arg(short, long, value_enum)]
        severity: Option<LintSeverityArg>,
        /// Show suggested fixes
        #[arg(long)]
        suggestions: bool,
    },

    /// List the job instances a workflow expands into
    Jobs {
        /// Workflow file to inspect
        file: PathBuf,
        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<JobsFormatArg>,
    },

    /// Execute a workflow
    Run {
        /// Workflow file to run
        file: PathBuf,
        /// Event to simulate (default: dispatch)
        #[arg(short, long, value_enum)]
        event: Option<EventArg>,
        /// Target branch for pull-request events
        #[arg(short, long)]
        branch: Option<String>,
        /// Dispatch input as KEY=VALUE (repeatable)
        #[arg(short, long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,
        /// Run only this job
        #[arg(short, long)]
        job: Option<String>,
        /// Runner backend (default: from config)
        #[arg(short, long, value_enum)]
        runner: Option<RunnerArg>,
        /// Walk the workflow without executing anything
        #[arg(long)]
        dry_run: bool,
        /// Keep run workspaces on disk after the run
        #[arg(long)]
        keep_workspace: bool,
        /// Config file (default: ./.flowline.yaml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Summarize a workflow as documentation
    Doc {
        /// Workflow file to document
        file: PathBuf,
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<DocFormatArg>,
    },

    /// Export a workflow to a hosted CI format
    Export {
        /// Workflow file to export
        file: PathBuf,
        /// Export format
        #[arg(short, long, value_enum)]
        format: ExportFormatArg,
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: ShellArg,
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LintFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LintSeverityArg {
    Info,
    Warning,
    Error,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum JobsFormatArg {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum EventArg {
    PullRequest,
    Dispatch,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum RunnerArg {
    Local,
    Docker,
    Podman,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum DocFormatArg {
    Markdown,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ExportFormatArg {
    Github,
    Gitlab,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ShellArg {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell")]
    PowerShell,
}

/// Build the CLI command for completion generation
pub fn build_cli() -> clap::Command {
    Args::command()
}

/// Parse and execute CLI arguments
///
/// # Errors
///
/// Returns an error when the subcommand fails; the binary maps it onto a
/// non-zero exit code.
pub fn run() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Check { file, quiet } => {
            check::check_workflow(&file, quiet)?;
        }
        Command::Lint {
            file,
            format,
            severity,
            suggestions,
        } => {
            let config = lint::LintConfig {
                min_severity: match severity {
                    Some(LintSeverityArg::Warning) => lint::LintSeverity::Warning,
                    Some(LintSeverityArg::Error) => lint::LintSeverity::Error,
                    Some(LintSeverityArg::Info) | None => lint::LintSeverity::Info,
                },
                show_suggestions: suggestions,
                format: match format {
                    Some(LintFormat::Json) => lint::OutputFormat::Json,
                    Some(LintFormat::Text) | None => lint::OutputFormat::Text,
                },
            };

            let messages = lint::lint_workflow(&file, &config)?;
            let output = lint::format_lint_messages(&messages, config.format);
            println!("{output}");
        }
        Command::Jobs { file, format } => {
            let format = match format {
                Some(JobsFormatArg::Json) => jobs::JobsFormat::Json,
                Some(JobsFormatArg::Text) | None => jobs::JobsFormat::Text,
            };

            let listing = jobs::list_jobs(&file, format)?;
            println!("{listing}");
        }
        Command::Run {
            file,
            event,
            branch,
            inputs,
            job,
            runner,
            dry_run,
            keep_workspace,
            config,
        } => {
            let event = match event {
                Some(EventArg::PullRequest) => {
                    let branch = branch.context("--event pull-request requires --branch")?;
                    if !inputs.is_empty() {
                        anyhow::bail!("--input only applies to dispatch events");
                    }
                    TriggerEvent::pull_request(branch)
                }
                Some(EventArg::Dispatch) | None => {
                    TriggerEvent::dispatch_with_inputs(run::parse_inputs(&inputs)?)
                }
            };

            let options = run::RunOptions {
                event,
                job,
                runner: runner.map(|r| {
                    match r {
                        RunnerArg::Local => "local",
                        RunnerArg::Docker => "docker",
                        RunnerArg::Podman => "podman",
                    }
                    .to_string()
                }),
                dry_run,
                keep_workspace,
                config_file: config,
            };

            let report = run::run_workflow(&file, &options)?;
            println!("{}", report.render_text());
            if !report.is_success() {
                anyhow::bail!(
                    "workflow '{}' concluded {}",
                    report.workflow,
                    report.conclusion
                );
            }
        }
        Command::Doc {
            file,
            output,
            format,
        } => {
            let doc_format = match format {
                Some(DocFormatArg::Json) => doc::DocFormat::Json,
                Some(DocFormatArg::Markdown) | None => doc::DocFormat::Markdown,
            };

            let documentation = doc::generate_doc(&file, doc_format)?;

            if let Some(output_path) = output {
                doc::save_doc(&documentation, &output_path)?;
            } else {
                println!("{documentation}");
            }
        }
        Command::Export {
            file,
            format,
            output,
        } => {
            let export_format = match format {
                ExportFormatArg::Github => export::ExportFormat::GitHubActions,
                ExportFormatArg::Gitlab => export::ExportFormat::GitLabCI,
            };

            let exported = export::export_workflow(&file, export_format)?;

            if let Some(output_path) = output {
                export::save_export(&exported, &output_path)?;
            } else {
                println!("{exported}");
            }
        }
        Command::Completions { shell, output } => {
            use clap_complete::Shell;

            let shell_enum = match shell {
                ShellArg::Bash => Shell::Bash,
                ShellArg::Zsh => Shell::Zsh,
                ShellArg::Fish => Shell::Fish,
                ShellArg::PowerShell => Shell::PowerShell,
            };

            let completions = completions::generate_completions(shell_enum)?;

            if let Some(output_path) = output {
                completions::save_completions(&completions, &output_path)?;
            } else {
                println!("{completions}");
            }
        }
    }

    Ok(())
}
