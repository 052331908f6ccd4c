//! flowline - a local runner for CI workflow files
//!
//! A set of command-line utilities that validate, inspect and execute
//! workflow definitions without a hosted CI service.
//!
//! ## Commands
//!
//! - `flowline check` - Parse and validate a workflow file
//! - `flowline lint` - Analyze workflows for best practices
//! - `flowline jobs` - List the expanded matrix job instances
//! - `flowline run` - Execute a workflow on this machine
//! - `flowline doc` - Summarize a workflow as documentation
//! - `flowline export` - Convert workflows to hosted CI formats
//! - `flowline completions` - Generate shell completions
//!
//! ## Installation
//!
//! ```bash
//! cargo install flowline
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! # Validate a workflow
//! flowline check ci.yml
//!
//! # Check for best practices
//! flowline lint ci.yml
//!
//! # Run it as if a pull request against main came in
//! flowline run ci.yml --event pull-request --branch main
//!
//! # Run only one job, in a container
//! flowline run ci.yml --job test --runner docker
//!
//! # Export to GitHub Actions
//! flowline export ci.yml --format github -o .github/workflows/ci.yml
//!
//! # Generate shell completions
//! flowline completions bash > /etc/bash_completion.d/flowline
//! ```
//!
//! ## See Also
//!
//! - [flowline crate](https://crates.io/crates/flowline) - The core workflow library

use std::process::ExitCode;

mod cli;

fn main() -> ExitCode {
    // Debug tracing ahead of any config-driven logging setup
    if std::env::var("FLOWLINE_DEBUG").is_ok() {
        flowline::infrastructure::init_logging("debug");
    }

    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            if std::env::var("FLOWLINE_VERBOSE").is_ok() {
                eprintln!("{e:?}");
            }
            ExitCode::FAILURE
        }
    }
}
