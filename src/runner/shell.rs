//! Shell execution for run steps
//!
//! Run steps are handed to a POSIX shell (`sh -c` by default), so `$VAR`
//! references resolve natively; only `${{ ... }}` expressions are resolved
//! beforehand by the runner. Output is captured for the report and can be
//! streamed to the terminal line by line. A timeout kills the process
//! instead of abandoning it.

use std::collections::HashMap;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use wait_timeout::ChildExt;

use crate::workflow::WorkflowError;

/// Shell execution configuration
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Working directory
    pub cwd: PathBuf,

    /// Environment variables
    pub env: HashMap<String, String>,

    /// Shell to use (default: sh)
    pub shell: String,

    /// Echo output lines to the terminal while capturing them
    pub streaming: bool,

    /// Timeout for commands (None = no timeout)
    pub timeout: Option<Duration>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_default(),
            env: HashMap::new(),
            shell: "sh".to_string(),
            streaming: false,
            timeout: None,
        }
    }
}

/// Result of shell command execution
#[derive(Debug, Clone)]
pub struct ShellResult {
    /// Standard output
    pub stdout: String,

    /// Standard error
    pub stderr: String,

    /// Exit code; -1 when the process was killed
    pub exit_code: i32,

    /// Duration of execution
    pub duration: Duration,

    /// Whether the command was killed on timeout
    pub timed_out: bool,
}

impl ShellResult {
    /// Returns true if the command succeeded (exit code 0)
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// Returns true if the command failed
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    /// Combined stdout and stderr, in that order
    #[must_use]
    pub fn combined_output(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// Builder for shell commands
#[derive(Debug, Clone)]
pub struct ShellCommand<'a> {
    config: &'a ShellConfig,
    env_override: HashMap<String, String>,
}

impl<'a> ShellCommand<'a> {
    /// Creates a new shell command builder
    #[must_use]
    pub fn new(config: &'a ShellConfig) -> Self {
        Self {
            config,
            env_override: HashMap::new(),
        }
    }

    /// Adds environment variables for this command only
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_override.insert(key.into(), value.into());
        self
    }

    /// Executes a shell command.
    ///
    /// A completed process always yields `Ok`, whatever its exit code; the
    /// caller inspects [`ShellResult`]. `Err` means the process could not
    /// be spawned or waited on.
    #[allow(clippy::missing_errors_doc)]
    pub fn execute(&self, command: &str) -> Result<ShellResult, WorkflowError> {
        self.execute_with_shell(command, &self.config.shell)
    }

    /// Executes a command under an explicit shell binary
    #[allow(clippy::missing_errors_doc)]
    pub fn execute_with_shell(
        &self,
        command: &str,
        shell: &str,
    ) -> Result<ShellResult, WorkflowError> {
        let env: HashMap<String, String> = self
            .config
            .env
            .iter()
            .chain(self.env_override.iter())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        tracing::debug!(command = %command, shell = %shell, "Executing shell command");

        let mut cmd = Command::new(shell);
        cmd.arg("-c");
        cmd.arg(command);
        cmd.current_dir(&self.config.cwd);
        cmd.envs(&env);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| WorkflowError::Io(e.to_string()))?;

        let stdout_buf = Arc::new(Mutex::new(String::new()));
        let stderr_buf = Arc::new(Mutex::new(String::new()));

        let stdout_thread = child.stdout.take().map(|out| {
            let buf = Arc::clone(&stdout_buf);
            let streaming = self.config.streaming;
            std::thread::spawn(move || collect_lines(out, &buf, streaming, false))
        });
        let stderr_thread = child.stderr.take().map(|err| {
            let buf = Arc::clone(&stderr_buf);
            let streaming = self.config.streaming;
            std::thread::spawn(move || collect_lines(err, &buf, streaming, true))
        });

        let (status, timed_out) = match self.config.timeout {
            Some(limit) => match child
                .wait_timeout(limit)
                .map_err(|e| WorkflowError::Io(e.to_string()))?
            {
                Some(status) => (Some(status), false),
                None => {
                    // Deadline passed: kill the process, then reap it
                    let _ = child.kill();
                    let _ = child.wait();
                    (None, true)
                }
            },
            None => (
                Some(child.wait().map_err(|e| WorkflowError::Io(e.to_string()))?),
                false,
            ),
        };

        if let Some(handle) = stdout_thread {
            let _ = handle.join();
        }
        if let Some(handle) = stderr_thread {
            let _ = handle.join();
        }

        let stdout = lock_contents(&stdout_buf);
        let stderr = lock_contents(&stderr_buf);
        let exit_code = status.and_then(|s| s.code()).unwrap_or(-1);

        Ok(ShellResult {
            stdout,
            stderr,
            exit_code,
            duration: start.elapsed(),
            timed_out,
        })
    }
}

fn collect_lines(
    reader: impl io::Read,
    buf: &Arc<Mutex<String>>,
    streaming: bool,
    is_stderr: bool,
) {
    let reader = io::BufReader::new(reader);
    for line in reader.lines().map_while(Result::ok) {
        if streaming {
            if is_stderr {
                eprintln!("{line}");
            } else {
                println!("{line}");
            }
        }
        if let Ok(mut guard) = buf.lock() {
            guard.push_str(&line);
            guard.push('\n');
        }
    }
}

fn lock_contents(buf: &Arc<Mutex<String>>) -> String {
    buf.lock().map(|guard| guard.clone()).unwrap_or_default()
}
