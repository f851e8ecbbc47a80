//! One-shot command execution for `/cmd`.
//!
//! The argument string is split into words the way a POSIX shell would
//! split it, but no shell is involved: the first word is the program and
//! the rest are passed to it verbatim. Standard output and standard error
//! are collected in full and returned together once the program exits.

use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

/// Errors from running a single command.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExecError {
    /// No program was given.
    #[error("usage: /cmd <command>")]
    Empty,

    /// The argument string could not be split into words.
    #[error("could not parse command: {0}")]
    Parse(String),

    /// The program could not be started.
    #[error("error running '{program}': {reason}")]
    Launch {
        /// Program name as given.
        program: String,
        /// Underlying error.
        reason: String,
    },

    /// The program exited with a non-zero status.
    #[error("exit status {0}")]
    ExitStatus(i32),

    /// The program was killed by a signal.
    #[error("terminated by signal")]
    Signaled,

    /// The program ran longer than allowed and was killed.
    #[error("command timed out after {0:?}")]
    TimedOut(Duration),
}

/// Collected result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output followed by standard error.
    pub output: String,
    /// Exit code, or `None` if the program was killed by a signal.
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Returns the failure to report alongside the output, if the program
    /// did not exit successfully.
    pub fn failure(&self) -> Option<ExecError> {
        match self.code {
            Some(0) => None,
            Some(code) => Some(ExecError::ExitStatus(code)),
            None => Some(ExecError::Signaled),
        }
    }
}

/// Runs `/cmd` commands.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    timeout: Option<Duration>,
}

impl CommandRunner {
    /// Creates a runner. Commands are killed after `timeout`, if set.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Runs `command_line` to completion and collects its output.
    pub async fn run(&self, command_line: &str) -> Result<CommandOutput, ExecError> {
        let words = shell_words::split(command_line).map_err(|e| ExecError::Parse(e.to_string()))?;
        let (program, args) = words.split_first().ok_or(ExecError::Empty)?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(program = %program, args = args.len(), "Running single command");

        let child = command.output();
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child)
                .await
                .map_err(|_| ExecError::TimedOut(limit))?,
            None => child.await,
        };

        let output = result.map_err(|e| ExecError::Launch {
            program: program.clone(),
            reason: e.to_string(),
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        tracing::debug!(program = %program, code = ?output.status.code(), bytes = combined.len(), "Single command finished");

        Ok(CommandOutput {
            output: combined,
            code: output.status.code(),
        })
    }
}
