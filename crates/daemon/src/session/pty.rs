//! Pseudo-terminal process spawning.
//!
//! A [`PtyProcess`] is a shell process attached to the slave side of a
//! pseudo-terminal. Writing to it is typing at the terminal; the output is
//! read from a reader cloned off the master side.

use std::io::{Read, Write};
use std::path::PathBuf;

use portable_pty::{native_pty_system, Child, CommandBuilder, ExitStatus, MasterPty, PtySize};
use thiserror::Error;

/// Unique identifier for a session.
pub type SessionId = String;

/// Terminal type requested by default. A basic terminal keeps programs from
/// emitting color and cursor sequences that turn into garbage in chat.
pub const DEFAULT_TERM: &str = "vt220";

/// Errors that can occur during session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Failed to spawn the PTY or the shell.
    #[error("failed to spawn PTY: {0}")]
    SpawnFailed(String),

    /// The shell was spawned but could not be prepared for chat use.
    #[error("failed to prepare shell: {0}")]
    SetupFailed(String),

    /// Failed to write to the PTY.
    #[error("failed to write to PTY: {0}")]
    WriteFailed(String),

    /// Writing a command to a running session failed.
    #[error("error running '{command}': {reason}")]
    ExecFailed {
        /// The command text as typed by the operator.
        command: String,
        /// Underlying write failure.
        reason: String,
    },

    /// The session has already been terminated.
    #[error("session already terminated: {0}")]
    AlreadyTerminated(SessionId),

    /// Failed to kill the shell process.
    #[error("failed to kill session: {0}")]
    KillFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parameters for spawning a shell on a fresh pseudo-terminal.
///
/// The terminal type and extra variables are applied to the child only; the
/// daemon's own environment is never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnConfig {
    /// Shell program to run.
    pub shell: String,
    /// Value of `TERM` for the child.
    pub term: String,
    /// Additional environment variables for the child.
    pub env: Vec<(String, String)>,
    /// Working directory; inherits the daemon's when `None`.
    pub cwd: Option<PathBuf>,
    /// Terminal width in columns.
    pub cols: u16,
    /// Terminal height in rows.
    pub rows: u16,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            shell: detect_shell(None),
            term: DEFAULT_TERM.to_string(),
            env: Vec::new(),
            cwd: None,
            cols: 80,
            rows: 24,
        }
    }
}

impl SpawnConfig {
    /// Creates a spawn configuration for the given shell.
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            ..Default::default()
        }
    }

    /// Sets the terminal type.
    pub fn with_term(mut self, term: impl Into<String>) -> Self {
        self.term = term.into();
        self
    }

    /// Adds an environment variable for the child.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// The pieces of a [`PtyProcess`], for owners that guard them separately.
pub struct PtyParts {
    /// The PTY master handle. The terminal stays open while it lives.
    pub master: Box<dyn MasterPty + Send>,
    /// Terminal input.
    pub writer: Box<dyn Write + Send>,
    /// The shell process.
    pub child: Box<dyn Child + Send + Sync>,
}

/// A shell process attached to a pseudo-terminal.
pub struct PtyProcess {
    /// The PTY master handle. Kept open for the lifetime of the process.
    master: Box<dyn MasterPty + Send>,

    /// The writer for the PTY.
    writer: Box<dyn Write + Send>,

    /// The child process.
    child: Box<dyn Child + Send + Sync>,

    /// Process ID.
    pid: Option<u32>,
}

impl PtyProcess {
    /// Spawns the configured shell on a new pseudo-terminal.
    pub fn spawn(config: &SpawnConfig) -> Result<Self, SessionError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows: config.rows,
                cols: config.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&config.shell);
        cmd.env("TERM", &config.term);
        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        if let Some(ref dir) = config.cwd {
            cmd.cwd(dir);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        // The parent must not hold the slave open, or the reader never sees
        // end-of-stream when the shell exits.
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        let pid = child.process_id();

        tracing::debug!(shell = %config.shell, term = %config.term, pid = ?pid, "Spawned shell on PTY");

        Ok(Self {
            master: pair.master,
            writer,
            child,
            pid,
        })
    }

    /// Returns the process ID of the shell, if available.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Returns a reader over the terminal output.
    ///
    /// Reads block until output is available, and report end-of-stream or an
    /// I/O error once the shell has gone away.
    pub fn try_clone_reader(&self) -> Result<Box<dyn Read + Send>, SessionError> {
        self.master
            .try_clone_reader()
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))
    }

    /// Writes raw bytes to the terminal input.
    pub fn write(&mut self, data: &[u8]) -> Result<(), SessionError> {
        write_input(self.writer.as_mut(), data)
    }

    /// Terminates the shell process.
    pub fn kill(&mut self) -> Result<(), SessionError> {
        self.child
            .kill()
            .map_err(|e| SessionError::KillFailed(e.to_string()))
    }

    /// Reaps the shell if it has exited, without blocking.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>, SessionError> {
        Ok(self.child.try_wait()?)
    }

    /// Splits the process into its master, writer and child.
    pub fn into_parts(self) -> PtyParts {
        PtyParts {
            master: self.master,
            writer: self.writer,
            child: self.child,
        }
    }
}

/// Writes `data` to terminal input and flushes it.
///
/// Blocks while the terminal's input queue is full, which happens when the
/// foreground program is not reading.
pub fn write_input(writer: &mut (dyn Write + Send), data: &[u8]) -> Result<(), SessionError> {
    writer
        .write_all(data)
        .map_err(|e| SessionError::WriteFailed(e.to_string()))?;
    writer
        .flush()
        .map_err(|e| SessionError::WriteFailed(e.to_string()))
}

/// Detects the shell to use.
///
/// Returns the shell in this order of preference:
/// 1. The provided shell if Some
/// 2. The $SHELL environment variable
/// 3. /bin/sh as fallback
pub fn detect_shell(shell: Option<String>) -> String {
    if let Some(s) = shell {
        return s;
    }

    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}
