//! Interactive shell sessions driven by chat messages.
//!
//! A [`ShellSession`] owns one shell on a pseudo-terminal. Creating it turns
//! terminal echo off, so that lines typed through the chat are not mirrored
//! back, and starts a reader that streams output chunks over a channel. The
//! session reports its end exactly once through a watch channel, whether the
//! shell exited on its own, the terminal failed, or a stop was requested.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use portable_pty::{Child, MasterPty};
use tokio::sync::{mpsc, watch, Mutex};
use uuid::Uuid;

use super::pty::{write_input, PtyParts, PtyProcess, SessionError, SessionId, SpawnConfig};

/// Command written to a fresh shell to disable terminal echo.
pub const ECHO_OFF_COMMAND: &str = "stty -echo";

/// Size of the read that discards startup noise after echo suppression.
const STARTUP_SCRATCH_SIZE: usize = 4096;

/// Size of each read from the terminal once the session is running.
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Upper bound on waiting for the shell to print anything after echo
/// suppression. A shell that stays silent this long is treated as broken.
const STARTUP_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// How long [`ShellSession::execute`] waits for the shell to take its input.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Reported when the terminal input queue is full.
const INPUT_BLOCKED: &str = "shell is not reading input";

/// Default pause between disabling echo and discarding startup output.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(1000);

/// Parameters for creating a [`ShellSession`].
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// How to spawn the shell.
    pub spawn: SpawnConfig,
    /// Script sourced into the shell right after startup, if it exists.
    pub onstart_script: Option<PathBuf>,
    /// Pause after `stty -echo` before startup output is discarded.
    pub settle: Duration,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            spawn: SpawnConfig::default(),
            onstart_script: None,
            settle: DEFAULT_SETTLE,
        }
    }
}

impl ShellConfig {
    /// Creates a configuration for the given shell with default settings.
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            spawn: SpawnConfig::new(shell),
            ..Default::default()
        }
    }

    /// Sets the startup script.
    pub fn with_onstart_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.onstart_script = Some(script.into());
        self
    }

    /// Sets the settle interval.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The shell exited, for example after the operator typed `exit`.
    Exited,
    /// Reading from the terminal failed while the shell was still alive.
    ReadFailed(String),
    /// [`ShellSession::stop`] was called.
    Requested,
}

type StopSignal = watch::Sender<Option<StopReason>>;

/// Records `reason` unless the session already stopped. Returns true if this
/// call was the one that stopped it.
fn fire_stopped(signal: &StopSignal, reason: StopReason) -> bool {
    signal.send_if_modified(|state| {
        if state.is_some() {
            return false;
        }
        *state = Some(reason);
        true
    })
}

/// A running shell session.
///
/// The terminal input, the shell process and the master handle are guarded
/// separately: a write stuck on a full input queue never keeps [`stop`]
/// from killing the shell.
///
/// [`stop`]: ShellSession::stop
pub struct ShellSession {
    /// Unique session identifier.
    id: SessionId,

    /// Process ID of the shell.
    pid: Option<u32>,

    /// Terminal input. Held for the duration of each write.
    writer: Arc<Mutex<Option<Box<dyn Write + Send>>>>,

    /// The shell process. `None` once it has been killed.
    child: Arc<Mutex<Option<Box<dyn Child + Send + Sync>>>>,

    /// The PTY master. Dropped on stop.
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,

    /// Stop signal shared with the reader.
    stopped: Arc<StopSignal>,
}

impl ShellSession {
    /// Spawns a shell and prepares it for chat use.
    ///
    /// Returns the session and the receiving end of its output stream. The
    /// stream yields chunks as they are read from the terminal and closes
    /// when the reader finishes.
    pub async fn create(
        config: ShellConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<String>), SessionError> {
        let id = Uuid::new_v4().to_string();
        let mut pty = PtyProcess::spawn(&config.spawn)?;
        let pid = pty.pid();
        let reader = pty.try_clone_reader()?;

        if let Err(e) = pty.write(format!("{}\n", ECHO_OFF_COMMAND).as_bytes()) {
            let _ = pty.kill();
            return Err(SessionError::SetupFailed(format!(
                "could not disable echo: {}",
                e
            )));
        }

        tokio::time::sleep(config.settle).await;

        let reader = match discard_startup_output(reader).await {
            Ok(reader) => reader,
            Err(e) => {
                let _ = pty.kill();
                return Err(e);
            }
        };

        let onstart_script = config.onstart_script.filter(|path| {
            let exists = path.is_file();
            if !exists {
                tracing::debug!(session_id = %id, script = %path.display(), "Startup script not found, skipping");
            }
            exists
        });

        let PtyParts {
            master,
            writer,
            child,
        } = pty.into_parts();
        let writer = Arc::new(Mutex::new(Some(writer)));
        let child = Arc::new(Mutex::new(Some(child)));
        let (stopped, _) = watch::channel(None);
        let stopped = Arc::new(stopped);
        let (output_tx, output_rx) = mpsc::unbounded_channel();

        let context = ReaderContext {
            session_id: id.clone(),
            reader,
            writer: Arc::clone(&writer),
            child: Arc::clone(&child),
            output: output_tx,
            stopped: Arc::clone(&stopped),
            onstart_script,
        };
        tokio::task::spawn_blocking(move || read_loop(context));

        tracing::info!(session_id = %id, shell = %config.spawn.shell, pid = ?pid, "Shell session started");

        Ok((
            Self {
                id,
                pid,
                writer,
                child,
                master: Mutex::new(Some(master)),
                stopped,
            },
            output_rx,
        ))
    }

    /// Returns the session ID.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the process ID of the shell.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Returns a receiver for the stop signal. The value turns from `None` to
    /// the stop reason exactly once.
    pub fn stopped(&self) -> watch::Receiver<Option<StopReason>> {
        self.stopped.subscribe()
    }

    /// Returns the stop reason, or `None` while the session is running.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stopped.borrow().clone()
    }

    /// Returns true until the session has stopped.
    pub fn is_running(&self) -> bool {
        self.stopped.borrow().is_none()
    }

    /// Types `command` into the shell, followed by a newline.
    ///
    /// Output produced by the command arrives on the output stream. The write
    /// runs on the blocking pool. If the shell does not take the input within
    /// [`WRITE_TIMEOUT`], or an earlier write is still pending, this fails
    /// with [`SessionError::ExecFailed`]; a pending write finishes or fails on
    /// its own once the foreground program reads or the shell is killed.
    pub async fn execute(&self, command: &str) -> Result<(), SessionError> {
        if !self.is_running() {
            return Err(SessionError::AlreadyTerminated(self.id.clone()));
        }

        let exec_failed = |reason: String| SessionError::ExecFailed {
            command: command.to_string(),
            reason,
        };

        let mut writer = Arc::clone(&self.writer)
            .try_lock_owned()
            .map_err(|_| exec_failed(INPUT_BLOCKED.to_string()))?;
        if writer.is_none() {
            return Err(SessionError::AlreadyTerminated(self.id.clone()));
        }

        let payload = format!("{}\n", command).into_bytes();
        let write = tokio::task::spawn_blocking(move || match writer.as_mut() {
            Some(input) => write_input(input.as_mut(), &payload),
            None => Err(SessionError::WriteFailed("terminal closed".to_string())),
        });

        match tokio::time::timeout(WRITE_TIMEOUT, write).await {
            Ok(Ok(Ok(()))) => {
                tracing::debug!(session_id = %self.id, bytes = command.len() + 1, "Wrote command to shell");
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(exec_failed(e.to_string())),
            Ok(Err(e)) => Err(exec_failed(e.to_string())),
            Err(_) => {
                tracing::warn!(session_id = %self.id, "Shell is not reading input");
                Err(exec_failed(INPUT_BLOCKED.to_string()))
            }
        }
    }

    /// Stops the session.
    ///
    /// Kills the shell and closes the terminal. This is best effort: a
    /// background job that keeps the terminal open also keeps the reader
    /// alive, but the session reports itself stopped either way. A write
    /// that is stuck on terminal input does not delay it. Calling it more
    /// than once is harmless.
    pub async fn stop(&self) {
        if fire_stopped(&self.stopped, StopReason::Requested) {
            tracing::info!(session_id = %self.id, "Shell session stopped");
        }

        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            let session_id = self.id.clone();
            // Killing may wait briefly for the shell to honour SIGHUP.
            let _ = tokio::task::spawn_blocking(move || {
                if let Err(e) = child.kill() {
                    tracing::warn!(session_id = %session_id, error = %e, "Failed to kill shell");
                }
                if let Ok(Some(status)) = child.try_wait() {
                    tracing::debug!(session_id = %session_id, exit_code = status.exit_code(), "Shell reaped");
                }
            })
            .await;
        }

        // A pending write keeps its copy of the input until it fails.
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
        self.master.lock().await.take();
    }
}

impl std::fmt::Debug for ShellSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellSession")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .field("stop_reason", &self.stop_reason())
            .finish()
    }
}

/// Reads and drops whatever the shell printed while starting up, such as the
/// echoed `stty` line and the first prompt.
async fn discard_startup_output(
    mut reader: Box<dyn Read + Send>,
) -> Result<Box<dyn Read + Send>, SessionError> {
    let read = tokio::task::spawn_blocking(move || {
        let mut scratch = [0u8; STARTUP_SCRATCH_SIZE];
        let result = reader.read(&mut scratch);
        (reader, result)
    });

    match tokio::time::timeout(STARTUP_READ_TIMEOUT, read).await {
        Ok(Ok((reader, result))) => {
            match result {
                Ok(n) => tracing::trace!(bytes = n, "Discarded startup output"),
                Err(e) => tracing::debug!(error = %e, "Startup read failed"),
            }
            Ok(reader)
        }
        Ok(Err(e)) => Err(SessionError::SetupFailed(e.to_string())),
        Err(_) => Err(SessionError::SetupFailed(
            "shell produced no output after echo suppression".to_string(),
        )),
    }
}

struct ReaderContext {
    session_id: SessionId,
    reader: Box<dyn Read + Send>,
    writer: Arc<Mutex<Option<Box<dyn Write + Send>>>>,
    child: Arc<Mutex<Option<Box<dyn Child + Send + Sync>>>>,
    output: mpsc::UnboundedSender<String>,
    stopped: Arc<StopSignal>,
    onstart_script: Option<PathBuf>,
}

/// Blocking reader loop. Runs on the blocking pool for the whole session.
fn read_loop(mut ctx: ReaderContext) {
    if let Some(ref script) = ctx.onstart_script {
        source_script(&ctx, script);
    }

    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut carry = Vec::new();

    let reason = loop {
        match ctx.reader.read(&mut buf) {
            Ok(0) => {
                tracing::debug!(session_id = %ctx.session_id, "PTY reached end of stream");
                break StopReason::Exited;
            }
            Ok(n) => {
                let text = decode_chunk(&mut carry, &buf[..n]);
                if !text.is_empty() && ctx.output.send(text).is_err() {
                    // Nobody listens any more; keep draining so the shell never
                    // blocks on a full terminal buffer.
                    tracing::trace!(session_id = %ctx.session_id, "Output receiver dropped");
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                // Linux reports EIO once the shell has closed its end.
                if reap(&ctx) {
                    break StopReason::Exited;
                }
                tracing::warn!(session_id = %ctx.session_id, error = %e, "PTY read failed");
                break StopReason::ReadFailed(e.to_string());
            }
        }
    };

    if !carry.is_empty() {
        let _ = ctx.output.send(String::from_utf8_lossy(&carry).into_owned());
    }
    reap(&ctx);

    let ReaderContext {
        session_id,
        output,
        stopped,
        ..
    } = ctx;
    drop(output);

    if fire_stopped(&stopped, reason.clone()) {
        tracing::info!(session_id = %session_id, reason = ?reason, "Shell session ended");
    }
}

/// Announces and sources the startup script.
fn source_script(ctx: &ReaderContext, script: &Path) {
    let shown = script.display().to_string();
    let _ = ctx.output.send(format!("sourcing {}", shown));

    let line = format!(". {}\n", shell_words::quote(&shown));
    let mut guard = ctx.writer.blocking_lock();
    if let Some(input) = guard.as_mut() {
        if let Err(e) = write_input(input.as_mut(), line.as_bytes()) {
            tracing::warn!(session_id = %ctx.session_id, script = %shown, error = %e, "Failed to source startup script");
        }
    }
}

/// Reaps the shell if it has exited. Returns true if it has, or if
/// [`ShellSession::stop`] already took it.
fn reap(ctx: &ReaderContext) -> bool {
    let mut guard = ctx.child.blocking_lock();
    match guard.as_mut() {
        Some(child) => match child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(session_id = %ctx.session_id, exit_code = status.exit_code(), "Shell exited");
                true
            }
            _ => false,
        },
        None => true,
    }
}

/// Appends `data` to `carry` and returns the longest decodable prefix as text.
///
/// A multi-byte character split across two reads stays in `carry` until the
/// rest of it arrives. Invalid bytes are replaced.
fn decode_chunk(carry: &mut Vec<u8>, data: &[u8]) -> String {
    carry.extend_from_slice(data);
    let keep = incomplete_tail_len(carry);
    let tail = carry.split_off(carry.len() - keep);
    let text = String::from_utf8_lossy(carry).into_owned();
    *carry = tail;
    text
}

/// Length of a trailing, not yet complete UTF-8 sequence in `bytes`.
fn incomplete_tail_len(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let needed = match byte {
            0xF0..=0xFF => 4,
            0xE0..=0xEF => 3,
            0xC0..=0xDF => 2,
            _ => 1,
        };
        return if needed > back { back } else { 0 };
    }
    0
}
