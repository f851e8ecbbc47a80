//! Session management module.
//!
//! This module provides PTY spawning, the chat-driven shell session and the
//! manager that keeps at most one of them running.

pub mod manager;
pub mod pty;
pub mod shell;

pub use manager::{
    SessionInfo, SessionManager, SessionManagerImpl, SessionSettings, StartOutcome, StopOutcome,
};
pub use pty::{
    detect_shell, write_input, PtyParts, PtyProcess, SessionError, SessionId, SpawnConfig,
    DEFAULT_TERM,
};
pub use shell::{ShellConfig, ShellSession, StopReason, WRITE_TIMEOUT};
