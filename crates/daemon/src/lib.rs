//! # Teleshell Daemon Library
//!
//! This crate provides the daemon behind the Teleshell chat bot: one trusted
//! operator talks to a shell on this machine through chat messages.
//!
//! ## Overview
//!
//! - **Authorization**: only the configured operator handle is obeyed
//! - **Single Commands**: `/cmd` runs one program and returns its output
//! - **Shell Session**: `/shell` starts a shell on a pseudo-terminal; plain
//!   text is typed into it and its output streams back until `/exit` or the
//!   shell exits
//! - **Pagination**: output longer than one chat message is split on line
//!   boundaries
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Daemon Orchestrator                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌────────────────┐   inbound   ┌─────────────────────────┐  │
//! │  │   Telegram     │ ──────────▶ │     Command Router      │  │
//! │  │   Transport    │             │  (auth gate, grammar)   │  │
//! │  └────────────────┘             └─────────────────────────┘  │
//! │          ▲                          │               │        │
//! │          │                          ▼               ▼        │
//! │  ┌────────────────┐       ┌────────────────┐ ┌────────────┐  │
//! │  │     Outbox     │ ◀──── │ Session Manager│ │  /cmd      │  │
//! │  │  (paginator)   │       │  + relay task  │ │  runner    │  │
//! │  └────────────────┘       └────────────────┘ └────────────┘  │
//! │                                   │                          │
//! │                           ┌────────────────┐                 │
//! │                           │  Shell on PTY  │                 │
//! │                           └────────────────┘                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::{Config, DaemonOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load_default()?;
//!     config.apply_env_overrides();
//!     config.validate()?;
//!
//!     let orchestrator = DaemonOrchestrator::new(config)?;
//!     orchestrator.start().await?;
//!
//!     // Wait for shutdown signal...
//!
//!     orchestrator.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`auth`]: Operator authorization
//! - [`exec`]: One-shot command execution
//! - [`session`]: PTY shell sessions and their manager
//! - [`relay`]: Outbound delivery with pagination
//! - [`router`]: Message routing to handlers
//! - [`transport`]: Telegram and in-memory transports
//! - [`orchestrator`]: Main daemon coordinator

pub mod auth;
pub mod config;
pub mod exec;
pub mod orchestrator;
pub mod relay;
pub mod replies;
pub mod router;
pub mod session;
pub mod transport;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::{Config, ConfigError};

// Re-export session types for convenience
pub use session::{
    SessionError, SessionId, SessionManager, SessionManagerImpl, SessionSettings, ShellSession,
    StopReason,
};

// Re-export router types for convenience
pub use auth::AuthGate;
pub use exec::{CommandRunner, ExecError};
pub use relay::Outbox;
pub use router::{CommandRouter, Route};

// Re-export transport types for convenience
pub use transport::{InboundMessage, MemoryTransport, TelegramTransport, Transport, TransportError};

// Re-export orchestrator types for convenience
pub use orchestrator::{dispatch_loop, DaemonOrchestrator, OrchestratorEvent, OrchestratorState};
