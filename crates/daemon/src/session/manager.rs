//! Session manager for the operator's shell session.
//!
//! At most one shell session exists at a time. The manager owns it, relays
//! its output to the chat it was started from, and reports every transition
//! to the operator. Starting, stopping and forwarding input are driven by
//! the router, one message at a time.

use std::sync::Arc;
use std::time::Duration;

use protocol::ChatId;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::pty::{SessionId, SpawnConfig};
use super::shell::{ShellConfig, ShellSession};
use crate::config::SessionConfig;
use crate::relay::Outbox;
use crate::replies;

/// How long shutdown waits for the relay to report the stop.
const SHUTDOWN_RELAY_TIMEOUT: Duration = Duration::from_secs(2);

/// Trait for session management operations.
///
/// Implementations report the outcome of every operation to the chat
/// themselves; the return values let callers branch and log.
#[allow(async_fn_in_trait)]
pub trait SessionManager: Send + Sync {
    /// Starts a session whose output goes to `chat`.
    async fn start(&self, chat: ChatId) -> StartOutcome;

    /// Stops the running session.
    async fn stop(&self, chat: ChatId) -> StopOutcome;

    /// Types `text` into the running session.
    ///
    /// Returns false, without reporting anything, if no session is running.
    async fn forward(&self, chat: ChatId, text: &str) -> bool;

    /// Returns information about the running session.
    async fn info(&self) -> Option<SessionInfo>;

    /// Returns true while a session is running.
    async fn is_active(&self) -> bool {
        self.info().await.is_some()
    }

    /// Stops the running session, if any, before the daemon exits.
    async fn shutdown(&self);
}

/// Result of a start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new session is running.
    Started(SessionId),
    /// A session was already running; nothing changed.
    AlreadyRunning,
    /// The shell could not be started.
    Failed,
}

/// Result of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The running session was stopped.
    Stopped,
    /// No session was running.
    NotRunning,
}

/// Information about a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Unique session identifier.
    pub id: SessionId,
    /// Process ID of the shell.
    pub pid: Option<u32>,
    /// Chat receiving the session output.
    pub chat: ChatId,
}

/// Settings for sessions created by [`SessionManagerImpl`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// How each shell is created.
    pub shell: ShellConfig,
    /// Pause after stopping a shell before the stop completes.
    pub stop_grace: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            shell: ShellConfig::default(),
            stop_grace: Duration::from_millis(1000),
        }
    }
}

impl SessionSettings {
    /// Builds session settings from the `[session]` configuration section.
    pub fn from_config(config: &SessionConfig) -> Self {
        let shell = ShellConfig {
            spawn: SpawnConfig::new(&config.shell).with_term(&config.term),
            onstart_script: config.onstart_script(),
            settle: config.settle(),
        };
        Self {
            shell,
            stop_grace: config.stop_grace(),
        }
    }
}

struct ActiveSession {
    session: Arc<ShellSession>,
    chat: ChatId,
    relay: JoinHandle<()>,
}

/// Single-session manager implementation.
pub struct SessionManagerImpl {
    settings: SessionSettings,
    outbox: Outbox,
    /// The running session. Cleared by whoever ends it first: a stop
    /// request or the relay noticing the shell is gone.
    active: Arc<Mutex<Option<ActiveSession>>>,
}

impl SessionManagerImpl {
    /// Creates a new session manager reporting through `outbox`.
    pub fn new(settings: SessionSettings, outbox: Outbox) -> Self {
        Self {
            settings,
            outbox,
            active: Arc::new(Mutex::new(None)),
        }
    }
}

impl SessionManager for SessionManagerImpl {
    async fn start(&self, chat: ChatId) -> StartOutcome {
        if let Some(ref running) = *self.active.lock().await {
            tracing::debug!(session_id = %running.session.id(), "Start requested while session running");
            self.outbox.deliver(chat, replies::SESSION_IN_PROGRESS).await;
            return StartOutcome::AlreadyRunning;
        }

        // Created without the lock held; the shell takes a while to settle.
        let (session, output) = match ShellSession::create(self.settings.shell.clone()).await {
            Ok(created) => created,
            Err(e) => {
                tracing::error!(error = %e, shell = %self.settings.shell.spawn.shell, "Failed to start shell session");
                self.outbox.deliver(chat, replies::SESSION_START_FAILED).await;
                return StartOutcome::Failed;
            }
        };

        let mut active = self.active.lock().await;
        if active.is_some() {
            drop(active);
            tracing::debug!(session_id = %session.id(), "Another session won the start race");
            session.stop().await;
            self.outbox.deliver(chat, replies::SESSION_IN_PROGRESS).await;
            return StartOutcome::AlreadyRunning;
        }

        let session = Arc::new(session);
        let id = session.id().clone();

        // Announced before the relay exists so the notice precedes any output.
        self.outbox.deliver(chat, replies::SESSION_STARTED).await;

        let relay = tokio::spawn(relay_output(
            Arc::clone(&self.active),
            Arc::clone(&session),
            output,
            self.outbox.clone(),
            chat,
        ));

        *active = Some(ActiveSession {
            session,
            chat,
            relay,
        });

        StartOutcome::Started(id)
    }

    async fn stop(&self, chat: ChatId) -> StopOutcome {
        // Clearing the slot first means a start right after this never sees
        // the old session.
        let taken = self.active.lock().await.take();

        let Some(active) = taken else {
            self.outbox.deliver(chat, replies::NO_ACTIVE_SESSION).await;
            return StopOutcome::NotRunning;
        };

        tracing::info!(session_id = %active.session.id(), "Stopping shell session");
        active.session.stop().await;
        tokio::time::sleep(self.settings.stop_grace).await;

        StopOutcome::Stopped
    }

    async fn forward(&self, chat: ChatId, text: &str) -> bool {
        let session = self
            .active
            .lock()
            .await
            .as_ref()
            .map(|a| Arc::clone(&a.session));

        let Some(session) = session else {
            return false;
        };

        if let Err(e) = session.execute(text).await {
            tracing::warn!(session_id = %session.id(), error = %e, "Failed to forward input");
            self.outbox.deliver(chat, &e.to_string()).await;
        }
        true
    }

    async fn info(&self) -> Option<SessionInfo> {
        self.active.lock().await.as_ref().map(|a| SessionInfo {
            id: a.session.id().clone(),
            pid: a.session.pid(),
            chat: a.chat,
        })
    }

    async fn shutdown(&self) {
        let taken = self.active.lock().await.take();

        if let Some(active) = taken {
            tracing::info!(session_id = %active.session.id(), "Stopping shell session for shutdown");
            active.session.stop().await;
            if tokio::time::timeout(SHUTDOWN_RELAY_TIMEOUT, active.relay)
                .await
                .is_err()
            {
                tracing::warn!("Relay did not finish before shutdown");
            }
        }
    }
}

/// Forwards session output to `chat` until the session stops, then reports
/// the stop.
async fn relay_output(
    active: Arc<Mutex<Option<ActiveSession>>>,
    session: Arc<ShellSession>,
    mut output: mpsc::UnboundedReceiver<String>,
    outbox: Outbox,
    chat: ChatId,
) {
    let mut stopped = session.stopped();
    let mut ended = stopped.borrow_and_update().is_some();

    while !ended {
        tokio::select! {
            biased;

            chunk = output.recv() => match chunk {
                Some(text) => outbox.deliver(chat, &text).await,
                None => ended = true,
            },
            changed = stopped.changed() => {
                ended = changed.is_err() || stopped.borrow_and_update().is_some();
            }
        }
    }

    // Output read before the stop was noticed still goes out first.
    while let Ok(text) = output.try_recv() {
        outbox.deliver(chat, &text).await;
    }

    {
        let mut guard = active.lock().await;
        if guard
            .as_ref()
            .is_some_and(|a| Arc::ptr_eq(&a.session, &session))
        {
            *guard = None;
        }
    }

    // Releases the terminal right away when the shell ended on its own.
    session.stop().await;

    tracing::info!(session_id = %session.id(), reason = ?session.stop_reason(), "Shell session over");
    outbox.deliver(chat, replies::SESSION_STOPPED).await;
}
