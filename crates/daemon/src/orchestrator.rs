//! Daemon orchestrator for wiring together all components.
//!
//! This module provides the `DaemonOrchestrator` that initializes and coordinates
//! the daemon subsystems: the chat transport, the command router and the shell
//! session manager.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::AuthGate;
use crate::config::Config;
use crate::exec::CommandRunner;
use crate::relay::Outbox;
use crate::router::{CommandRouter, Route};
use crate::session::{SessionManager, SessionManagerImpl, SessionSettings};
use crate::transport::{InboundMessage, TelegramTransport};

/// Capacity of the queue between the poll loop and the dispatcher.
const INBOUND_QUEUE_SIZE: usize = 64;

/// How long shutdown waits for the message being handled, and then for
/// running `/cmd` invocations, to finish.
const DISPATCH_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Daemon orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Initial state, not started.
    Stopped,
    /// Starting up, verifying the bot token.
    Starting,
    /// Running and handling messages.
    Running,
    /// Shutting down gracefully.
    ShuttingDown,
}

/// Events emitted by the orchestrator.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    /// Orchestrator state changed.
    StateChanged(OrchestratorState),
    /// An inbound message was handled.
    MessageHandled {
        /// Chat the message came from.
        chat: protocol::ChatId,
        /// What was done with it.
        route: Route,
    },
}

/// Handles inbound messages one at a time, in arrival order, until
/// `shutdown` is cancelled or the inbound channel closes.
///
/// A message that is being handled when shutdown is requested is finished
/// first.
pub async fn dispatch_loop<S: SessionManager>(
    router: Arc<CommandRouter<S>>,
    mut inbound: mpsc::Receiver<InboundMessage>,
    shutdown: CancellationToken,
    event_tx: broadcast::Sender<OrchestratorEvent>,
) {
    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break,
            message = inbound.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let route = router.route(&message).await;
        debug!(chat_id = message.chat, route = ?route, "Message handled");
        let _ = event_tx.send(OrchestratorEvent::MessageHandled {
            chat: message.chat,
            route,
        });
    }

    debug!("Dispatch loop stopped");
}

/// Daemon orchestrator that manages all subsystems.
pub struct DaemonOrchestrator {
    /// Configuration.
    config: Config,
    /// Current state.
    state: Arc<RwLock<OrchestratorState>>,
    /// Bot API client.
    transport: Arc<TelegramTransport>,
    /// Session manager for the shell session.
    session_manager: Arc<SessionManagerImpl>,
    /// Command router.
    router: Arc<CommandRouter<SessionManagerImpl>>,
    /// Poll and dispatch tasks.
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Cancellation token for graceful shutdown.
    shutdown_token: CancellationToken,
    /// Event sender.
    event_tx: broadcast::Sender<OrchestratorEvent>,
}

impl DaemonOrchestrator {
    /// Creates a new daemon orchestrator. No network request is made yet.
    pub fn new(config: Config) -> Result<Self> {
        let transport = Arc::new(
            TelegramTransport::new(&config.telegram).context("Failed to create Telegram client")?,
        );

        let outbox = Outbox::new(transport.clone(), config.telegram.max_message_size);

        let session_manager = Arc::new(SessionManagerImpl::new(
            SessionSettings::from_config(&config.session),
            outbox.clone(),
        ));

        let router = Arc::new(CommandRouter::new(
            AuthGate::new(config.auth.operator()),
            Arc::clone(&session_manager),
            CommandRunner::new(config.session.command_timeout()),
            outbox,
        ));

        let (event_tx, _) = broadcast::channel(100);

        Ok(Self {
            config,
            state: Arc::new(RwLock::new(OrchestratorState::Stopped)),
            transport,
            session_manager,
            router,
            tasks: Mutex::new(Vec::new()),
            shutdown_token: CancellationToken::new(),
            event_tx,
        })
    }

    /// Returns the current state.
    pub async fn state(&self) -> OrchestratorState {
        *self.state.read().await
    }

    /// Returns a receiver for orchestrator events.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.event_tx.subscribe()
    }

    async fn set_state(&self, new_state: OrchestratorState) {
        *self.state.write().await = new_state;
        self.emit_event(OrchestratorEvent::StateChanged(new_state));
    }

    /// Starts the daemon orchestrator.
    ///
    /// Verifies the bot token, then starts polling for messages. Fails if the
    /// chat service rejects the token or cannot be reached.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state != OrchestratorState::Stopped {
                anyhow::bail!("Orchestrator is already running");
            }
            *state = OrchestratorState::Starting;
        }
        self.emit_event(OrchestratorEvent::StateChanged(OrchestratorState::Starting));

        info!("Starting daemon orchestrator...");

        let me = match self.transport.get_me().await {
            Ok(me) => me,
            Err(e) => {
                self.set_state(OrchestratorState::Stopped).await;
                return Err(e).context("Failed to verify bot token");
            }
        };
        info!(
            bot = %me.handle(),
            operator = %self.config.auth.operator(),
            "Connected to Telegram"
        );

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_SIZE);

        let poll = Arc::clone(&self.transport).start(inbound_tx, self.shutdown_token.clone());
        let dispatch = tokio::spawn(dispatch_loop(
            Arc::clone(&self.router),
            inbound_rx,
            self.shutdown_token.clone(),
            self.event_tx.clone(),
        ));
        self.tasks.lock().await.extend([poll, dispatch]);

        self.set_state(OrchestratorState::Running).await;
        info!("Daemon orchestrator started successfully");
        Ok(())
    }

    /// Stops the daemon orchestrator gracefully.
    ///
    /// Polling stops first, then the active shell session, if any, is
    /// stopped while the transport can still report it.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state == OrchestratorState::Stopped {
                return Ok(());
            }
            if *state == OrchestratorState::ShuttingDown {
                anyhow::bail!("Orchestrator is already shutting down");
            }
            *state = OrchestratorState::ShuttingDown;
        }
        self.emit_event(OrchestratorEvent::StateChanged(
            OrchestratorState::ShuttingDown,
        ));

        info!("Stopping daemon orchestrator...");

        self.shutdown_token.cancel();

        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            match tokio::time::timeout(DISPATCH_DRAIN_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Task ended abnormally: {}", e),
                Err(_) => warn!("Task did not stop in time"),
            }
        }

        if tokio::time::timeout(DISPATCH_DRAIN_TIMEOUT, self.router.wait_for_commands())
            .await
            .is_err()
        {
            warn!("Single commands still running at shutdown");
        }

        self.session_manager.shutdown().await;

        self.set_state(OrchestratorState::Stopped).await;
        info!("Daemon orchestrator stopped");
        Ok(())
    }

    /// Emits an orchestrator event.
    fn emit_event(&self, event: OrchestratorEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Returns the session manager.
    pub fn session_manager(&self) -> &Arc<SessionManagerImpl> {
        &self.session_manager
    }

    /// Returns the command router.
    pub fn router(&self) -> &Arc<CommandRouter<SessionManagerImpl>> {
        &self.router
    }

    /// Returns the shutdown token for external tasks to observe shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replies;
    use crate::transport::MemoryTransport;
    use protocol::User;

    fn create_test_config() -> Config {
        let mut config = Config::default();
        config.telegram.token = "123:test".to_string();
        // Nothing listens on the discard port.
        config.telegram.api_url = "http://127.0.0.1:9".to_string();
        config.auth.username = "operator".to_string();
        config.session.shell = "/bin/sh".to_string();
        config
    }

    #[tokio::test]
    async fn test_orchestrator_creation() {
        let orchestrator = DaemonOrchestrator::new(create_test_config());
        assert!(orchestrator.is_ok());

        let orchestrator = orchestrator.unwrap();
        assert_eq!(orchestrator.state().await, OrchestratorState::Stopped);
        assert!(!orchestrator.session_manager().is_active().await);
    }

    #[tokio::test]
    async fn test_invalid_api_url_rejected() {
        let mut config = create_test_config();
        config.telegram.api_url = "not a url".to_string();
        assert!(DaemonOrchestrator::new(config).is_err());
    }

    #[tokio::test]
    async fn test_start_fails_when_service_unreachable() {
        let orchestrator = DaemonOrchestrator::new(create_test_config()).unwrap();
        let mut events = orchestrator.subscribe();

        let result = orchestrator.start().await;
        assert!(result.is_err());
        assert!(format!("{:#}", result.unwrap_err()).contains("Failed to verify bot token"));
        assert_eq!(orchestrator.state().await, OrchestratorState::Stopped);

        assert!(matches!(
            events.recv().await,
            Ok(OrchestratorEvent::StateChanged(OrchestratorState::Starting))
        ));
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let orchestrator = DaemonOrchestrator::new(create_test_config()).unwrap();
        assert!(orchestrator.stop().await.is_ok());
        assert_eq!(orchestrator.state().await, OrchestratorState::Stopped);
    }

    #[tokio::test]
    async fn test_dispatch_loop_not_held_up_by_slow_command() {
        let transport = Arc::new(MemoryTransport::new());
        let outbox = Outbox::new(transport.clone(), protocol::MAX_MESSAGE_SIZE);
        let sessions = Arc::new(SessionManagerImpl::new(SessionSettings::default(), outbox.clone()));
        let router = Arc::new(CommandRouter::new(
            AuthGate::new("operator"),
            sessions,
            CommandRunner::default(),
            outbox,
        ));

        let (tx, rx) = mpsc::channel(8);
        let (event_tx, _events) = broadcast::channel(8);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(dispatch_loop(router, rx, shutdown.clone(), event_tx));

        for text in ["/cmd sleep 5", "/help"] {
            tx.send(InboundMessage::new(User::new(1, "operator"), 5, text))
                .await
                .unwrap();
        }

        let started = tokio::time::Instant::now();
        assert!(transport.wait_for_text(5, "/shell", Duration::from_secs(2)).await);
        assert!(started.elapsed() < Duration::from_secs(2));

        shutdown.cancel();
        assert!(tokio::time::timeout(Duration::from_secs(2), handle).await.is_ok());
    }

    #[tokio::test]
    async fn test_dispatch_loop_handles_in_order_and_stops() {
        let transport = Arc::new(MemoryTransport::new());
        let outbox = Outbox::new(transport.clone(), protocol::MAX_MESSAGE_SIZE);
        let sessions = Arc::new(SessionManagerImpl::new(SessionSettings::default(), outbox.clone()));
        let router = Arc::new(CommandRouter::new(
            AuthGate::new("operator"),
            sessions,
            CommandRunner::default(),
            outbox,
        ));

        let (tx, rx) = mpsc::channel(8);
        let (event_tx, mut events) = broadcast::channel(8);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(dispatch_loop(router, rx, shutdown.clone(), event_tx));

        tx.send(InboundMessage::new(User::new(1, "operator"), 5, "/help"))
            .await
            .unwrap();
        tx.send(InboundMessage::new(User::new(2, "stranger"), 5, "/help"))
            .await
            .unwrap();

        let first = events.recv().await.unwrap();
        let second = events.recv().await.unwrap();
        assert!(matches!(first, OrchestratorEvent::MessageHandled { route: Route::Help, .. }));
        assert!(matches!(second, OrchestratorEvent::MessageHandled { route: Route::Refused, .. }));
        assert_eq!(
            transport.texts(5).await,
            vec![replies::HELP, replies::NOT_AUTHORIZED]
        );

        shutdown.cancel();
        assert!(tokio::time::timeout(Duration::from_secs(2), handle).await.is_ok());
    }
}
