//! Command router for dispatching operator messages.
//!
//! Every inbound message passes the authorization gate first. Messages from
//! anyone but the operator are answered with a refusal and go no further.
//! The rest are parsed as bot commands; text that is not a recognized
//! command is typed into the running shell, or answered with the help text
//! when there is none.
//!
//! `/cmd` runs in its own task and reports back through the outbox, so a
//! command that never finishes does not hold up later messages.

use std::sync::Arc;

use protocol::{ChatId, Command};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::auth::AuthGate;
use crate::exec::{CommandRunner, ExecError};
use crate::relay::Outbox;
use crate::replies;
use crate::session::SessionManager;
use crate::transport::InboundMessage;

/// What the router did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The sender is not the operator.
    Refused,
    /// `/cmd` ran a single command.
    SingleCommand,
    /// `/shell` was handled.
    StartSession,
    /// `/exit` was handled.
    StopSession,
    /// The help text was sent.
    Help,
    /// The text was typed into the running shell.
    ShellInput,
}

/// Routes operator messages to the session manager and the command runner.
pub struct CommandRouter<S: SessionManager> {
    /// Who may issue commands.
    auth: AuthGate,
    /// Session manager for `/shell`, `/exit` and shell input.
    session_manager: Arc<S>,
    /// Runner for `/cmd`.
    runner: CommandRunner,
    /// Replies to the operator.
    outbox: Outbox,
    /// `/cmd` invocations still running.
    commands: Mutex<JoinSet<()>>,
}

impl<S: SessionManager> CommandRouter<S> {
    /// Create a new command router with the given dependencies.
    pub fn new(auth: AuthGate, session_manager: Arc<S>, runner: CommandRunner, outbox: Outbox) -> Self {
        Self {
            auth,
            session_manager,
            runner,
            outbox,
            commands: Mutex::new(JoinSet::new()),
        }
    }

    /// Returns the session manager.
    pub fn session_manager(&self) -> &Arc<S> {
        &self.session_manager
    }

    /// Waits for every `/cmd` started so far to report back.
    pub async fn wait_for_commands(&self) {
        let mut running = std::mem::take(&mut *self.commands.lock().await);
        while let Some(result) = running.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Single command task failed");
            }
        }
    }

    /// Handles one inbound message. `/cmd` is started and left running;
    /// everything else is handled to completion.
    pub async fn route(&self, message: &InboundMessage) -> Route {
        let chat = message.chat;

        if !self.auth.is_authorized(&message.sender) {
            info!(
                user_id = message.sender.id,
                username = %message.sender.handle(),
                chat_id = chat,
                "Refusing message from unauthorized user"
            );
            self.outbox.deliver(chat, replies::NOT_AUTHORIZED).await;
            return Route::Refused;
        }

        match Command::parse(&message.text) {
            Some(Command::SingleCommand(args)) => {
                debug!(chat_id = chat, "Routing /cmd");
                self.spawn_single_command(chat, args).await;
                Route::SingleCommand
            }
            Some(Command::StartSession) => {
                debug!(chat_id = chat, "Routing /shell");
                self.session_manager.start(chat).await;
                Route::StartSession
            }
            Some(Command::StopSession) => {
                debug!(chat_id = chat, "Routing /exit");
                self.session_manager.stop(chat).await;
                Route::StopSession
            }
            Some(Command::Help) => {
                self.outbox.deliver(chat, replies::HELP).await;
                Route::Help
            }
            None => {
                if self.session_manager.forward(chat, &message.text).await {
                    Route::ShellInput
                } else {
                    self.outbox.deliver(chat, replies::HELP).await;
                    Route::Help
                }
            }
        }
    }

    async fn spawn_single_command(&self, chat: ChatId, args: String) {
        let runner = self.runner.clone();
        let outbox = self.outbox.clone();

        let mut commands = self.commands.lock().await;
        while commands.try_join_next().is_some() {}
        commands.spawn(async move {
            run_single_command(&runner, &outbox, chat, &args).await;
        });
    }
}

async fn run_single_command(runner: &CommandRunner, outbox: &Outbox, chat: ChatId, args: &str) {
    match runner.run(args).await {
        Ok(result) => {
            outbox.deliver(chat, &result.output).await;
            if let Some(failure) = result.failure() {
                outbox.deliver(chat, &failure.to_string()).await;
            }
        }
        Err(ExecError::Empty) => {
            outbox.deliver(chat, replies::CMD_USAGE).await;
        }
        Err(e) => {
            warn!(chat_id = chat, error = %e, "Single command failed");
            outbox.deliver(chat, &e.to_string()).await;
        }
    }
}
