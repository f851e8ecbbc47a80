//! Texts the daemon sends to the operator.

/// Sent when a shell session has been started.
pub const SESSION_STARTED: &str =
    "Shell started. You can talk to your machine now. Say 'exit' or /exit to stop the shell.";

/// Sent when a shell could not be started.
pub const SESSION_START_FAILED: &str = "Could not start shell.";

/// Sent once a shell session has ended, however it ended.
pub const SESSION_STOPPED: &str = "Shell stopped. You are no longer talking to your machine.";

/// Sent when `/shell` arrives while a session is running.
pub const SESSION_IN_PROGRESS: &str = "Your shell session is in progress. Say 'exit' to stop it.";

/// Sent when `/exit` arrives while no session is running.
pub const NO_ACTIVE_SESSION: &str = "There are no active shell sessions.";

/// Sent to anyone other than the operator.
pub const NOT_AUTHORIZED: &str = "Sorry, you are not permitted to issue commands.";

/// Sent for an empty `/cmd`.
pub const CMD_USAGE: &str = "usage: /cmd <command>";

/// Usage summary, sent for `/help` and for plain text outside a session.
pub const HELP: &str = "\
Welcome to teleshell!
Use the following commands:
/cmd <command> to run a single command on your machine without starting a shell.
/shell to start a shell. Everything you say after that is typed into it. \
Avoid interactive programs: sudo is OK, but vim is NOT. Colored output shows up as garbage in chat.
/exit to force-kill the running shell.
/help to see this message again.";
