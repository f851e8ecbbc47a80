//! Chat command grammar.
//!
//! A message starting with `/` followed by a word is a bot command. The word
//! may carry an `@botname` suffix (Telegram appends it in group chats). Any
//! spaces after the command word are skipped and the remainder is the
//! argument string. Everything else is raw text.

/// Command word that runs a single OS command outside the session.
pub const SINGLE_COMMAND: &str = "cmd";
/// Command word that starts a shell session.
pub const START_SESSION: &str = "shell";
/// Command word that stops the shell session.
pub const STOP_SESSION: &str = "exit";
/// Command word that shows the help text.
pub const HELP: &str = "help";

/// A recognized bot command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/cmd <args>`: run one command to completion.
    SingleCommand(String),
    /// `/shell`: start a shell session.
    StartSession,
    /// `/exit`: stop the shell session.
    StopSession,
    /// `/help`: show usage.
    Help,
}

impl Command {
    /// Parses `text` into a recognized command.
    ///
    /// Returns `None` for plain text and for unrecognized command words, both
    /// of which are forwarded to an active session verbatim.
    pub fn parse(text: &str) -> Option<Self> {
        let (name, args) = split_bot_command(text)?;
        match name {
            SINGLE_COMMAND => Some(Command::SingleCommand(args.to_string())),
            START_SESSION => Some(Command::StartSession),
            STOP_SESSION => Some(Command::StopSession),
            HELP => Some(Command::Help),
            _ => None,
        }
    }

    /// Returns the command word.
    pub fn name(&self) -> &'static str {
        match self {
            Command::SingleCommand(_) => SINGLE_COMMAND,
            Command::StartSession => START_SESSION,
            Command::StopSession => STOP_SESSION,
            Command::Help => HELP,
        }
    }
}

/// Splits a bot command into its word and argument string.
///
/// Returns `None` unless `text` starts with `/` immediately followed by at
/// least one word character (`[A-Za-z0-9_]`).
pub fn split_bot_command(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix('/')?;
    let name_len = rest
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count();
    if name_len == 0 {
        return None;
    }
    let (name, mut rest) = rest.split_at(name_len);

    if let Some(mention) = rest.strip_prefix('@') {
        let mention_len = mention
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
            .count();
        if mention_len > 0 {
            rest = &mention[mention_len..];
        }
    }

    Some((name, rest.trim_start_matches(' ')))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_commands() {
        assert_eq!(Command::parse("/shell"), Some(Command::StartSession));
        assert_eq!(Command::parse("/exit"), Some(Command::StopSession));
        assert_eq!(Command::parse("/help"), Some(Command::Help));
        assert_eq!(
            Command::parse("/cmd echo hello"),
            Some(Command::SingleCommand("echo hello".to_string()))
        );
    }

    #[test]
    fn test_parse_plain_text() {
        assert_eq!(Command::parse("ls -la"), None);
        assert_eq!(Command::parse("exit"), None);
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse(" /shell"), None);
    }

    #[test]
    fn test_parse_unknown_command() {
        assert_eq!(Command::parse("/start"), None);
        assert_eq!(Command::parse("/shellx"), None);
        assert_eq!(Command::parse("/"), None);
        assert_eq!(Command::parse("/ shell"), None);
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        assert_eq!(Command::parse("/Shell"), None);
    }

    #[test]
    fn test_cmd_without_args() {
        assert_eq!(
            Command::parse("/cmd"),
            Some(Command::SingleCommand(String::new()))
        );
    }

    #[test]
    fn test_cmd_skips_only_leading_spaces() {
        assert_eq!(
            Command::parse("/cmd    printf 'a  b'"),
            Some(Command::SingleCommand("printf 'a  b'".to_string()))
        );
    }

    #[test]
    fn test_bot_mention_suffix() {
        assert_eq!(
            Command::parse("/cmd@teleshell_bot uptime"),
            Some(Command::SingleCommand("uptime".to_string()))
        );
        assert_eq!(
            Command::parse("/shell@teleshell_bot"),
            Some(Command::StartSession)
        );
    }

    #[test]
    fn test_split_bot_command() {
        assert_eq!(split_bot_command("/foo bar baz"), Some(("foo", "bar baz")));
        assert_eq!(split_bot_command("/foo"), Some(("foo", "")));
        assert_eq!(split_bot_command("/foo/bar"), Some(("foo", "/bar")));
        assert_eq!(split_bot_command("foo"), None);
    }

    #[test]
    fn test_name_roundtrip() {
        for command in [
            Command::SingleCommand("ls".to_string()),
            Command::StartSession,
            Command::StopSession,
            Command::Help,
        ] {
            let text = format!("/{}", command.name());
            let parsed = Command::parse(&text).unwrap();
            assert_eq!(parsed.name(), command.name());
        }
    }
}
