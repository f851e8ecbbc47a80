//! Configuration management for the Teleshell daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/teleshell/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default Bot API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Name of the startup script looked up in the home directory.
pub const DEFAULT_ONSTART_SCRIPT: &str = ".teleshell_setup.sh";

/// Longest long-poll timeout the Bot API accepts, in seconds.
const MAX_POLL_TIMEOUT_SECS: u64 = 50;

/// Longest pause allowed between echo suppression and the startup read.
const MAX_SETTLE_MS: u64 = 10_000;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("telegram.token must be set (or TELESHELL_TOKEN together with TELESHELL_USERNAME)")]
    MissingToken,

    #[error("auth.username must be set to the operator's handle")]
    MissingUsername,

    #[error("telegram.api_url must be an http:// or https:// URL, got {0}")]
    InvalidApiUrl(String),

    #[error("telegram.poll_timeout_secs must be between 1 and 50, got {0}")]
    InvalidPollTimeout(u64),

    #[error("telegram.max_message_size must be between 1 and 4096, got {0}")]
    InvalidMessageSize(usize),

    #[error("session.shell path does not exist: {0}")]
    InvalidShellPath(String),

    #[error("session.term must not be empty")]
    InvalidTerm,

    #[error("session.settle_ms must be at most 10000, got {0}")]
    InvalidSettle(u64),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the Teleshell daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// Chat service connection.
    pub telegram: TelegramConfig,

    /// Who may issue commands.
    pub auth: AuthConfig,

    /// Shell session configuration.
    pub session: SessionConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Optional file that receives a copy of the log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

/// Bot API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather.
    pub token: String,

    /// Base URL of the Bot API.
    pub api_url: String,

    /// Long-poll timeout in seconds.
    pub poll_timeout_secs: u64,

    /// Largest outbound message in bytes; longer output is paginated.
    pub max_message_size: usize,
}

/// Operator authorization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Chat handle of the only account allowed to issue commands.
    pub username: String,
}

/// Shell session configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Shell to run for `/shell`.
    pub shell: String,

    /// Terminal type announced to the shell.
    pub term: String,

    /// Script sourced into every new shell if it exists. Empty disables it.
    pub onstart_script: PathBuf,

    /// Pause between disabling echo and discarding startup output.
    pub settle_ms: u64,

    /// Pause after stopping a shell before the stop is reported done.
    pub stop_grace_ms: u64,

    /// Timeout for `/cmd` commands in seconds (0 = no timeout).
    pub command_timeout_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: DEFAULT_API_URL.to_string(),
            poll_timeout_secs: 10,
            max_message_size: protocol::MAX_MESSAGE_SIZE,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            term: crate::session::DEFAULT_TERM.to_string(),
            onstart_script: default_onstart_script(),
            settle_ms: 1000,
            stop_grace_ms: 1000,
            command_timeout_secs: 0,
        }
    }
}

impl TelegramConfig {
    /// Long-poll timeout as a duration.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}

impl AuthConfig {
    /// The operator's handle without a leading `@`.
    pub fn operator(&self) -> &str {
        self.username.trim().trim_start_matches('@')
    }
}

impl SessionConfig {
    /// The startup script, unless disabled.
    pub fn onstart_script(&self) -> Option<PathBuf> {
        if self.onstart_script.as_os_str().is_empty() {
            None
        } else {
            Some(self.onstart_script.clone())
        }
    }

    /// Settle interval as a duration.
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Stop grace interval as a duration.
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// `/cmd` timeout, if any.
    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_secs > 0).then(|| Duration::from_secs(self.command_timeout_secs))
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("teleshell")
        .join("config.toml")
}

/// Returns the default startup script path.
fn default_onstart_script() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_ONSTART_SCRIPT)
}

/// Returns the default shell for the current user.
fn default_shell() -> String {
    crate::session::detect_shell(None)
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - TELESHELL_TOKEN and TELESHELL_USERNAME: Override the bot token and
    ///   the operator handle. Only applied when both are set and non-empty.
    /// - TELESHELL_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        let token = std::env::var("TELESHELL_TOKEN").unwrap_or_default();
        let username = std::env::var("TELESHELL_USERNAME").unwrap_or_default();
        if !token.is_empty() && !username.is_empty() {
            tracing::info!(username = %username, "Overriding credentials from environment");
            self.telegram.token = token;
            self.auth.username = username;
        } else if !token.is_empty() || !username.is_empty() {
            tracing::warn!(
                "Ignoring TELESHELL_TOKEN/TELESHELL_USERNAME: both must be set"
            );
        }

        if let Ok(level) = std::env::var("TELESHELL_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.daemon.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if a required value is missing or any value is
    /// outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }

        if self.auth.operator().is_empty() {
            return Err(ConfigError::MissingUsername);
        }

        let api_url = &self.telegram.api_url;
        match url::Url::parse(api_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            _ => return Err(ConfigError::InvalidApiUrl(api_url.clone())),
        }

        let poll_timeout = self.telegram.poll_timeout_secs;
        if !(1..=MAX_POLL_TIMEOUT_SECS).contains(&poll_timeout) {
            return Err(ConfigError::InvalidPollTimeout(poll_timeout));
        }

        let max_size = self.telegram.max_message_size;
        if !(1..=protocol::MAX_MESSAGE_SIZE).contains(&max_size) {
            return Err(ConfigError::InvalidMessageSize(max_size));
        }

        // Absolute shells must exist, bare names must resolve through PATH.
        let shell_path = Path::new(&self.session.shell);
        let shell_found = if shell_path.is_absolute() {
            shell_path.exists()
        } else {
            which::which(&self.session.shell).is_ok()
        };
        if !shell_found {
            return Err(ConfigError::InvalidShellPath(self.session.shell.clone()));
        }

        if self.session.term.trim().is_empty() {
            return Err(ConfigError::InvalidTerm);
        }

        if self.session.settle_ms > MAX_SETTLE_MS {
            return Err(ConfigError::InvalidSettle(self.session.settle_ms));
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// Returns a copy that is safe to print: the secret part of the bot
    /// token is masked.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        config.telegram.token = redact_token(&self.telegram.token);
        config
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Masks everything after the bot id in a `<bot id>:<secret>` token.
fn redact_token(token: &str) -> String {
    if token.is_empty() {
        return String::new();
    }
    match token.split_once(':') {
        Some((bot_id, _)) => format!("{}:***", bot_id),
        None => "***".to_string(),
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.telegram.token = "123456:ABC-secret".to_string();
        config.auth.username = "operator".to_string();
        config.session.shell = "/bin/sh".to_string();
        config
    }

    fn clear_env() {
        std::env::remove_var("TELESHELL_TOKEN");
        std::env::remove_var("TELESHELL_USERNAME");
        std::env::remove_var("TELESHELL_LOG_LEVEL");
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.daemon.log_level, "info");
        assert!(config.daemon.log_file.is_none());
        assert_eq!(config.telegram.api_url, DEFAULT_API_URL);
        assert_eq!(config.telegram.poll_timeout_secs, 10);
        assert_eq!(config.telegram.max_message_size, 4096);
        assert!(config.telegram.token.is_empty());
        assert!(config.auth.username.is_empty());
        assert_eq!(config.session.term, "vt220");
        assert_eq!(config.session.settle_ms, 1000);
        assert_eq!(config.session.stop_grace_ms, 1000);
        assert_eq!(config.session.command_timeout(), None);
    }

    #[test]
    fn test_default_onstart_script() {
        let config = SessionConfig::default();
        assert!(config
            .onstart_script
            .to_string_lossy()
            .ends_with(DEFAULT_ONSTART_SCRIPT));
    }

    #[test]
    fn test_empty_onstart_script_disables() {
        let config = SessionConfig {
            onstart_script: PathBuf::new(),
            ..Default::default()
        };
        assert_eq!(config.onstart_script(), None);
    }

    #[test]
    fn test_operator_strips_at() {
        let auth = AuthConfig {
            username: "@operator".to_string(),
        };
        assert_eq!(auth.operator(), "operator");
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[telegram]
token = "1:abc"

[auth]
username = "operator"
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.telegram.token, "1:abc");
        assert_eq!(config.auth.username, "operator");
        assert_eq!(config.telegram.api_url, DEFAULT_API_URL);
        assert_eq!(config.session.settle_ms, 1000);
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[daemon]
log_level = "debug"
log_file = "/var/log/teleshell.log"

[telegram]
token = "42:secret"
api_url = "http://localhost:8081"
poll_timeout_secs = 30
max_message_size = 1000

[auth]
username = "@someone"

[session]
shell = "/bin/bash"
term = "dumb"
onstart_script = ""
settle_ms = 500
stop_grace_ms = 200
command_timeout_secs = 60
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(
            config.daemon.log_file,
            Some(PathBuf::from("/var/log/teleshell.log"))
        );
        assert_eq!(config.telegram.api_url, "http://localhost:8081");
        assert_eq!(config.telegram.poll_timeout(), Duration::from_secs(30));
        assert_eq!(config.telegram.max_message_size, 1000);
        assert_eq!(config.auth.operator(), "someone");
        assert_eq!(config.session.shell, "/bin/bash");
        assert_eq!(config.session.term, "dumb");
        assert_eq!(config.session.onstart_script(), None);
        assert_eq!(config.session.settle(), Duration::from_millis(500));
        assert_eq!(config.session.stop_grace(), Duration::from_millis(200));
        assert_eq!(
            config.session.command_timeout(),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let result = Config::from_toml("[telegram\ntoken = 1");
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid TOML configuration"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let toml = r#"
[telegram]
poll_timeout_secs = "ten"
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let toml = r#"
[telegram]
token = "1:a"
proxy = "socks5://localhost"

[unknown_section]
x = 1
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.telegram.token, "1:a");
    }

    #[test]
    fn test_roundtrip() {
        let config = valid_config();
        let toml = config.to_toml().unwrap();
        assert_eq!(Config::from_toml(&toml).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/teleshell/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = valid_config();
        config.save(&path).unwrap();
        assert!(path.exists());

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "not = [valid").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("teleshell/config.toml"));
    }

    #[test]
    fn test_redacted_masks_secret() {
        let redacted = valid_config().redacted();
        assert_eq!(redacted.telegram.token, "123456:***");
        assert!(!redacted.to_toml().unwrap().contains("ABC-secret"));
    }

    #[test]
    fn test_redact_token_forms() {
        assert_eq!(redact_token(""), "");
        assert_eq!(redact_token("no-colon"), "***");
    }

    #[test]
    fn test_validate_valid_config() {
        assert_eq!(valid_config().validate(), Ok(()));
    }

    #[test]
    fn test_validate_missing_token() {
        let mut config = valid_config();
        config.telegram.token = "  ".to_string();
        assert_eq!(config.validate(), Err(ConfigError::MissingToken));
    }

    #[test]
    fn test_validate_missing_username() {
        let mut config = valid_config();
        config.auth.username = "@".to_string();
        assert_eq!(config.validate(), Err(ConfigError::MissingUsername));
    }

    #[test]
    fn test_validate_api_url() {
        let mut config = valid_config();
        config.telegram.api_url = "ftp://example.com".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidApiUrl(_))
        ));

        config.telegram.api_url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidApiUrl(_))
        ));

        config.telegram.api_url = "http://127.0.0.1:8081".to_string();
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_validate_poll_timeout_bounds() {
        let mut config = valid_config();

        config.telegram.poll_timeout_secs = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidPollTimeout(0)));

        config.telegram.poll_timeout_secs = 51;
        assert_eq!(config.validate(), Err(ConfigError::InvalidPollTimeout(51)));

        config.telegram.poll_timeout_secs = 50;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_validate_message_size_bounds() {
        let mut config = valid_config();

        config.telegram.max_message_size = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMessageSize(0)));

        config.telegram.max_message_size = 4097;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidMessageSize(4097))
        );
    }

    #[test]
    fn test_validate_shell_path_absolute_not_exists() {
        let mut config = valid_config();
        config.session.shell = "/nonexistent/shell".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidShellPath("/nonexistent/shell".to_string()))
        );
    }

    #[test]
    fn test_validate_shell_path_in_path() {
        let mut config = valid_config();
        config.session.shell = "sh".to_string();
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_validate_shell_path_not_in_path() {
        let mut config = valid_config();
        config.session.shell = "definitely-not-a-shell-xyz".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidShellPath(_))
        ));
    }

    #[test]
    fn test_validate_term_and_settle() {
        let mut config = valid_config();
        config.session.term = String::new();
        assert_eq!(config.validate(), Err(ConfigError::InvalidTerm));

        let mut config = valid_config();
        config.session.settle_ms = 20_000;
        assert_eq!(config.validate(), Err(ConfigError::InvalidSettle(20_000)));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = valid_config();
        for level in ["trace", "debug", "info", "warn", "error", "DEBUG"] {
            config.daemon.log_level = level.to_string();
            assert_eq!(config.validate(), Ok(()), "level {}", level);
        }

        config.daemon.log_level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );
    }

    #[test]
    #[serial]
    fn test_env_override_credentials() {
        clear_env();
        std::env::set_var("TELESHELL_TOKEN", "99:env-token");
        std::env::set_var("TELESHELL_USERNAME", "env_operator");

        let mut config = valid_config();
        config.apply_env_overrides();

        assert_eq!(config.telegram.token, "99:env-token");
        assert_eq!(config.auth.username, "env_operator");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_requires_both_credentials() {
        clear_env();
        std::env::set_var("TELESHELL_TOKEN", "99:env-token");

        let mut config = valid_config();
        config.apply_env_overrides();

        assert_eq!(config.telegram.token, "123456:ABC-secret");
        assert_eq!(config.auth.username, "operator");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        clear_env();
        std::env::set_var("TELESHELL_TOKEN", "");
        std::env::set_var("TELESHELL_USERNAME", "");
        std::env::set_var("TELESHELL_LOG_LEVEL", "");

        let mut config = valid_config();
        config.apply_env_overrides();

        assert_eq!(config, valid_config());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_log_level() {
        clear_env();
        std::env::set_var("TELESHELL_LOG_LEVEL", "debug");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.daemon.log_level, "debug");

        clear_env();
    }
}
