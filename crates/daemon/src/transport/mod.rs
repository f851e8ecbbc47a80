//! Chat transports.
//!
//! A transport delivers inbound operator messages to the daemon and sends
//! text back into a chat. The daemon only ever talks to the [`Transport`]
//! trait, so the Telegram client can be swapped for the in-memory one in
//! tests.
//!
//! ## Submodules
//!
//! - [`telegram`]: Bot API client with long polling
//! - [`memory`]: In-memory transport that records sent messages

pub mod memory;
pub mod telegram;

use std::future::Future;
use std::pin::Pin;

use protocol::{ChatId, ProtocolError, Update, User};
use thiserror::Error;

pub use memory::{MemoryTransport, SentMessage};
pub use telegram::TelegramTransport;

/// Errors that can occur while talking to the chat service.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The HTTP request failed before a response was decoded.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The service answered with an error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The configured API endpoint is not a valid URL.
    #[error("invalid API URL: {0}")]
    InvalidUrl(String),

    /// The transport has been shut down.
    #[error("transport closed")]
    Closed,
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        // Request URLs embed the bot token.
        TransportError::Http(err.without_url().to_string())
    }
}

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// A text message from a chat, as seen by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// The account that sent the message.
    pub sender: User,
    /// The chat replies go to.
    pub chat: ChatId,
    /// Message text.
    pub text: String,
}

impl InboundMessage {
    /// Creates an inbound message.
    pub fn new(sender: User, chat: ChatId, text: impl Into<String>) -> Self {
        Self {
            sender,
            chat,
            text: text.into(),
        }
    }

    /// Extracts the text message carried by an update.
    ///
    /// Returns `None` for updates without a message, messages without text
    /// and messages without a sender.
    pub fn from_update(update: Update) -> Option<Self> {
        let message = update.message?;
        Some(Self {
            sender: message.from?,
            chat: message.chat.id,
            text: message.text?,
        })
    }
}

/// Outbound side of a chat transport.
pub trait Transport: Send + Sync {
    /// Sends `text` to `chat`. The text must fit into a single message.
    fn send<'a>(
        &'a self,
        chat: ChatId,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}
