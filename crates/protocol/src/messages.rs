//! Bot API wire types.
//!
//! Only the subset of the Telegram Bot API that the daemon talks is modelled:
//! long-polled updates carrying text messages, `getMe`, and `sendMessage`.
//! Unknown fields are ignored so newer API versions keep decoding.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Identifier of a chat. Private chats share the id of the user.
pub type ChatId = i64;

/// Envelope returned by every Bot API method.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the request succeeded.
    pub ok: bool,
    /// Method result on success.
    pub result: Option<T>,
    /// Error description on failure.
    pub description: Option<String>,
    /// Error code on failure.
    pub error_code: Option<i32>,
    /// Extra hints on failure, such as rate limiting.
    pub parameters: Option<ResponseParameters>,
}

/// Additional information attached to a failed response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseParameters {
    /// Seconds to wait before repeating the request.
    pub retry_after: Option<u64>,
}

impl<T> ApiResponse<T> {
    /// Converts the envelope into the method result or a protocol error.
    pub fn into_result(self) -> Result<T> {
        if self.ok {
            return self.result.ok_or(ProtocolError::MissingResult);
        }

        if let Some(retry_after) = self.parameters.and_then(|p| p.retry_after) {
            return Err(ProtocolError::RateLimited { retry_after });
        }

        Err(ProtocolError::Api {
            code: self.error_code.unwrap_or(0),
            description: self
                .description
                .unwrap_or_else(|| "no description".to_string()),
        })
    }
}

/// An incoming update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    /// Monotonic update identifier, used as the polling offset.
    pub update_id: i64,
    /// New incoming message, if this update carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message identifier inside the chat.
    pub message_id: i64,
    /// Sender; absent for messages sent on behalf of channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    /// Chat the message belongs to.
    pub chat: Chat,
    /// Text of the message; absent for stickers, photos and the like.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// A user or bot account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique account identifier.
    pub id: i64,
    /// True for bot accounts.
    #[serde(default)]
    pub is_bot: bool,
    /// First name of the account.
    #[serde(default)]
    pub first_name: String,
    /// Public handle without the leading `@`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl User {
    /// Creates a human user with the given handle.
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            is_bot: false,
            first_name: String::new(),
            username: Some(username.into()),
        }
    }

    /// Returns the handle, or an empty string for accounts without one.
    pub fn handle(&self) -> &str {
        self.username.as_deref().unwrap_or("")
    }
}

/// A chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Chat identifier.
    pub id: ChatId,
    /// Chat kind: `private`, `group`, `supergroup` or `channel`.
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Parameters of `getUpdates`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GetUpdates {
    /// First update to return; acknowledges everything before it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    /// Long-poll timeout in seconds.
    pub timeout: u64,
    /// Update kinds to receive.
    pub allowed_updates: Vec<String>,
}

impl GetUpdates {
    /// Long-poll request for text messages only.
    pub fn messages(offset: Option<i64>, timeout: u64) -> Self {
        Self {
            offset,
            timeout,
            allowed_updates: vec!["message".to_string()],
        }
    }
}

/// Parameters of `sendMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendMessage<'a> {
    /// Target chat.
    pub chat_id: ChatId,
    /// Message text, at most [`crate::MAX_MESSAGE_SIZE`] bytes.
    pub text: &'a str,
    /// Suppress link previews; shell output is not meant to be unfurled.
    pub disable_web_page_preview: bool,
}

impl<'a> SendMessage<'a> {
    /// Builds a plain-text message, rejecting text over the size limit.
    pub fn new(chat_id: ChatId, text: &'a str) -> Result<Self> {
        if text.len() > crate::MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: text.len(),
                max: crate::MAX_MESSAGE_SIZE,
            });
        }
        Ok(Self {
            chat_id,
            text,
            disable_web_page_preview: true,
        })
    }
}
