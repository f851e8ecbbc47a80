//! Outbound delivery to a chat.
//!
//! [`Outbox`] is the only way text leaves the daemon. It drops empty text,
//! which the chat service would reject, and paginates text that is too long
//! for one message. Send failures are logged and swallowed: losing a reply
//! must never take the daemon down.

use std::sync::Arc;

use protocol::{needs_pagination, paginate, ChatId};

use crate::transport::Transport;

/// Sends text to chats through a transport.
#[derive(Clone)]
pub struct Outbox {
    transport: Arc<dyn Transport>,
    limit: usize,
}

impl Outbox {
    /// Creates an outbox that splits text into messages of at most `limit`
    /// bytes.
    pub fn new(transport: Arc<dyn Transport>, limit: usize) -> Self {
        Self {
            transport,
            limit: limit.max(1),
        }
    }

    /// Returns the message size limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Delivers `text` to `chat`, paginating as needed.
    pub async fn deliver(&self, chat: ChatId, text: &str) {
        if text.is_empty() {
            tracing::trace!(chat_id = chat, "Skipping empty message");
            return;
        }

        if !needs_pagination(text, self.limit) {
            self.send_one(chat, text).await;
            return;
        }

        let pages = paginate(text, self.limit);
        tracing::debug!(chat_id = chat, bytes = text.len(), pages = pages.len(), "Paginating output");
        for page in pages.iter().filter(|p| !p.is_empty()) {
            self.send_one(chat, page).await;
        }
    }

    async fn send_one(&self, chat: ChatId, text: &str) {
        if let Err(e) = self.transport.send(chat, text).await {
            tracing::warn!(chat_id = chat, bytes = text.len(), error = %e, "Failed to send message");
        }
    }
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox").field("limit", &self.limit).finish()
    }
}
