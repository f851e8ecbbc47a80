//! In-memory transport.
//!
//! Records every message instead of sending it anywhere. Used by tests and
//! by anything that wants to drive the daemon without a chat service.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use protocol::{ChatId, MAX_MESSAGE_SIZE};
use tokio::sync::{Mutex, Notify};

use super::{Result, Transport, TransportError};

/// A message recorded by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Target chat.
    pub chat: ChatId,
    /// Message text.
    pub text: String,
}

/// Transport that keeps sent messages in memory.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<SentMessage>>,
    notify: Notify,
    failing: AtomicBool,
}

impl MemoryTransport {
    /// Creates an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent sends fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns every message sent so far, in order.
    pub async fn messages(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    /// Returns the texts sent to `chat`, in order.
    pub async fn texts(&self, chat: ChatId) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|m| m.chat == chat)
            .map(|m| m.text.clone())
            .collect()
    }

    /// Forgets all recorded messages.
    pub async fn clear(&self) {
        self.sent.lock().await.clear();
    }

    /// Waits until some message satisfies `predicate`.
    ///
    /// Returns false if none did within `timeout`.
    pub async fn wait_for<F>(&self, timeout: Duration, mut predicate: F) -> bool
    where
        F: FnMut(&SentMessage) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if self.sent.lock().await.iter().any(&mut predicate) {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return false;
            }
        }
    }

    /// Waits until a message to `chat` contains `needle`.
    pub async fn wait_for_text(&self, chat: ChatId, needle: &str, timeout: Duration) -> bool {
        self.wait_for(timeout, |m| m.chat == chat && m.text.contains(needle))
            .await
    }
}

impl Transport for MemoryTransport {
    fn send<'a>(
        &'a self,
        chat: ChatId,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            if text.len() > MAX_MESSAGE_SIZE {
                return Err(protocol::ProtocolError::MessageTooLarge {
                    size: text.len(),
                    max: MAX_MESSAGE_SIZE,
                }
                .into());
            }

            self.sent.lock().await.push(SentMessage {
                chat,
                text: text.to_string(),
            });
            self.notify.notify_waiters();
            Ok(())
        })
    }
}
