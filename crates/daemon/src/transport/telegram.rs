//! Telegram Bot API transport.
//!
//! Inbound messages are fetched with `getUpdates` long polling. The offset is
//! advanced past every update handed out, so each update is processed once.
//! Failed polls are retried with exponential backoff; failed sends are
//! retried only when the API asks us to slow down.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use protocol::{ApiResponse, ChatId, GetUpdates, ProtocolError, SendMessage, Update, User};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{InboundMessage, Result, Transport, TransportError};
use crate::config::TelegramConfig;

/// Default reconnection settings.
const INITIAL_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 30_000;
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// How many times a rate-limited send is retried.
const MAX_SEND_RETRIES: u32 = 3;

/// Slack added to the HTTP timeout on top of the long-poll timeout.
const HTTP_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

/// Returns the delay that follows `current` in an exponential backoff.
pub fn next_backoff(current: Duration, multiplier: f64, max: Duration) -> Duration {
    std::cmp::min(
        Duration::from_secs_f64(current.as_secs_f64() * multiplier),
        max,
    )
}

/// Bot API client.
pub struct TelegramTransport {
    client: reqwest::Client,
    /// `<api_url>/bot<token>/`; every method URL is joined onto it.
    base: Url,
    poll_timeout: Duration,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl TelegramTransport {
    /// Creates a client for the configured bot. No request is made yet.
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let api_url = config.api_url.trim_end_matches('/');
        let base = Url::parse(&format!("{}/bot{}/", api_url, config.token))
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", api_url, e)))?;

        let poll_timeout = config.poll_timeout();
        let client = reqwest::Client::builder()
            .timeout(poll_timeout + HTTP_TIMEOUT_SLACK)
            .build()?;

        Ok(Self {
            client,
            base,
            poll_timeout,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
        })
    }

    /// Sets the backoff bounds for failed polls.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    fn method_url(&self, method: &str) -> Result<Url> {
        self.base
            .join(method)
            .map_err(|e| TransportError::InvalidUrl(e.to_string()))
    }

    /// Calls a Bot API method with JSON parameters.
    async fn call<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        // Error responses carry a JSON body too, so the status is not checked.
        let response: ApiResponse<R> = self
            .client
            .post(self.method_url(method)?)
            .json(params)
            .send()
            .await?
            .json()
            .await?;

        Ok(response.into_result()?)
    }

    /// Returns the bot's own account. Used to verify the token at startup.
    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", &serde_json::json!({})).await
    }

    /// Long-polls for updates after `offset`.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>> {
        let request = GetUpdates::messages(offset, self.poll_timeout.as_secs());
        self.call("getUpdates", &request).await
    }

    /// Sends a single message, honouring rate-limit hints.
    pub async fn send_message(&self, chat: ChatId, text: &str) -> Result<()> {
        let request = SendMessage::new(chat, text)?;

        let mut attempt = 0;
        loop {
            match self.call::<_, serde_json::Value>("sendMessage", &request).await {
                Ok(_) => return Ok(()),
                Err(TransportError::Protocol(ProtocolError::RateLimited { retry_after }))
                    if attempt < MAX_SEND_RETRIES =>
                {
                    attempt += 1;
                    tracing::warn!(chat_id = chat, retry_after, attempt, "Rate limited, retrying send");
                    tokio::time::sleep(Duration::from_secs(retry_after)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Starts the polling loop.
    ///
    /// Every text message is forwarded to `inbound` in arrival order. The
    /// loop ends when `shutdown` is cancelled or the receiver is dropped.
    pub fn start(
        self: Arc<Self>,
        inbound: mpsc::Sender<InboundMessage>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move { self.run_poll_loop(inbound, shutdown).await })
    }

    async fn run_poll_loop(
        &self,
        inbound: mpsc::Sender<InboundMessage>,
        shutdown: CancellationToken,
    ) {
        let mut offset = None;
        let mut backoff = self.initial_backoff;

        loop {
            let result = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.get_updates(offset) => result,
            };

            match result {
                Ok(updates) => {
                    backoff = self.initial_backoff;
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        let update_id = update.update_id;
                        let Some(message) = InboundMessage::from_update(update) else {
                            tracing::trace!(update_id, "Ignoring update without text");
                            continue;
                        };
                        tracing::debug!(update_id, chat_id = message.chat, sender = %message.sender.handle(), "Received message");
                        if inbound.send(message).await.is_err() {
                            tracing::debug!("Inbound receiver dropped, stopping poll loop");
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Polling failed, retrying in {:?}", backoff);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = next_backoff(backoff, BACKOFF_MULTIPLIER, self.max_backoff);
                }
            }
        }

        tracing::debug!("Poll loop stopped");
    }
}

impl Transport for TelegramTransport {
    fn send<'a>(
        &'a self,
        chat: ChatId,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.send_message(chat, text))
    }
}
