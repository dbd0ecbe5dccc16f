//! Client side of the relay: sends the conversation, follows the event stream
//! across reconnects and checks whether the relay is up.

use std::io::Write;
use std::time::Duration;

use core_types::{Conversation, ReplyAccumulator, StreamEvent};
use reqwest::Client;
use resilience::{
    Backoff, FetchError, ReconnectPolicy, StreamConsumer, StreamError, fetch_with_retry,
    stream_with_reconnect,
};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("relay stream failed: {0}")]
    Stream(#[from] StreamError),

    #[error("{0}")]
    Relay(String),

    #[error("status check failed: {0}")]
    Status(#[from] FetchError),

    #[error("invalid status response: {0}")]
    Decode(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatus {
    pub online: bool,
    #[serde(default)]
    pub backend_status: Option<String>,
    #[serde(default)]
    pub ollama_status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

pub struct RelayClient {
    client: Client,
    base_url: String,
    policy: ReconnectPolicy,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            policy: ReconnectPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Relay status, retried twice on 5xx or transport failures.
    pub async fn status(&self) -> Result<RelayStatus, ClientError> {
        let request = self
            .client
            .get(format!("{}/api/status", self.base_url))
            .build()?;
        let response = fetch_with_retry(
            &self.client,
            request,
            2,
            Backoff::linear(Duration::from_millis(500)),
        )
        .await?;
        Ok(response.json().await?)
    }

    pub async fn backend_online(&self) -> bool {
        match self.status().await {
            Ok(status) => status.online,
            Err(err) => {
                debug!("status check failed: {err}");
                false
            }
        }
    }

    /// Streams a reply to `conversation`, handing each increment to `on_text`
    /// as it arrives. The reply is returned uncommitted.
    pub async fn send<F>(
        &self,
        conversation: &Conversation,
        on_text: F,
    ) -> Result<ReplyAccumulator, ClientError>
    where
        F: FnMut(&str),
    {
        let url = format!("{}/api/chat", self.base_url);
        let body = json!({ "messages": conversation.messages() });
        let mut consumer = ReplyConsumer::new(on_text);

        stream_with_reconnect(
            self.policy,
            || {
                let request = self.client.post(&url).json(&body);
                async move {
                    let response = request
                        .send()
                        .await
                        .map_err(|err| StreamError::Transport(err.to_string()))?;
                    let status = response.status();
                    if !status.is_success() {
                        return Err(StreamError::Status(status.as_u16()));
                    }
                    Ok(response.bytes_stream())
                }
            },
            &mut consumer,
        )
        .await;

        consumer.finish()
    }
}

/// Writes one reply increment and flushes so it shows up as it arrives.
/// Write failures are logged and otherwise ignored.
pub fn echo_increment(out: &mut impl Write, text: &str) {
    if let Err(err) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
        debug!("failed to echo reply increment: {err}");
    }
}

struct ReplyConsumer<F> {
    reply: ReplyAccumulator,
    on_text: F,
    relay_error: Option<String>,
    stream_error: Option<StreamError>,
}

impl<F: FnMut(&str)> ReplyConsumer<F> {
    fn new(on_text: F) -> Self {
        Self {
            reply: ReplyAccumulator::new(),
            on_text,
            relay_error: None,
            stream_error: None,
        }
    }

    fn finish(self) -> Result<ReplyAccumulator, ClientError> {
        if let Some(err) = self.stream_error {
            return Err(err.into());
        }
        if let Some(message) = self.relay_error {
            return Err(ClientError::Relay(message));
        }
        Ok(self.reply)
    }
}

impl<F: FnMut(&str)> StreamConsumer for ReplyConsumer<F> {
    fn on_chunk(&mut self, data: &str) {
        match StreamEvent::from_data(data) {
            Some(StreamEvent::Text(text)) => {
                (self.on_text)(&text);
                self.reply.push(&text);
            }
            Some(StreamEvent::Error(message)) => self.relay_error = Some(message),
            Some(StreamEvent::Done) => {}
            None => debug!(data, "ignoring unrecognised frame"),
        }
    }

    fn on_error(&mut self, error: StreamError) {
        self.stream_error = Some(error);
    }

    fn on_complete(&mut self) {
        debug!(increments = self.reply.increments(), "reply stream complete");
    }
}
