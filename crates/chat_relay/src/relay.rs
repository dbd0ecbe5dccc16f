use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use config::BackendConfig;
use core_types::{
    Attachment, BackendKind, ChatMessage, ChatRequest, ProjectFile, RelayError, ReplyAccumulator,
    StreamEvent, TextStream,
};
use futures::{Stream, StreamExt};
use resilience::{Backoff, retry};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::backends::{BackendResolver, default_model};
use crate::composer::compose;

/// Frames sent to the client. Always ends with exactly one [`StreamEvent::Done`].
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send + 'static>>;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub project_files: Vec<ProjectFile>,
    /// Overrides the configured default model for this request.
    #[serde(default)]
    pub model: Option<String>,
}

impl RelayRequest {
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.messages.is_empty() {
            return Err(RelayError::ClientRequestInvalid(
                "messages must not be empty".to_string(),
            ));
        }
        if let Some(model) = &self.model {
            if model.trim().is_empty() {
                return Err(RelayError::ClientRequestInvalid(
                    "model must not be blank".to_string(),
                ));
            }
        }
        Ok(())
    }
}

pub struct Relay {
    resolver: Arc<dyn BackendResolver>,
    attempts: u32,
    backoff: Backoff,
}

impl Relay {
    pub fn new(resolver: Arc<dyn BackendResolver>) -> Self {
        Self {
            resolver,
            attempts: 2,
            backoff: Backoff::linear(Duration::from_millis(250)),
        }
    }

    pub fn with_retry(mut self, attempts: u32, backoff: Backoff) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Validates and composes `request`, then opens the upstream stream.
    ///
    /// Everything that can go wrong before the first increment is returned as
    /// an error so the caller can answer with a status code. Failures after
    /// that point become an inline error frame.
    pub async fn open(
        &self,
        config: &BackendConfig,
        request: RelayRequest,
    ) -> Result<EventStream, RelayError> {
        request.validate()?;

        let backend = self.resolver.resolve(config)?;
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| default_model(config).to_string());
        let chat = ChatRequest {
            model: model.clone(),
            messages: compose(&request.messages, &request.attachments, &request.project_files),
        };
        debug!(
            backend = backend.kind().as_str(),
            model = %model,
            messages = chat.messages.len(),
            attachments = request.attachments.len(),
            project_files = request.project_files.len(),
            "relaying chat request"
        );

        let upstream = retry(
            self.attempts,
            self.backoff,
            |_| {
                let backend = backend.clone();
                let chat = chat.clone();
                async move { backend.open_chat(chat).await }
            },
            RelayError::is_retriable,
        )
        .await?;

        Ok(frame_events(upstream, backend.kind(), model))
    }
}

/// Forwards increments as text frames, turns the first error into an error
/// frame, and finishes with `[DONE]` in every case.
pub fn frame_events(upstream: TextStream, backend: BackendKind, model: String) -> EventStream {
    Box::pin(async_stream::stream! {
        let mut upstream = upstream;
        let mut reply = ReplyAccumulator::new();
        let mut failure = None;

        while let Some(item) = upstream.next().await {
            match item {
                Ok(text) => {
                    reply.push(&text);
                    yield StreamEvent::Text(text);
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        match failure {
            None => {
                let increments = reply.increments();
                let message = reply.into_message();
                info!(
                    backend = backend.as_str(),
                    model = %model,
                    increments,
                    bytes = message.content.len(),
                    reply_id = message.id.as_deref().unwrap_or_default(),
                    "reply completed"
                );
            }
            Some(err) => {
                let increments = reply.increments();
                let partial = reply.discard();
                warn!(
                    backend = backend.as_str(),
                    model = %model,
                    kind = err.kind(),
                    increments,
                    partial_bytes = partial.len(),
                    "reply interrupted: {err}"
                );
                yield StreamEvent::Error(err.to_string());
            }
        }

        yield StreamEvent::Done;
    })
}
