use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use futures::{Stream, StreamExt};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{Backoff, SseFrameBuffer};

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("HTTP error, status: {0}")]
    Status(u16),

    #[error("stream transport failed: {0}")]
    Transport(String),
}

/// Receives the frames of one logical stream, across reconnects.
pub trait StreamConsumer {
    fn on_chunk(&mut self, data: &str);

    /// Called at most once, after the reconnect budget is spent.
    fn on_error(&mut self, error: StreamError);

    /// Called at most once, and never after `on_error`.
    fn on_complete(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_reconnects: u32,
    pub backoff: Backoff,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_reconnects: 3,
            backoff: Backoff::linear(Duration::from_secs(1)),
        }
    }
}

/// Consumes an SSE stream produced by `connect`, reconnecting when the transport
/// fails before the `[DONE]` sentinel arrives.
///
/// Frames already delivered are not replayed or retracted; a reconnect continues
/// delivering into the same consumer. A clean end of stream without the sentinel
/// counts as completion.
pub async fn stream_with_reconnect<C, Fut, S, B, E, K>(
    policy: ReconnectPolicy,
    mut connect: C,
    consumer: &mut K,
) where
    C: FnMut() -> Fut,
    Fut: Future<Output = Result<S, StreamError>>,
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
    K: StreamConsumer + ?Sized,
{
    let mut reconnects = 0;
    loop {
        match consume_once(&mut connect, consumer).await {
            Ok(()) => {
                consumer.on_complete();
                return;
            }
            Err(err) if reconnects < policy.max_reconnects => {
                reconnects += 1;
                let delay = policy.backoff.delay(reconnects);
                warn!(
                    reconnects,
                    max_reconnects = policy.max_reconnects,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "stream interrupted, reconnecting"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                consumer.on_error(err);
                return;
            }
        }
    }
}

async fn consume_once<C, Fut, S, B, E, K>(connect: &mut C, consumer: &mut K) -> Result<(), StreamError>
where
    C: FnMut() -> Fut,
    Fut: Future<Output = Result<S, StreamError>>,
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
    K: StreamConsumer + ?Sized,
{
    let stream = connect().await?;
    futures::pin_mut!(stream);

    let mut frames = SseFrameBuffer::default();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| StreamError::Transport(err.to_string()))?;
        frames.push(chunk.as_ref());
        while let Some(data) = frames.next_data() {
            if data == DONE_SENTINEL {
                return Ok(());
            }
            consumer.on_chunk(&data);
        }
    }
    debug!("stream ended without sentinel");
    Ok(())
}
