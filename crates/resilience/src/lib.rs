//! Retry and reconnect helpers shared by the relay (when opening the model host
//! stream) and the chat client (when calling the relay).

mod backoff;
mod fetch;
mod reconnect;
mod sse;

use std::fmt::Display;
use std::future::Future;

use tracing::warn;

pub use backoff::{Backoff, BackoffKind};
pub use fetch::{FetchError, fetch_with_retry};
pub use reconnect::{ReconnectPolicy, StreamConsumer, StreamError, stream_with_reconnect};
pub use sse::SseFrameBuffer;

/// Runs `operation` until it succeeds, `should_retry` rejects the error, or
/// `max_attempts` is used up. The closure receives the 1-based attempt number.
/// The last error is returned unchanged.
pub async fn retry<T, E, F, Fut, P>(
    max_attempts: u32,
    backoff: Backoff,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && should_retry(&err) => {
                let delay = backoff.delay(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
