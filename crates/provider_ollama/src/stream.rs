use std::time::Duration;

use core_types::{RelayError, TextStream};
use futures::StreamExt;
use reqwest::{RequestBuilder, Response};
use tracing::{debug, warn};

use crate::decoder::NdjsonDecoder;

const MAX_ERROR_BODY: usize = 2048;

/// What one upstream line contributed.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct LineOutcome {
    pub text: Option<String>,
    pub done: bool,
}

pub(crate) type LineParser = fn(&str) -> Result<LineOutcome, RelayError>;

/// Sends `request`, waiting at most `timeout` for response headers.
pub(crate) async fn send_bounded(
    request: RequestBuilder,
    host: &str,
    timeout: Duration,
) -> Result<Response, RelayError> {
    let response = match tokio::time::timeout(timeout, request.send()).await {
        Err(_) => {
            return Err(RelayError::UpstreamTimeout {
                host: host.to_string(),
                timeout,
            });
        }
        Ok(Err(err)) => return Err(classify(err, host, timeout)),
        Ok(Ok(response)) => response,
    };

    let status = response.status();
    if !status.is_success() {
        return Err(RelayError::UpstreamStatus {
            status: status.as_u16(),
            body: read_error_body(response, timeout).await,
        });
    }
    Ok(response)
}

/// Reads at most `MAX_ERROR_BODY` bytes of an error response, giving up on
/// the rest once `timeout` elapses.
async fn read_error_body(response: Response, timeout: Duration) -> String {
    let mut collected = Vec::new();
    let mut chunks = response.bytes_stream();
    let read = async {
        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    debug!("error body read failed: {err}");
                    break;
                }
            };
            let room = MAX_ERROR_BODY - collected.len();
            collected.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if collected.len() >= MAX_ERROR_BODY {
                break;
            }
        }
    };
    if tokio::time::timeout(timeout, read).await.is_err() {
        debug!(bytes = collected.len(), "error body stalled, keeping what arrived");
    }

    let mut body = String::from_utf8_lossy(&collected).into_owned();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

pub(crate) fn classify(err: reqwest::Error, host: &str, timeout: Duration) -> RelayError {
    if err.is_timeout() {
        RelayError::UpstreamTimeout {
            host: host.to_string(),
            timeout,
        }
    } else if err.is_connect() {
        RelayError::UpstreamUnavailable {
            host: host.to_string(),
        }
    } else {
        RelayError::Transport(err.to_string())
    }
}

/// Turns an NDJSON response body into text increments.
///
/// Each increment is yielded as soon as its line is complete. Malformed lines
/// are logged and skipped. The stream ends after a `done` line, at end of body,
/// or after yielding a single `Err`.
pub(crate) fn ndjson_text_stream(response: Response, parse: LineParser) -> TextStream {
    Box::pin(async_stream::stream! {
        let mut decoder = NdjsonDecoder::default();
        let mut body = response.bytes_stream();
        loop {
            let ended = match body.next().await {
                Some(Ok(chunk)) => {
                    decoder.push(&chunk);
                    false
                }
                Some(Err(err)) => {
                    warn!("upstream stream failed: {err}");
                    yield Err(RelayError::Transport(err.to_string()));
                    return;
                }
                None => true,
            };

            loop {
                let line = if ended { decoder.finish() } else { decoder.next_line() };
                let Some(line) = line else { break };
                match parse(&line) {
                    Ok(outcome) => {
                        if let Some(text) = outcome.text {
                            yield Ok(text);
                        }
                        if outcome.done {
                            debug!("upstream signalled completion");
                            return;
                        }
                    }
                    Err(RelayError::MalformedUpstreamChunk(detail)) => {
                        warn!(line = %line, "skipping malformed upstream line: {detail}");
                    }
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                }
            }

            if ended {
                debug!("upstream body ended");
                return;
            }
        }
    })
}

pub(crate) fn malformed(err: serde_json::Error) -> RelayError {
    RelayError::MalformedUpstreamChunk(err.to_string())
}
