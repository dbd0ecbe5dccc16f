use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("model host at {host} is unreachable; check if the backend is running")]
    UpstreamUnavailable { host: String },

    #[error("model host at {host} did not respond within {}ms", .timeout.as_millis())]
    UpstreamTimeout { host: String, timeout: Duration },

    #[error("model host returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("malformed upstream chunk: {0}")]
    MalformedUpstreamChunk(String),

    #[error("upstream stream failed: {0}")]
    Transport(String),

    #[error("model host reported an error: {0}")]
    Upstream(String),

    #[error("invalid request: {0}")]
    ClientRequestInvalid(String),

    #[error("failed to save configuration: {0}")]
    ConfigPersistenceFailure(String),
}

impl RelayError {
    /// HTTP status used when the error is returned instead of a stream.
    pub fn http_status(&self) -> u16 {
        match self {
            RelayError::UpstreamUnavailable { .. } => 503,
            RelayError::UpstreamTimeout { .. } => 504,
            RelayError::UpstreamStatus { .. }
            | RelayError::MalformedUpstreamChunk(_)
            | RelayError::Transport(_)
            | RelayError::Upstream(_) => 502,
            RelayError::ClientRequestInvalid(_) => 400,
            RelayError::ConfigPersistenceFailure(_) => 500,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::UpstreamUnavailable { .. } => "upstream_unavailable",
            RelayError::UpstreamTimeout { .. } => "upstream_timeout",
            RelayError::UpstreamStatus { .. } => "upstream_status",
            RelayError::MalformedUpstreamChunk(_) => "malformed_upstream_chunk",
            RelayError::Transport(_) => "transport",
            RelayError::Upstream(_) => "upstream_error",
            RelayError::ClientRequestInvalid(_) => "invalid_request",
            RelayError::ConfigPersistenceFailure(_) => "config_persistence_failure",
        }
    }

    /// Worth another connection attempt: the host was down or failed with 5xx.
    pub fn is_retriable(&self) -> bool {
        match self {
            RelayError::UpstreamUnavailable { .. } => true,
            RelayError::UpstreamStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
