use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use config::ConfigError;
use core_types::RelayError;
use project_files::IngestError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Error answered with a status code and `{error, kind}` instead of a stream.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ApiError::Relay(RelayError::ClientRequestInvalid(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        let code = match self {
            ApiError::Relay(err) => err.http_status(),
            ApiError::Ingest(err) => err.http_status(),
        };
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Relay(err) => err.kind(),
            ApiError::Ingest(err) => err.kind(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::invalid(rejection.body_text())
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Invalid(message) => ApiError::invalid(message),
            other => ApiError::Relay(RelayError::ConfigPersistenceFailure(other.to_string())),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        if status.is_server_error() {
            error!(status = status.as_u16(), kind, "request failed: {self}");
        } else {
            warn!(status = status.as_u16(), kind, "request rejected: {self}");
        }
        (status, Json(json!({ "error": self.to_string(), "kind": kind }))).into_response()
    }
}
