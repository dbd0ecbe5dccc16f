use std::time::Duration;

use async_trait::async_trait;
use core_types::{BackendKind, ChatBackend, ChatRequest, ChatRole, RelayError, TextStream};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use crate::stream::{LineOutcome, malformed, ndjson_text_stream, send_bounded};

/// Streams answers from the AllHands query API.
#[derive(Debug, Clone)]
pub struct AllHandsBackend {
    client: Client,
    api_url: String,
    api_key: String,
    connect_timeout: Duration,
}

impl AllHandsBackend {
    /// Fails when no API key is configured; nothing is sent in that case.
    pub fn new(
        client: Client,
        api_url: impl Into<String>,
        api_key: Option<&str>,
        connect_timeout: Duration,
    ) -> Result<Self, RelayError> {
        let api_key = api_key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                RelayError::ClientRequestInvalid("AllHands API key is not configured".to_string())
            })?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            connect_timeout,
        })
    }
}

#[async_trait]
impl ChatBackend for AllHandsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Allhands
    }

    async fn open_chat(&self, request: ChatRequest) -> Result<TextStream, RelayError> {
        let Some(last_user) = request
            .messages
            .iter()
            .rposition(|message| message.role == ChatRole::User)
        else {
            return Err(RelayError::ClientRequestInvalid(
                "conversation has no user message".to_string(),
            ));
        };

        let context: Vec<_> = request.messages[..last_user]
            .iter()
            .map(|message| json!({ "role": message.role.as_str(), "content": message.content }))
            .collect();
        let body = json!({
            "query": request.messages[last_user].content,
            "context": context,
            "stream": true,
            "model": request.model,
        });
        debug!(url = %self.api_url, model = %request.model, "opening allhands query");

        let upstream = self
            .client
            .post(format!("{}/query", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body);
        let response = send_bounded(upstream, &self.api_url, self.connect_timeout).await?;
        Ok(ndjson_text_stream(response, parse_query_line))
    }
}

fn parse_query_line(line: &str) -> Result<LineOutcome, RelayError> {
    let value: Value = serde_json::from_str(line).map_err(malformed)?;
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return Err(RelayError::Upstream(error.to_string()));
    }
    let text = ["text", "content", "response"]
        .iter()
        .find_map(|field| value.get(*field).and_then(Value::as_str))
        .filter(|text| !text.is_empty())
        .map(str::to_string);
    let done = value.get("done").and_then(Value::as_bool).unwrap_or(false);
    Ok(LineOutcome { text, done })
}
