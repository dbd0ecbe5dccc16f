use std::time::Duration;

use async_trait::async_trait;
use core_types::{BackendKind, ChatBackend, ChatRequest, RelayError, TextStream};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::stream::{LineOutcome, malformed, ndjson_text_stream, send_bounded};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

/// Streams chat completions from an Ollama-compatible `/api/chat` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: Client,
    api_host: String,
    connect_timeout: Duration,
}

impl OllamaBackend {
    pub fn new(client: Client, api_host: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            client,
            api_host: api_host.into().trim_end_matches('/').to_string(),
            connect_timeout,
        }
    }

    pub fn api_host(&self) -> &str {
        &self.api_host
    }

    /// Models installed on the host, from `/api/tags`.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, RelayError> {
        let request = self.client.get(format!("{}/api/tags", self.api_host));
        let response = send_bounded(request, &self.api_host, self.connect_timeout).await?;
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|err| RelayError::Transport(err.to_string()))?;
        Ok(tags.models)
    }
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Ollama
    }

    async fn open_chat(&self, request: ChatRequest) -> Result<TextStream, RelayError> {
        let messages: Vec<_> = request
            .messages
            .iter()
            .map(|message| json!({ "role": message.role.as_str(), "content": message.content }))
            .collect();
        let body = json!({
            "model": request.model,
            "messages": messages,
            "stream": true,
        });
        debug!(host = %self.api_host, model = %request.model, messages = messages.len(), "opening ollama chat");

        let upstream = self
            .client
            .post(format!("{}/api/chat", self.api_host))
            .json(&body);
        let response = send_bounded(upstream, &self.api_host, self.connect_timeout).await?;
        Ok(ndjson_text_stream(response, parse_chat_line))
    }
}

fn parse_chat_line(line: &str) -> Result<LineOutcome, RelayError> {
    let chunk: ChatChunk = serde_json::from_str(line).map_err(malformed)?;
    if let Some(error) = chunk.error {
        return Err(RelayError::Upstream(error));
    }
    let text = chunk
        .message
        .map(|message| message.content)
        .filter(|content| !content.is_empty());
    Ok(LineOutcome {
        text,
        done: chunk.done,
    })
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::body::{Body, Bytes};
    use axum::routing::{get, post};
    use core_types::ChatMessage;
    use futures::StreamExt;

    use super::*;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        format!("http://{addr}")
    }

    fn ndjson_body(chunks: Vec<Result<&'static str, &'static str>>) -> Body {
        let items = chunks.into_iter().map(|chunk| match chunk {
            Ok(text) => Ok(Bytes::from_static(text.as_bytes())),
            Err(reason) => Err(std::io::Error::other(reason)),
        });
        Body::from_stream(futures::stream::iter(items))
    }

    fn backend(host: String) -> OllamaBackend {
        OllamaBackend::new(Client::new(), host, Duration::from_millis(500))
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "llama3".into(),
            messages: vec![ChatMessage::user("hi")],
        }
    }

    async fn collect(stream: TextStream) -> Vec<Result<String, RelayError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn streams_increments_split_across_chunks() {
        let host = serve(Router::new().route(
            "/api/chat",
            post(|| async {
                ndjson_body(vec![
                    Ok("{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n{\"mess"),
                    Ok("age\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":false}\n"),
                    Ok("not json\n"),
                    Ok("{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}"),
                ])
            }),
        ))
        .await;

        let stream = backend(host).open_chat(request()).await.expect("open");
        let items = collect(stream).await;
        assert_eq!(items, vec![Ok("Hel".to_string()), Ok("lo".to_string())]);
    }

    #[tokio::test]
    async fn mid_stream_drop_yields_transport_error() {
        let host = serve(Router::new().route(
            "/api/chat",
            post(|| async {
                ndjson_body(vec![
                    Ok("{\"message\":{\"content\":\"Hel\"},\"done\":false}\n"),
                    Err("connection reset"),
                ])
            }),
        ))
        .await;

        let stream = backend(host).open_chat(request()).await.expect("open");
        let items = collect(stream).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok("Hel".to_string()));
        assert!(matches!(items[1], Err(RelayError::Transport(_))));
    }

    #[tokio::test]
    async fn inline_error_line_ends_stream() {
        let host = serve(Router::new().route(
            "/api/chat",
            post(|| async { ndjson_body(vec![Ok("{\"error\":\"model 'nope' not found\"}\n")]) }),
        ))
        .await;

        let items = collect(backend(host).open_chat(request()).await.expect("open")).await;
        assert_eq!(
            items,
            vec![Err(RelayError::Upstream("model 'nope' not found".into()))]
        );
    }

    #[tokio::test]
    async fn slow_host_times_out() {
        let host = serve(Router::new().route(
            "/api/chat",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        ))
        .await;

        let backend = OllamaBackend::new(Client::new(), host, Duration::from_millis(100));
        let started = std::time::Instant::now();
        let err = backend.open_chat(request()).await.err().expect("timeout");
        assert!(matches!(err, RelayError::UpstreamTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn refused_connection_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let err = backend(format!("http://{addr}"))
            .open_chat(request())
            .await
            .err()
            .expect("refused");
        assert!(matches!(err, RelayError::UpstreamUnavailable { .. }));
        assert_eq!(err.http_status(), 503);
    }

    #[tokio::test]
    async fn error_status_carries_body() {
        let host = serve(Router::new().route(
            "/api/chat",
            post(|| async { (axum::http::StatusCode::NOT_FOUND, "model not found") }),
        ))
        .await;

        let err = backend(host).open_chat(request()).await.err().expect("status");
        assert_eq!(
            err,
            RelayError::UpstreamStatus {
                status: 404,
                body: "model not found".into()
            }
        );
    }

    #[tokio::test]
    async fn stalled_error_body_is_bounded() {
        let host = serve(Router::new().route(
            "/api/chat",
            post(|| async {
                let head = futures::stream::iter([Ok::<_, std::io::Error>(Bytes::from_static(b"partial"))]);
                let body = Body::from_stream(head.chain(futures::stream::pending()));
                (axum::http::StatusCode::INTERNAL_SERVER_ERROR, body)
            }),
        ))
        .await;

        let backend = OllamaBackend::new(Client::new(), host, Duration::from_millis(200));
        let err = tokio::time::timeout(Duration::from_secs(2), backend.open_chat(request()))
            .await
            .expect("bounded by the connect timeout")
            .err()
            .expect("status");
        assert_eq!(
            err,
            RelayError::UpstreamStatus {
                status: 500,
                body: "partial".into()
            }
        );
    }

    #[tokio::test]
    async fn oversized_error_body_is_truncated() {
        let host = serve(Router::new().route(
            "/api/chat",
            post(|| async { (axum::http::StatusCode::BAD_GATEWAY, "x".repeat(10_000)) }),
        ))
        .await;

        let err = backend(host).open_chat(request()).await.err().expect("status");
        match err {
            RelayError::UpstreamStatus { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body.len(), 2048);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn lists_models_from_tags() {
        let host = serve(Router::new().route(
            "/api/tags",
            get(|| async {
                axum::Json(json!({"models": [{"name": "llama3:latest", "size": 4661224676u64}, {"name": "mistral"}]}))
            }),
        ))
        .await;

        let models = backend(host).list_models().await.expect("models");
        let names: Vec<_> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["llama3:latest", "mistral"]);
        assert_eq!(models[0].size, Some(4_661_224_676));
    }
}
