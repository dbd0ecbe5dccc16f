use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

mod conversation;
mod error;
mod project;

pub use conversation::{Conversation, ReplyAccumulator};
pub use error::RelayError;
pub use project::ProjectFileSet;

pub type MessageId = String;
pub type AttachmentId = String;

/// Ordered text increments produced by a model host.
///
/// An `Err` item ends the stream: it is either a mid-stream transport failure
/// or an error reported inline by the model host.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, RelayError>> + Send + 'static>>;

/// Placeholder returned in place of stored secrets.
pub const SECRET_MASK: &str = "********";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            id: Some(new_id()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            id: Some(new_id()),
        }
    }
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default = "new_id")]
    pub id: AttachmentId,
    pub name: String,
    #[serde(alias = "type", default)]
    pub mime_type: String,
    #[serde(alias = "size", default)]
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub is_zip: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_count: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ProjectFile {
    pub path: String,
    pub content: String,
    #[serde(rename = "type", default = "default_file_type")]
    pub file_type: String,
}

impl ProjectFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>, file_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            file_type: file_type.into(),
        }
    }
}

fn default_file_type() -> String {
    "text".to_string()
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Ollama,
    Allhands,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Ollama => "ollama",
            BackendKind::Allhands => "allhands",
        }
    }
}

/// One frame of the relay's outgoing event stream.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum StreamEvent {
    Text(String),
    Error(String),
    Done,
}

impl StreamEvent {
    /// Payload placed after `data: ` in the SSE frame.
    pub fn to_data(&self) -> String {
        match self {
            StreamEvent::Text(text) => serde_json::json!({ "text": text }).to_string(),
            StreamEvent::Error(error) => serde_json::json!({ "error": error }).to_string(),
            StreamEvent::Done => "[DONE]".to_string(),
        }
    }

    /// Parses a frame payload as emitted by [`StreamEvent::to_data`].
    pub fn from_data(data: &str) -> Option<Self> {
        let data = data.trim();
        if data == "[DONE]" {
            return Some(StreamEvent::Done);
        }
        let value: serde_json::Value = serde_json::from_str(data).ok()?;
        if let Some(text) = value.get("text").and_then(serde_json::Value::as_str) {
            return Some(StreamEvent::Text(text.to_string()));
        }
        value
            .get("error")
            .and_then(serde_json::Value::as_str)
            .map(|error| StreamEvent::Error(error.to_string()))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done)
    }
}

/// Upstream chat call as seen by a backend: the composed history and the model
/// that should answer it.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Opens the upstream stream. Connection failures are returned here, before
    /// any increment is produced; later failures arrive as stream items.
    async fn open_chat(&self, request: ChatRequest) -> Result<TextStream, RelayError>;
}
