use std::collections::HashSet;

use crate::{ChatMessage, ChatRole, MessageId, new_id};

/// Append-only chat history with unique message ids.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    ids: HashSet<MessageId>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `message`, assigning a fresh id when it has none or its id is
    /// already taken.
    pub fn push(&mut self, mut message: ChatMessage) -> &ChatMessage {
        let id = match message.id.take() {
            Some(id) if !self.ids.contains(&id) => id,
            _ => new_id(),
        };
        self.ids.insert(id.clone());
        message.id = Some(id);
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> &ChatMessage {
        self.push(ChatMessage::user(content))
    }

    /// Commits a finished reply. Empty replies are dropped.
    pub fn commit(&mut self, reply: ReplyAccumulator) -> Option<&ChatMessage> {
        if reply.is_empty() {
            return None;
        }
        Some(self.push(reply.into_message()))
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// The assistant reply while it is still streaming. It has no id until it
/// is committed.
#[derive(Debug, Clone, Default)]
pub struct ReplyAccumulator {
    text: String,
    increments: usize,
}

impl ReplyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, increment: &str) {
        self.text.push_str(increment);
        self.increments += 1;
    }

    pub fn increments(&self) -> usize {
        self.increments
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_message(self) -> ChatMessage {
        ChatMessage {
            role: ChatRole::Assistant,
            content: self.text,
            id: Some(new_id()),
        }
    }

    /// Drops the partial reply, returning what had arrived.
    pub fn discard(self) -> String {
        self.text
    }
}
