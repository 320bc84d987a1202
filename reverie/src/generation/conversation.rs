use std::sync::Arc;

use serde::Serialize;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Chat history with the model. Turns are only ever appended in
/// user/assistant pairs, and only after a reply was persisted.
#[derive(Clone, Debug)]
pub struct Conversation {
    system: Arc<str>,
    turns: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(system: Arc<str>) -> Self {
        Self {
            system,
            turns: Vec::new(),
        }
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn turns(&self) -> &[ChatMessage] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push_exchange(
        &mut self,
        prompt: impl Into<String>,
        reply: impl Into<String>,
    ) {
        self.turns.push(ChatMessage::new(Role::User, prompt));
        self.turns.push(ChatMessage::new(Role::Assistant, reply));
    }

    /// The full message list for a request: system text, history, then the
    /// new prompt.
    pub fn messages_for(&self, prompt: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.turns.len() + 2);
        messages.push(ChatMessage::new(Role::System, self.system.as_ref()));
        messages.extend(self.turns.iter().cloned());
        messages.push(ChatMessage::new(Role::User, prompt));
        messages
    }
}
