use super::message::ChatMessage;
use serde::{Deserialize, Serialize};

/// Input of a completion request: a bare prompt or a role-tagged conversation.
/// The two forms are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionInput {
    Prompt(String),
    Messages(Vec<ChatMessage>),
}

impl CompletionInput {
    /// Start a conversation with a system message.
    pub fn system(content: impl Into<String>) -> Self {
        CompletionInput::Messages(vec![ChatMessage::system(content)])
    }

    /// Start a conversation with a user message.
    pub fn user(content: impl Into<String>) -> Self {
        CompletionInput::Messages(vec![ChatMessage::user(content)])
    }

    /// Append a user message. A bare prompt is promoted to a user message first.
    pub fn with_user(self, content: impl Into<String>) -> Self {
        self.with_message(ChatMessage::user(content))
    }

    /// Append an assistant message.
    pub fn with_assistant(self, content: impl Into<String>) -> Self {
        self.with_message(ChatMessage::assistant(content))
    }

    /// Append a system message.
    pub fn with_system(self, content: impl Into<String>) -> Self {
        self.with_message(ChatMessage::system(content))
    }

    fn with_message(self, message: ChatMessage) -> Self {
        let mut messages = self.into_messages();
        messages.push(message);
        CompletionInput::Messages(messages)
    }

    /// Whether this is the conversation form.
    pub fn is_chat(&self) -> bool {
        matches!(self, CompletionInput::Messages(_))
    }

    /// View the input as messages, treating a bare prompt as one user message.
    pub fn into_messages(self) -> Vec<ChatMessage> {
        match self {
            CompletionInput::Prompt(prompt) => vec![ChatMessage::user(prompt)],
            CompletionInput::Messages(messages) => messages,
        }
    }

    /// Borrowing variant of [`CompletionInput::into_messages`].
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        self.clone().into_messages()
    }
}

impl From<&str> for CompletionInput {
    fn from(s: &str) -> Self {
        CompletionInput::Prompt(s.to_string())
    }
}

impl From<String> for CompletionInput {
    fn from(s: String) -> Self {
        CompletionInput::Prompt(s)
    }
}

impl From<Vec<ChatMessage>> for CompletionInput {
    fn from(messages: Vec<ChatMessage>) -> Self {
        CompletionInput::Messages(messages)
    }
}
