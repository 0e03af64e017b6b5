//! Normalized output units produced by every provider.

use super::message::Role;
use serde::{Deserialize, Serialize};

/// One atomic piece of a completion result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputUnit {
    /// Incremental text; concatenating deltas in order yields the full text.
    TextDelta { text: String },
    /// A complete message returned in one piece.
    ChatMessage { role: Role, content: String },
    /// Generated media, by reference.
    MediaReference { uri: String, mime_type: String },
}

impl OutputUnit {
    pub fn text(text: impl Into<String>) -> Self {
        OutputUnit::TextDelta { text: text.into() }
    }

    pub fn message(role: Role, content: impl Into<String>) -> Self {
        OutputUnit::ChatMessage {
            role,
            content: content.into(),
        }
    }

    pub fn media(uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        OutputUnit::MediaReference {
            uri: uri.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Textual content carried by this unit, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            OutputUnit::TextDelta { text } => Some(text),
            OutputUnit::ChatMessage { content, .. } => Some(content),
            OutputUnit::MediaReference { .. } => None,
        }
    }
}

/// A unit attributed to the choice index it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceUnit {
    pub index: usize,
    pub unit: OutputUnit,
}

impl ChoiceUnit {
    pub fn new(index: usize, unit: OutputUnit) -> Self {
        Self { index, unit }
    }
}
