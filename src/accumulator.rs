//! Folds an output-unit sequence into a complete output.

use crate::types::{ChatMessage, OutputUnit};

/// Generated media collected from a sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    pub uri: String,
    pub mime_type: String,
}

/// Everything one choice produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompleteOutput {
    /// Units in delivery order.
    pub units: Vec<OutputUnit>,
    /// Text deltas and message contents concatenated in order.
    pub text: String,
    /// Complete messages, in order.
    pub messages: Vec<ChatMessage>,
    pub media: Vec<MediaItem>,
}

/// Accumulates one choice's units.
#[derive(Debug, Default)]
pub struct OutputAccumulator {
    output: CompleteOutput,
}

impl OutputAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, unit: OutputUnit) {
        match &unit {
            OutputUnit::TextDelta { text } => self.output.text.push_str(text),
            OutputUnit::ChatMessage { role, content } => {
                self.output.text.push_str(content);
                self.output.messages.push(ChatMessage::new(*role, content.clone()));
            }
            OutputUnit::MediaReference { uri, mime_type } => self.output.media.push(MediaItem {
                uri: uri.clone(),
                mime_type: mime_type.clone(),
            }),
        }
        self.output.units.push(unit);
    }

    /// Text accumulated so far.
    pub fn current_text(&self) -> &str {
        &self.output.text
    }

    pub fn finalize(self) -> CompleteOutput {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn test_text_accumulation() {
        let mut accumulator = OutputAccumulator::new();
        accumulator.push(OutputUnit::text("Hello "));
        assert_eq!(accumulator.current_text(), "Hello ");
        accumulator.push(OutputUnit::text("world!"));
        assert_eq!(accumulator.current_text(), "Hello world!");

        let output = accumulator.finalize();
        assert_eq!(output.units.len(), 2);
        assert!(output.messages.is_empty());
    }

    #[test]
    fn test_mixed_units_keep_order() {
        let mut accumulator = OutputAccumulator::new();
        accumulator.push(OutputUnit::message(Role::Assistant, "Here you go."));
        accumulator.push(OutputUnit::media("https://img/1.png", "image/png"));

        let output = accumulator.finalize();
        assert_eq!(output.text, "Here you go.");
        assert_eq!(output.messages, vec![ChatMessage::assistant("Here you go.")]);
        assert_eq!(
            output.media,
            vec![MediaItem {
                uri: "https://img/1.png".to_string(),
                mime_type: "image/png".to_string()
            }]
        );
        assert!(matches!(output.units[1], OutputUnit::MediaReference { .. }));
    }
}
