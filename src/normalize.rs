//! Turns decoded provider events into normalized output units.
//!
//! Descriptors reduce their native events to the closed set of shapes in
//! [`ResponseShape`]; this module turns those shapes into [`OutputUnit`]s and keeps
//! per-choice failures separate so one bad choice does not end its siblings.

use crate::provider::ProviderDescriptor;
use crate::types::{ChoiceUnit, OutputUnit, Role};
use crate::Error;
use serde::Deserialize;
use serde_json::Value;

/// Incremental (partial) message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeltaPayload {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Complete message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessagePayload {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
}

/// Every response shape a descriptor may report.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape {
    Delta(DeltaPayload),
    Message(MessagePayload),
    Text(String),
    Media { uri: String, mime_type: String },
    /// Bookkeeping event with nothing to emit (role preamble, ping, stop marker).
    Empty,
}

/// One choice's share of a provider event.
#[derive(Debug)]
pub struct ChoiceFragment {
    pub index: usize,
    pub shape: Result<ResponseShape, Error>,
}

impl ChoiceFragment {
    pub fn new(index: usize, shape: ResponseShape) -> Self {
        Self {
            index,
            shape: Ok(shape),
        }
    }

    pub fn failed(index: usize, error: Error) -> Self {
        Self {
            index,
            shape: Err(error),
        }
    }
}

/// A normalization failure scoped to one choice.
#[derive(Debug)]
pub struct ChoiceError {
    pub index: usize,
    pub error: Error,
}

/// Classify an OpenAI-style `choices[]` entry. Keys are checked in priority order:
/// `delta`, then `message`, then `text`.
pub fn classify_choice(provider: &str, position: usize, choice: &Value) -> ChoiceFragment {
    let index = choice
        .get("index")
        .and_then(Value::as_u64)
        .map(|i| i as usize)
        .unwrap_or(position);

    let shape = if let Some(delta) = choice.get("delta") {
        serde_json::from_value::<DeltaPayload>(delta.clone())
            .map(ResponseShape::Delta)
            .map_err(|e| Error::normalization(provider, format!("invalid delta: {e}")))
    } else if let Some(message) = choice.get("message") {
        serde_json::from_value::<MessagePayload>(message.clone())
            .map(ResponseShape::Message)
            .map_err(|e| Error::normalization(provider, format!("invalid message: {e}")))
    } else if let Some(text) = choice.get("text") {
        text.as_str()
            .map(|t| ResponseShape::Text(t.to_string()))
            .ok_or_else(|| Error::normalization(provider, "text field is not a string"))
    } else {
        Err(Error::normalization(
            provider,
            format!("choice {index} has none of delta, message or text"),
        ))
    };

    ChoiceFragment { index, shape }
}

/// Classify every entry of an event's `choices` array.
pub fn classify_choices(provider: &str, event: &Value) -> Result<Vec<ChoiceFragment>, Error> {
    let choices = event
        .get("choices")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::normalization(provider, "event has no choices array"))?;

    Ok(choices
        .iter()
        .enumerate()
        .map(|(position, choice)| classify_choice(provider, position, choice))
        .collect())
}

fn shape_to_unit(shape: ResponseShape) -> Option<OutputUnit> {
    match shape {
        ResponseShape::Delta(delta) => delta
            .content
            .filter(|content| !content.is_empty())
            .map(OutputUnit::text),
        ResponseShape::Message(message) => Some(OutputUnit::message(
            message.role,
            message.content.unwrap_or_default(),
        )),
        ResponseShape::Text(text) if text.is_empty() => None,
        ResponseShape::Text(text) => Some(OutputUnit::text(text)),
        ResponseShape::Media { uri, mime_type } => Some(OutputUnit::media(uri, mime_type)),
        ResponseShape::Empty => None,
    }
}

/// Normalize one decoded event. The outer error means the whole event was
/// unrecognizable; inner errors belong to a single choice.
pub fn normalize(
    event: &Value,
    descriptor: &dyn ProviderDescriptor,
) -> Result<Vec<Result<ChoiceUnit, ChoiceError>>, Error> {
    let fragments = descriptor.transform_response(event)?;

    Ok(fragments
        .into_iter()
        .filter_map(|fragment| match fragment.shape {
            Ok(shape) => shape_to_unit(shape).map(|unit| Ok(ChoiceUnit::new(fragment.index, unit))),
            Err(error) => Some(Err(ChoiceError {
                index: fragment.index,
                error,
            })),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_delta_takes_priority_over_message_and_text() {
        let choice = json!({
            "index": 0,
            "delta": {"content": "from delta"},
            "message": {"role": "assistant", "content": "from message"},
            "text": "from text"
        });
        let fragment = classify_choice("openai", 0, &choice);
        assert_eq!(
            fragment.shape.unwrap(),
            ResponseShape::Delta(DeltaPayload {
                role: None,
                content: Some("from delta".to_string())
            })
        );

        let choice = json!({"message": {"role": "assistant", "content": "m"}, "text": "t"});
        let fragment = classify_choice("openai", 0, &choice);
        assert!(matches!(fragment.shape.unwrap(), ResponseShape::Message(_)));

        let choice = json!({"text": "t"});
        let fragment = classify_choice("openai", 3, &choice);
        assert_eq!(fragment.index, 3);
        assert_eq!(fragment.shape.unwrap(), ResponseShape::Text("t".to_string()));
    }

    #[test]
    fn test_unknown_choice_shape_is_scoped_to_its_index() {
        let event = json!({"choices": [
            {"index": 0, "delta": {"content": "ok"}},
            {"index": 1, "logprobs": null}
        ]});
        let fragments = classify_choices("openai", &event).unwrap();
        assert!(fragments[0].shape.is_ok());
        assert_eq!(fragments[1].index, 1);
        assert!(matches!(
            fragments[1].shape,
            Err(Error::Normalization { .. })
        ));
    }

    #[test]
    fn test_missing_choices_is_event_level_error() {
        let result = classify_choices("openai", &json!({"object": "chat.completion.chunk"}));
        assert!(matches!(result, Err(Error::Normalization { .. })));
    }

    #[test]
    fn test_empty_shapes_emit_nothing() {
        assert_eq!(
            shape_to_unit(ResponseShape::Delta(DeltaPayload {
                role: Some(Role::Assistant),
                content: None
            })),
            None
        );
        assert_eq!(shape_to_unit(ResponseShape::Text(String::new())), None);
        assert_eq!(shape_to_unit(ResponseShape::Empty), None);
        assert_eq!(
            shape_to_unit(ResponseShape::Text("x".to_string())),
            Some(OutputUnit::text("x"))
        );
    }
}
