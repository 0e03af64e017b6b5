use super::prompt::CompletionInput;
use serde::{Deserialize, Serialize};

/// Quality tier requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Cheaper, faster model.
    Low,
    /// Most capable model.
    #[default]
    High,
}

impl Quality {
    /// Only the literal hint `"low"` selects the cheap tier.
    pub fn from_hint(hint: &str) -> Self {
        if hint == "low" {
            Quality::Low
        } else {
            Quality::High
        }
    }
}

/// A normalized, provider-independent completion request.
///
/// Once handed to the dispatcher the request is not mutated; every wire payload
/// (including those of fanned-out calls) is derived from the same value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub input: CompletionInput,
    /// Logical model id; `None` routes to the configured default provider.
    pub model_id: Option<String>,
    pub quality: Option<Quality>,
    pub num_outputs: u32,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Empty means "no stop sequences"; the field is then omitted from payloads.
    pub stop_sequences: Vec<String>,
    pub user_identifier: Option<String>,
    /// Ask the provider for an incremental response when it can produce one.
    pub stream: bool,
    /// Allow the dispatcher's cache (if any) to serve and store this request.
    pub cache: bool,
}

impl CompletionRequest {
    /// Create a request for one streamed output.
    pub fn new(input: impl Into<CompletionInput>) -> Self {
        Self {
            input: input.into(),
            model_id: None,
            quality: None,
            num_outputs: 1,
            temperature: None,
            max_tokens: None,
            stop_sequences: Vec::new(),
            user_identifier: None,
            stream: true,
            cache: true,
        }
    }

    pub fn model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn quality(mut self, quality: Quality) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn num_outputs(mut self, n: u32) -> Self {
        self.num_outputs = n;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn stop(mut self, stop_sequences: Vec<String>) -> Self {
        self.stop_sequences = stop_sequences;
        self
    }

    pub fn user(mut self, user_identifier: impl Into<String>) -> Self {
        self.user_identifier = Some(user_identifier.into());
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Bypass the cache for this request.
    pub fn no_cache(mut self) -> Self {
        self.cache = false;
        self
    }

    /// Effective quality tier (absent hint means the top tier).
    pub fn quality_tier(&self) -> Quality {
        self.quality.unwrap_or_default()
    }

    /// Stop sequences as providers expect them: absent rather than empty.
    pub fn stop_param(&self) -> Option<Vec<String>> {
        if self.stop_sequences.is_empty() {
            None
        } else {
            Some(self.stop_sequences.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_hint() {
        assert_eq!(Quality::from_hint("low"), Quality::Low);
        assert_eq!(Quality::from_hint("high"), Quality::High);
        assert_eq!(Quality::from_hint("LOW"), Quality::High);
        assert_eq!(Quality::from_hint(""), Quality::High);
    }

    #[test]
    fn test_request_builder_defaults() {
        let request = CompletionRequest::new("Hello");
        assert_eq!(request.num_outputs, 1);
        assert!(request.stream);
        assert!(request.cache);
        assert_eq!(request.quality_tier(), Quality::High);
        assert_eq!(request.stop_param(), None);

        let request = request
            .model("openai")
            .quality(Quality::Low)
            .stop(vec!["\n".to_string()])
            .no_cache();
        assert_eq!(request.model_id.as_deref(), Some("openai"));
        assert_eq!(request.quality_tier(), Quality::Low);
        assert_eq!(request.stop_param(), Some(vec!["\n".to_string()]));
        assert!(!request.cache);
    }
}
