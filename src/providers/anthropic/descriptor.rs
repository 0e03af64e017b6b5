use super::types::*;
use super::{ANTHROPIC_BASE_URL, ANTHROPIC_VERSION};
use crate::normalize::{ChoiceFragment, DeltaPayload, MessagePayload, ResponseShape};
use crate::provider::{bearer_headers, ProviderDescriptor};
use crate::types::{CompletionRequest, Credentials, Quality, RequestMeta, Role};
use crate::Error;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

const PROVIDER: &str = "anthropic";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Anthropic Messages API descriptor.
pub struct AnthropicDescriptor {
    base_url: String,
}

impl AnthropicDescriptor {
    pub fn new() -> Self {
        Self::with_base_url(ANTHROPIC_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Split the conversation into Anthropic's top-level system prompt and turns.
    fn convert_messages(request: &CompletionRequest) -> (Option<String>, Vec<AnthropicMessage>) {
        let mut system = Vec::new();
        let mut messages = Vec::new();

        for message in request.input.to_messages() {
            match message.role {
                Role::System => system.push(message.content),
                Role::User | Role::Assistant => messages.push(AnthropicMessage {
                    role: message.role.as_str().to_string(),
                    content: message.content,
                }),
            }
        }

        let system = (!system.is_empty()).then(|| system.join("\n\n"));
        (system, messages)
    }

    fn convert_event(event: AnthropicEvent) -> Result<Vec<ChoiceFragment>, Error> {
        let shape = match event {
            AnthropicEvent::ContentBlockDelta {
                delta: AnthropicContentDelta::TextDelta { text },
                ..
            } => ResponseShape::Delta(DeltaPayload {
                role: None,
                content: Some(text),
            }),
            AnthropicEvent::Message(response) => {
                let role = response.role.parse().unwrap_or(Role::Assistant);
                let content = response
                    .content
                    .into_iter()
                    .filter_map(|block| match block {
                        AnthropicContentBlock::Text { text } => Some(text),
                        AnthropicContentBlock::ToolUse { .. } => None,
                    })
                    .collect::<String>();
                ResponseShape::Message(MessagePayload {
                    role,
                    content: Some(content),
                })
            }
            AnthropicEvent::Error { error } => {
                return Err(Error::provider(
                    PROVIDER,
                    format!("{}: {}", error.r#type, error.message),
                ));
            }
            // Tool input deltas and lifecycle events carry no output text
            _ => ResponseShape::Empty,
        };

        // One choice per call; the dispatcher remaps fanned-out calls
        Ok(vec![ChoiceFragment::new(0, shape)])
    }
}

impl Default for AnthropicDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderDescriptor for AnthropicDescriptor {
    fn model_provider(&self) -> &str {
        PROVIDER
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn path(&self, _request: &CompletionRequest) -> String {
        "/messages".to_string()
    }

    fn model_id(&self, _request: &CompletionRequest, quality: Quality) -> String {
        match quality {
            Quality::Low => "claude-3-5-haiku-latest".to_string(),
            Quality::High => "claude-3-5-sonnet-latest".to_string(),
        }
    }

    fn transform_request(
        &self,
        request: &CompletionRequest,
        meta: &RequestMeta,
    ) -> Result<Value, Error> {
        let (system, messages) = Self::convert_messages(request);
        if messages.is_empty() {
            return Err(Error::provider(
                PROVIDER,
                "request needs at least one user or assistant message",
            ));
        }

        Ok(serde_json::to_value(AnthropicRequest {
            model: meta.model.clone(),
            messages,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            temperature: request.temperature,
            stop_sequences: request.stop_param(),
            metadata: request
                .user_identifier
                .clone()
                .map(|user_id| AnthropicMetadata { user_id }),
            stream: meta.stream.then_some(true),
        })?)
    }

    fn transform_response(&self, event: &Value) -> Result<Vec<ChoiceFragment>, Error> {
        let event: AnthropicEvent = serde_json::from_value(event.clone())
            .map_err(|e| Error::normalization(PROVIDER, e.to_string()))?;
        Self::convert_event(event)
    }

    fn auth_headers(&self, credentials: &Credentials) -> Result<HeaderMap, Error> {
        let mut headers = match credentials {
            Credentials::ApiKey(key) => {
                let mut headers = HeaderMap::new();
                let value = HeaderValue::from_str(key)
                    .map_err(|_| Error::provider(PROVIDER, "API key is not a valid header value"))?;
                headers.insert("x-api-key", value);
                headers
            }
            Credentials::Session(token) => bearer_headers(PROVIDER, token)?,
        };
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        Ok(headers)
    }

    fn supports_multiple_choices(&self) -> bool {
        false
    }
}
