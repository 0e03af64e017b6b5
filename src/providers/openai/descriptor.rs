use super::types::{ChatCompletionRequest, CompletionsRequest, OpenAIError, OpenAIMessage};
use super::OPENAI_BASE_URL;
use crate::normalize::{classify_choices, ChoiceFragment};
use crate::provider::{bearer_headers, ProviderDescriptor};
use crate::types::{CompletionInput, CompletionRequest, Credentials, Quality, RequestMeta};
use crate::Error;
use reqwest::header::HeaderMap;
use serde_json::Value;

const CHAT_PATH: &str = "/chat/completions";
const COMPLETIONS_PATH: &str = "/completions";
const DONE: &str = "[DONE]";

/// How the concrete model string is chosen.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSelection {
    /// Built-in table: chat models by quality tier, one completion model for prompts.
    Tiered {
        low: String,
        high: String,
        completion: String,
    },
    /// Custom endpoint serving exactly one model.
    Fixed(String),
}

/// OpenAI Chat/Completions descriptor. Also drives OpenAI-compatible custom endpoints.
pub struct OpenAIDescriptor {
    name: String,
    base_url: String,
    models: ModelSelection,
}

impl OpenAIDescriptor {
    /// Descriptor for api.openai.com.
    pub fn new() -> Self {
        Self::with_base_url(OPENAI_BASE_URL)
    }

    /// Built-in model table against a different base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            name: "openai".to_string(),
            base_url: base_url.into(),
            models: ModelSelection::Tiered {
                low: "gpt-4o-mini".to_string(),
                high: "gpt-4o".to_string(),
                completion: "gpt-3.5-turbo-instruct".to_string(),
            },
        }
    }

    /// OpenAI-compatible endpoint serving a single model.
    pub fn compatible(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            models: ModelSelection::Fixed(model.into()),
        }
    }

    pub fn models(&self) -> &ModelSelection {
        &self.models
    }

    fn convert_messages(request: &CompletionRequest) -> Vec<OpenAIMessage> {
        request
            .input
            .to_messages()
            .into_iter()
            .map(|message| OpenAIMessage {
                role: message.role.as_str().to_string(),
                content: message.content,
            })
            .collect()
    }
}

impl Default for OpenAIDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderDescriptor for OpenAIDescriptor {
    fn model_provider(&self) -> &str {
        &self.name
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn path(&self, request: &CompletionRequest) -> String {
        if request.input.is_chat() {
            CHAT_PATH.to_string()
        } else {
            COMPLETIONS_PATH.to_string()
        }
    }

    fn model_id(&self, request: &CompletionRequest, quality: Quality) -> String {
        match &self.models {
            ModelSelection::Fixed(model) => model.clone(),
            ModelSelection::Tiered { completion, .. } if !request.input.is_chat() => {
                completion.clone()
            }
            ModelSelection::Tiered { low, high, .. } => match quality {
                Quality::Low => low.clone(),
                Quality::High => high.clone(),
            },
        }
    }

    fn transform_request(
        &self,
        request: &CompletionRequest,
        meta: &RequestMeta,
    ) -> Result<Value, Error> {
        let n = (meta.choices > 1).then_some(meta.choices);
        let stream = meta.stream.then_some(true);

        let payload = match &request.input {
            CompletionInput::Messages(_) => serde_json::to_value(ChatCompletionRequest {
                model: meta.model.clone(),
                messages: Self::convert_messages(request),
                n,
                temperature: request.temperature,
                max_tokens: request.max_tokens,
                stop: request.stop_param(),
                user: request.user_identifier.clone(),
                stream,
            })?,
            CompletionInput::Prompt(prompt) => serde_json::to_value(CompletionsRequest {
                model: meta.model.clone(),
                prompt: prompt.clone(),
                n,
                temperature: request.temperature,
                max_tokens: request.max_tokens,
                stop: request.stop_param(),
                user: request.user_identifier.clone(),
                stream,
            })?,
        };

        Ok(payload)
    }

    fn transform_response(&self, event: &Value) -> Result<Vec<ChoiceFragment>, Error> {
        if event.get("error").is_some() {
            let message = serde_json::from_value::<OpenAIError>(event.clone())
                .map(|e| e.error.message)
                .unwrap_or_else(|_| event["error"].to_string());
            return Err(Error::provider(&self.name, message));
        }
        classify_choices(&self.name, event)
    }

    fn auth_headers(&self, credentials: &Credentials) -> Result<HeaderMap, Error> {
        bearer_headers(&self.name, credentials.secret())
    }

    fn end_of_stream_sentinel(&self) -> Option<&str> {
        Some(DONE)
    }
}
