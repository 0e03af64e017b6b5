use super::types::{ImageRequest, ImageResponse};
use super::OPENAI_BASE_URL;
use crate::normalize::{ChoiceFragment, ResponseShape};
use crate::provider::{bearer_headers, ProviderDescriptor};
use crate::types::{CompletionInput, CompletionRequest, Credentials, Quality, RequestMeta, Role};
use crate::Error;
use reqwest::header::HeaderMap;
use serde_json::Value;

const IMAGE_MIME: &str = "image/png";

/// OpenAI image generation. Always a single JSON document; one image per call.
pub struct ImageDescriptor {
    base_url: String,
}

impl ImageDescriptor {
    pub fn new() -> Self {
        Self::with_base_url(OPENAI_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Image prompt: the bare prompt, or every user turn joined by newlines.
    fn image_prompt(input: &CompletionInput) -> String {
        match input {
            CompletionInput::Prompt(prompt) => prompt.clone(),
            CompletionInput::Messages(messages) => messages
                .iter()
                .filter(|m| m.role == Role::User)
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl Default for ImageDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderDescriptor for ImageDescriptor {
    fn model_provider(&self) -> &str {
        "openai-image"
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn path(&self, _request: &CompletionRequest) -> String {
        "/images/generations".to_string()
    }

    fn model_id(&self, _request: &CompletionRequest, quality: Quality) -> String {
        match quality {
            Quality::Low => "dall-e-2".to_string(),
            Quality::High => "dall-e-3".to_string(),
        }
    }

    fn transform_request(
        &self,
        request: &CompletionRequest,
        meta: &RequestMeta,
    ) -> Result<Value, Error> {
        Ok(serde_json::to_value(ImageRequest {
            model: meta.model.clone(),
            prompt: Self::image_prompt(&request.input),
            n: (meta.choices > 1).then_some(meta.choices),
            user: request.user_identifier.clone(),
        })?)
    }

    fn transform_response(&self, event: &Value) -> Result<Vec<ChoiceFragment>, Error> {
        let response: ImageResponse = serde_json::from_value(event.clone())
            .map_err(|e| Error::normalization("openai-image", e.to_string()))?;

        Ok(response
            .data
            .into_iter()
            .enumerate()
            .map(|(index, image)| match (image.url, image.b64_json) {
                (Some(uri), _) => ChoiceFragment::new(
                    index,
                    ResponseShape::Media {
                        uri,
                        mime_type: IMAGE_MIME.to_string(),
                    },
                ),
                (None, Some(b64)) => ChoiceFragment::new(
                    index,
                    ResponseShape::Media {
                        uri: format!("data:{IMAGE_MIME};base64,{b64}"),
                        mime_type: IMAGE_MIME.to_string(),
                    },
                ),
                (None, None) => ChoiceFragment::failed(
                    index,
                    Error::normalization("openai-image", "image has neither url nor b64_json"),
                ),
            })
            .collect())
    }

    fn auth_headers(&self, credentials: &Credentials) -> Result<HeaderMap, Error> {
        bearer_headers("openai-image", credentials.secret())
    }

    fn supports_streaming(&self) -> bool {
        false
    }

    // dall-e-3 rejects n > 1
    fn supports_multiple_choices(&self) -> bool {
        false
    }
}
