//! Maps logical model ids to a provider descriptor and credentials.

use crate::config::{ConfigSource, CustomModel, ProviderKind};
use crate::provider::ProviderDescriptor;
use crate::providers::anthropic::ANTHROPIC_BASE_URL;
use crate::providers::openai::OPENAI_BASE_URL;
use crate::providers::{AnthropicDescriptor, ImageDescriptor, OpenAIDescriptor};
use crate::types::{CompletionRequest, Credentials, Quality};
use crate::Error;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Logical id for OpenAI chat and completion models.
pub const OPENAI: &str = "openai";
/// Logical id for Anthropic models.
pub const ANTHROPIC: &str = "anthropic";
/// Logical id for OpenAI image generation.
pub const OPENAI_IMAGE: &str = "openai-image";

/// Where a request goes and with which credentials.
#[derive(Clone)]
pub struct Route {
    pub descriptor: Arc<dyn ProviderDescriptor>,
    pub credentials: Credentials,
    pub quality: Quality,
}

impl Route {
    /// Concrete provider model for this request.
    pub fn model_for(&self, request: &CompletionRequest) -> String {
        self.descriptor.model_id(request, self.quality)
    }

    pub fn provider(&self) -> &str {
        self.descriptor.model_provider()
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("provider", &self.provider())
            .field("credentials", &self.credentials)
            .field("quality", &self.quality)
            .finish()
    }
}

/// Resolves logical model ids against a fixed descriptor table and the
/// configuration collaborator.
pub struct ModelRegistry {
    config: Arc<dyn ConfigSource>,
    openai: Arc<dyn ProviderDescriptor>,
    anthropic: Arc<dyn ProviderDescriptor>,
    images: Arc<dyn ProviderDescriptor>,
    custom: Mutex<HashMap<String, (CustomModel, Arc<dyn ProviderDescriptor>)>>,
}

impl ModelRegistry {
    /// Build the descriptor table once, honoring configured base URLs.
    pub fn new(config: Arc<dyn ConfigSource>) -> Self {
        let openai_url = config
            .base_url(ProviderKind::OpenAI)
            .unwrap_or_else(|| OPENAI_BASE_URL.to_string());
        let anthropic_url = config
            .base_url(ProviderKind::Anthropic)
            .unwrap_or_else(|| ANTHROPIC_BASE_URL.to_string());

        Self {
            openai: Arc::new(OpenAIDescriptor::with_base_url(openai_url.clone())),
            anthropic: Arc::new(AnthropicDescriptor::with_base_url(anthropic_url)),
            images: Arc::new(ImageDescriptor::with_base_url(openai_url)),
            custom: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Resolve a logical model id and quality hint.
    ///
    /// Unknown ids go to a configured custom endpoint; anything that still cannot
    /// be served falls back to the default route.
    pub fn resolve(
        &self,
        model_id: Option<&str>,
        quality: Option<Quality>,
    ) -> Result<Route, Error> {
        let quality = quality.unwrap_or_default();

        let Some(model_id) = model_id else {
            return self.default_route(None, quality);
        };

        if let Some((kind, descriptor)) = self.builtin(model_id) {
            return match self.config.credentials(kind) {
                Some(credentials) => {
                    debug!(
                        model_id,
                        provider = descriptor.model_provider(),
                        "resolved built-in model"
                    );
                    Ok(Route {
                        descriptor,
                        credentials,
                        quality,
                    })
                }
                None => {
                    warn!(model_id, "no credentials for built-in model, using default route");
                    self.default_route(Some(model_id), quality)
                }
            };
        }

        if let Some(custom) = self.config.custom_model(model_id) {
            debug!(model_id, base_url = %custom.base_url, "resolved custom model");
            let credentials = custom.credentials.clone();
            return Ok(Route {
                descriptor: self.custom_descriptor(custom),
                credentials,
                quality,
            });
        }

        warn!(model_id, "unrecognized model, using default route");
        self.default_route(Some(model_id), quality)
    }

    /// Resolve the model named by a request.
    pub fn resolve_request(&self, request: &CompletionRequest) -> Result<Route, Error> {
        self.resolve(request.model_id.as_deref(), request.quality)
    }

    fn builtin(&self, model_id: &str) -> Option<(ProviderKind, Arc<dyn ProviderDescriptor>)> {
        match model_id {
            OPENAI => Some((ProviderKind::OpenAI, self.openai.clone())),
            ANTHROPIC => Some((ProviderKind::Anthropic, self.anthropic.clone())),
            OPENAI_IMAGE => Some((ProviderKind::OpenAI, self.images.clone())),
            _ => None,
        }
    }

    fn text_descriptor(&self, kind: ProviderKind) -> Arc<dyn ProviderDescriptor> {
        match kind {
            ProviderKind::OpenAI => self.openai.clone(),
            ProviderKind::Anthropic => self.anthropic.clone(),
        }
    }

    fn default_route(&self, requested: Option<&str>, quality: Quality) -> Result<Route, Error> {
        let route = self
            .config
            .default_route()
            .ok_or_else(|| Error::unresolved(requested.unwrap_or("<default>")))?;

        Ok(Route {
            descriptor: self.text_descriptor(route.provider),
            credentials: route.credentials,
            quality,
        })
    }

    /// Reuse the descriptor built for a custom model unless its config changed.
    fn custom_descriptor(&self, custom: CustomModel) -> Arc<dyn ProviderDescriptor> {
        let mut cache = self.custom.lock();
        if let Some((known, descriptor)) = cache.get(&custom.model_id) {
            if *known == custom {
                return descriptor.clone();
            }
        }

        let descriptor: Arc<dyn ProviderDescriptor> = Arc::new(OpenAIDescriptor::compatible(
            custom.model_id.clone(),
            custom.base_url.clone(),
            custom.upstream_model(),
        ));
        cache.insert(custom.model_id.clone(), (custom, descriptor.clone()));
        descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::types::CompletionInput;

    fn registry(config: EngineConfig) -> ModelRegistry {
        ModelRegistry::new(Arc::new(config))
    }

    #[test]
    fn test_builtin_resolution_with_tiers() {
        let registry = registry(EngineConfig::new().with_openai_key("sk"));
        let chat = CompletionRequest::new(CompletionInput::user("Hi"));

        let low = registry.resolve(Some(OPENAI), Some(Quality::Low)).unwrap();
        assert_eq!(low.provider(), "openai");
        assert_eq!(low.model_for(&chat), "gpt-4o-mini");

        let high = registry.resolve(Some(OPENAI), None).unwrap();
        assert_eq!(high.model_for(&chat), "gpt-4o");

        let image = registry.resolve(Some(OPENAI_IMAGE), Some(Quality::Low)).unwrap();
        assert_eq!(image.provider(), "openai-image");
        assert_eq!(image.model_for(&chat), "dall-e-2");
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let registry = registry(
            EngineConfig::new()
                .with_anthropic_key("sk-ant")
                .with_custom_model(CustomModel::new(
                    "local",
                    "http://localhost:8080/v1",
                    Credentials::ApiKey("k".to_string()),
                )),
        );
        let request = CompletionRequest::new("Hello");

        for model in [ANTHROPIC, "local"] {
            let first = registry.resolve(Some(model), Some(Quality::Low)).unwrap();
            let second = registry.resolve(Some(model), Some(Quality::Low)).unwrap();
            assert!(Arc::ptr_eq(&first.descriptor, &second.descriptor));
            assert_eq!(first.model_for(&request), second.model_for(&request));
        }
    }

    #[test]
    fn test_custom_model_route() {
        let registry = registry(EngineConfig::new().with_custom_model(CustomModel::new(
            "local",
            "http://localhost:8080/v1",
            Credentials::ApiKey("k".to_string()),
        )));
        let route = registry.resolve(Some("local"), None).unwrap();
        assert_eq!(route.provider(), "local");
        assert_eq!(route.descriptor.base_url(), "http://localhost:8080/v1");
        assert_eq!(route.model_for(&CompletionRequest::new("x")), "local");
    }

    #[test]
    fn test_default_route_fallbacks() {
        let registry = registry(
            EngineConfig::new().with_default_route(
                ProviderKind::Anthropic,
                Credentials::Session("tok".to_string()),
            ),
        );

        // No model named
        let route = registry.resolve(None, None).unwrap();
        assert_eq!(route.provider(), "anthropic");
        assert_eq!(route.credentials, Credentials::Session("tok".to_string()));

        // Built-in without credentials
        assert_eq!(registry.resolve(Some(OPENAI), None).unwrap().provider(), "anthropic");

        // Unknown model
        assert_eq!(registry.resolve(Some("mystery"), None).unwrap().provider(), "anthropic");
    }

    #[test]
    fn test_unresolved_without_any_fallback() {
        let registry = registry(EngineConfig::new());
        match registry.resolve(Some("mystery"), None) {
            Err(Error::UnresolvedModel { model }) => assert_eq!(model, "mystery"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            registry.resolve(None, None),
            Err(Error::UnresolvedModel { .. })
        ));
    }

    #[test]
    fn test_base_url_override() {
        let registry = registry(
            EngineConfig::new()
                .with_openai_key("sk")
                .with_base_url(ProviderKind::OpenAI, "http://127.0.0.1:9999"),
        );
        let route = registry.resolve(Some(OPENAI), None).unwrap();
        assert_eq!(
            route.descriptor.url(&CompletionRequest::new("x")),
            "http://127.0.0.1:9999/completions"
        );
    }
}
