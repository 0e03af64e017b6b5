use crate::types::Credentials;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::env;

/// Built-in provider families that hold credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Anthropic,
}

impl std::str::FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAI),
            "anthropic" => Ok(ProviderKind::Anthropic),
            other => Err(Error::config(format!(
                "Invalid provider '{other}'. Valid values are: openai, anthropic"
            ))),
        }
    }
}

/// Credentials and endpoint override for one built-in provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Provider used when a request names no model or its model cannot be served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultRoute {
    pub provider: ProviderKind,
    pub credentials: Credentials,
}

/// A user-registered OpenAI-compatible endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomModel {
    /// Logical id requests use to reach this endpoint.
    pub model_id: String,
    pub base_url: String,
    /// Model string sent upstream; defaults to `model_id`.
    #[serde(default)]
    pub model: Option<String>,
    pub credentials: Credentials,
}

impl CustomModel {
    pub fn new(
        model_id: impl Into<String>,
        base_url: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            base_url: base_url.into(),
            model: None,
            credentials,
        }
    }

    pub fn upstream_model(&self) -> &str {
        self.model.as_deref().unwrap_or(&self.model_id)
    }
}

/// Configuration collaborator consulted by the model registry.
pub trait ConfigSource: Send + Sync {
    fn credentials(&self, provider: ProviderKind) -> Option<Credentials>;

    fn base_url(&self, provider: ProviderKind) -> Option<String>;

    fn default_route(&self) -> Option<DefaultRoute>;

    fn custom_model(&self, model_id: &str) -> Option<CustomModel>;
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_origin() -> String {
    "llm-relay".to_string()
}

/// Engine configuration, loadable from the environment or JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub openai: ProviderSettings,
    #[serde(default)]
    pub anthropic: ProviderSettings,
    #[serde(default)]
    pub default_route: Option<DefaultRoute>,
    #[serde(default)]
    pub custom_models: Vec<CustomModel>,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Recorded on every transaction.
    #[serde(default = "default_origin")]
    pub origin: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            openai: ProviderSettings::default(),
            anthropic: ProviderSettings::default(),
            default_route: None,
            custom_models: Vec::new(),
            request_timeout_secs: default_timeout_secs(),
            origin: default_origin(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_openai_key(mut self, api_key: impl Into<String>) -> Self {
        self.openai.credentials = Some(Credentials::ApiKey(api_key.into()));
        self
    }

    pub fn with_anthropic_key(mut self, api_key: impl Into<String>) -> Self {
        self.anthropic.credentials = Some(Credentials::ApiKey(api_key.into()));
        self
    }

    pub fn with_base_url(mut self, provider: ProviderKind, base_url: impl Into<String>) -> Self {
        self.settings_mut(provider).base_url = Some(base_url.into());
        self
    }

    pub fn with_default_route(mut self, provider: ProviderKind, credentials: Credentials) -> Self {
        self.default_route = Some(DefaultRoute {
            provider,
            credentials,
        });
        self
    }

    pub fn with_custom_model(mut self, model: CustomModel) -> Self {
        self.custom_models.push(model);
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    fn settings(&self, provider: ProviderKind) -> &ProviderSettings {
        match provider {
            ProviderKind::OpenAI => &self.openai,
            ProviderKind::Anthropic => &self.anthropic,
        }
    }

    fn settings_mut(&mut self, provider: ProviderKind) -> &mut ProviderSettings {
        match provider {
            ProviderKind::OpenAI => &mut self.openai,
            ProviderKind::Anthropic => &mut self.anthropic,
        }
    }

    /// Parse a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::config(format!("invalid config JSON: {e}")))
    }

    /// Create configuration from environment variables.
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Self::new();

        if let Ok(api_key) = env::var("OPENAI_API_KEY") {
            config = config.with_openai_key(api_key);
        }
        if let Ok(base_url) = env::var("OPENAI_BASE_URL") {
            config = config.with_base_url(ProviderKind::OpenAI, base_url);
        }
        if let Ok(api_key) = env::var("ANTHROPIC_API_KEY") {
            config = config.with_anthropic_key(api_key);
        }
        if let Ok(base_url) = env::var("ANTHROPIC_BASE_URL") {
            config = config.with_base_url(ProviderKind::Anthropic, base_url);
        }

        // Explicit default provider first, then whichever provider has a key
        let default_provider = match env::var("LLM_DEFAULT_PROVIDER") {
            Ok(name) => Some(name.parse::<ProviderKind>()?),
            Err(_) => [ProviderKind::OpenAI, ProviderKind::Anthropic]
                .into_iter()
                .find(|kind| config.settings(*kind).credentials.is_some()),
        };

        if let Some(provider) = default_provider {
            let credentials = match env::var("LLM_SESSION_TOKEN") {
                Ok(token) => Credentials::Session(token),
                Err(_) => config.settings(provider).credentials.clone().ok_or_else(|| {
                    Error::config(format!(
                        "default provider {provider:?} has no API key or LLM_SESSION_TOKEN"
                    ))
                })?,
            };
            config = config.with_default_route(provider, credentials);
        }

        if let Some(timeout) = env::var("LLM_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.request_timeout_secs = timeout;
        }

        Ok(config)
    }
}

impl ConfigSource for EngineConfig {
    fn credentials(&self, provider: ProviderKind) -> Option<Credentials> {
        self.settings(provider).credentials.clone()
    }

    fn base_url(&self, provider: ProviderKind) -> Option<String> {
        self.settings(provider).base_url.clone()
    }

    fn default_route(&self) -> Option<DefaultRoute> {
        self.default_route.clone()
    }

    fn custom_model(&self, model_id: &str) -> Option<CustomModel> {
        self.custom_models
            .iter()
            .find(|m| m.model_id == model_id)
            .cloned()
    }
}
