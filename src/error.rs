use thiserror::Error;

/// Errors that can occur while resolving, dispatching or decoding a completion.
#[derive(Error, Debug)]
pub enum Error {
    #[error("No provider or credentials configured for model: {model}")]
    UnresolvedModel { model: String },

    #[error("Provider {provider} returned HTTP {status}: {body}")]
    ProviderHttp {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Malformed stream event ({message}): {line}")]
    StreamDecode { line: String, message: String },

    #[error("Unrecognized {provider} response shape: {message}")]
    Normalization { provider: String, message: String },

    #[error("Provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(String),
}

impl Error {
    pub fn unresolved(model: impl Into<String>) -> Self {
        Error::UnresolvedModel {
            model: model.into(),
        }
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn normalization(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Normalization {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn decode(line: impl Into<String>, message: impl Into<String>) -> Self {
        Error::StreamDecode {
            line: line.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Error::Cache(message.into())
    }

    /// HTTP status of an upstream failure, if this error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::ProviderHttp { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the transport gave up waiting. Timeouts are recorded like cancellations.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout(),
            Error::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }

    /// Hint for callers implementing their own retry policy.
    pub fn is_retryable(&self) -> bool {
        if self.is_timeout() {
            return true;
        }
        match self.status() {
            Some(status) => status == 429 || (500..600).contains(&status),
            None => matches!(self, Error::Http(e) if e.is_connect()),
        }
    }

    /// Copy used when one failure has to terminate several output sequences.
    /// `reqwest::Error` is not `Clone`, so transport errors degrade to their message.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            Error::UnresolvedModel { model } => Error::unresolved(model.clone()),
            Error::ProviderHttp {
                provider,
                status,
                body,
            } => Error::ProviderHttp {
                provider: provider.clone(),
                status: *status,
                body: body.clone(),
            },
            Error::StreamDecode { line, message } => Error::decode(line.clone(), message.clone()),
            Error::Normalization { provider, message } => {
                Error::normalization(provider.clone(), message.clone())
            }
            Error::Provider { provider, message } => {
                Error::provider(provider.clone(), message.clone())
            }
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), e.to_string())),
            Error::Config(message) => Error::Config(message.clone()),
            Error::Cache(message) => Error::Cache(message.clone()),
            other => Error::provider("transport", other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_http_classification() {
        let rate_limited = Error::ProviderHttp {
            provider: "openai".to_string(),
            status: 429,
            body: "slow down".to_string(),
        };
        assert_eq!(rate_limited.status(), Some(429));
        assert!(rate_limited.is_retryable());
        assert!(rate_limited.to_string().contains("429"));
        assert!(rate_limited.to_string().contains("slow down"));

        let bad_request = Error::ProviderHttp {
            provider: "openai".to_string(),
            status: 400,
            body: "bad".to_string(),
        };
        assert!(!bad_request.is_retryable());
    }

    #[test]
    fn test_timeout_detection() {
        let timeout = Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "late"));
        assert!(timeout.is_timeout());
        assert!(timeout.is_retryable());
        assert!(!Error::decode("x", "y").is_timeout());
    }

    #[test]
    fn test_duplicate_keeps_variant() {
        let original = Error::decode("data: nope", "expected value");
        match original.duplicate() {
            Error::StreamDecode { line, .. } => assert_eq!(line, "data: nope"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
