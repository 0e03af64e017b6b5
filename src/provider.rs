use crate::normalize::ChoiceFragment;
use crate::types::{CompletionRequest, Credentials, Quality, RequestMeta};
use crate::Error;
use reqwest::header::HeaderMap;
use serde_json::Value;

/// Static description of one upstream provider: where to send a request, how to
/// shape it, and how to read what comes back.
///
/// Descriptors are built once, never mutated, and shared read-only by every
/// request routed to the provider.
pub trait ProviderDescriptor: Send + Sync + 'static {
    /// Stable provider identifier.
    fn model_provider(&self) -> &str;

    fn base_url(&self) -> &str;

    /// Path appended to [`ProviderDescriptor::base_url`].
    fn path(&self, request: &CompletionRequest) -> String;

    /// Concrete provider model for a logical request.
    fn model_id(&self, request: &CompletionRequest, quality: Quality) -> String;

    /// Provider wire payload. Routing-only fields never reach it.
    fn transform_request(
        &self,
        request: &CompletionRequest,
        meta: &RequestMeta,
    ) -> Result<Value, Error>;

    /// Reduce one decoded provider event to per-choice fragments.
    ///
    /// An `Err` means the event could not be attributed to any choice.
    fn transform_response(&self, event: &Value) -> Result<Vec<ChoiceFragment>, Error>;

    /// Authentication headers derived from the credentials.
    fn auth_headers(&self, credentials: &Credentials) -> Result<HeaderMap, Error>;

    /// Payload marking the logical end of a stream. `None` relies on transport close.
    fn end_of_stream_sentinel(&self) -> Option<&str> {
        None
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    /// Whether one call can return several choices. Otherwise the dispatcher fans out.
    fn supports_multiple_choices(&self) -> bool {
        true
    }

    fn url(&self, request: &CompletionRequest) -> String {
        format!(
            "{}{}",
            self.base_url().trim_end_matches('/'),
            self.path(request)
        )
    }
}

/// Build a header map holding `Authorization: Bearer <secret>`.
pub(crate) fn bearer_headers(provider: &str, secret: &str) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();
    let value = format!("Bearer {secret}")
        .parse()
        .map_err(|_| Error::provider(provider, "credential is not a valid header value"))?;
    headers.insert(reqwest::header::AUTHORIZATION, value);
    Ok(headers)
}
