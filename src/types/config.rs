use serde::{Deserialize, Serialize};

/// Opaque credential attached to an upstream call.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Credentials {
    /// Provider API key.
    ApiKey(String),
    /// Token handed over by an external session.
    Session(String),
}

impl Credentials {
    pub fn secret(&self) -> &str {
        match self {
            Credentials::ApiKey(key) => key,
            Credentials::Session(token) => token,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::ApiKey(_) => f.write_str("ApiKey(***)"),
            Credentials::Session(_) => f.write_str("Session(***)"),
        }
    }
}

/// Per-call facts a descriptor needs besides the logical request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestMeta {
    /// Concrete provider model.
    pub model: String,
    pub stream: bool,
    /// Number of choices this single call should produce.
    pub choices: u32,
}
