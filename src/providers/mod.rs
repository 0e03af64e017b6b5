//! Descriptors for the built-in upstream providers.

pub mod anthropic;
pub mod openai;

// Re-export commonly used provider types
pub use anthropic::AnthropicDescriptor;
pub use openai::{ImageDescriptor, OpenAIDescriptor};
