//! A provider-agnostic completion engine.
//!
//! Requests are resolved to an upstream provider (OpenAI, Anthropic, OpenAI image
//! generation, or any OpenAI-compatible endpoint), sent over HTTP, and streamed back
//! as normalized output units with one independent sequence per requested output.
//! Optional cache and transaction-history collaborators plug in at the dispatcher.

pub mod accumulator;
pub mod cache;
pub mod completion;
pub mod config;
pub mod decoder;
pub mod dispatcher;
pub mod error;
pub mod normalize;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod transaction;
pub mod types;

// Re-export core types for easy usage
pub use accumulator::{CompleteOutput, MediaItem, OutputAccumulator};
pub use cache::{CacheKey, CacheStore, CachedOutputs, MemoryCache};
pub use completion::{Completion, OutputStream};
pub use config::{ConfigSource, CustomModel, DefaultRoute, EngineConfig, ProviderKind};
pub use dispatcher::Dispatcher;
pub use error::Error;
pub use provider::ProviderDescriptor;
pub use providers::*;
pub use registry::{ModelRegistry, Route};
pub use transaction::{Transaction, TransactionOutcome, TransactionSink};
pub use types::*;
