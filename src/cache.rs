//! Response cache keyed by a canonical request fingerprint.

use crate::types::{CompletionInput, CompletionRequest, OutputUnit, Quality};
use crate::Error;
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;

/// Cached result: one unit sequence per choice index.
pub type CachedOutputs = Vec<Vec<OutputUnit>>;

/// Deterministic fingerprint of everything that determines a completion.
/// The user identifier is excluded. The streaming flag is included because it
/// decides whether units arrive as deltas or as whole messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

/// Field order here is the canonical serialization order.
#[derive(Serialize)]
struct Canonical<'a> {
    model_id: Option<&'a str>,
    quality: Quality,
    input: &'a CompletionInput,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    stop_sequences: &'a [String],
    num_outputs: u32,
    stream: bool,
}

impl CacheKey {
    pub fn for_request(request: &CompletionRequest) -> Result<Self, Error> {
        let canonical = Canonical {
            model_id: request.model_id.as_deref(),
            quality: request.quality_tier(),
            input: &request.input,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stop_sequences: &request.stop_sequences,
            num_outputs: request.num_outputs,
            stream: request.stream,
        };
        let bytes = serde_json::to_vec(&canonical)?;
        let digest = Sha256::digest(&bytes);
        Ok(Self(digest.iter().map(|b| format!("{b:02x}")).collect()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller-supplied cache collaborator. Implementations must tolerate concurrent
/// calls; writes for the same key simply overwrite.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedOutputs>, Error>;
    async fn set(&self, key: &CacheKey, outputs: CachedOutputs) -> Result<(), Error>;
}

/// Bounded in-process cache, least recently used entries evicted first.
pub struct MemoryCache {
    entries: Mutex<LruCache<CacheKey, CachedOutputs>>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedOutputs>, Error> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &CacheKey, outputs: CachedOutputs) -> Result<(), Error> {
        self.entries.lock().put(key.clone(), outputs);
        Ok(())
    }
}
