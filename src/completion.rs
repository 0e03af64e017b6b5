//! The caller-facing result of a dispatch: one lazy output sequence per choice.

use crate::accumulator::{CompleteOutput, OutputAccumulator};
use crate::types::OutputUnit;
use crate::Error;
use futures_util::stream::Stream;
use futures_util::StreamExt;
use std::pin::Pin;

/// Ordered normalized units of one choice. Ends after the last unit or the first error.
pub type OutputStream = Pin<Box<dyn Stream<Item = Result<OutputUnit, Error>> + Send>>;

/// Independent output sequences, one per requested output.
///
/// Dropping every sequence before the provider finishes cancels the request.
pub struct Completion {
    choices: Vec<OutputStream>,
    provider: String,
    model: String,
    cached: bool,
}

impl Completion {
    pub fn new(
        choices: Vec<OutputStream>,
        provider: impl Into<String>,
        model: impl Into<String>,
        cached: bool,
    ) -> Self {
        Self {
            choices,
            provider: provider.into(),
            model: model.into(),
            cached,
        }
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    /// Whether the outputs are a cache replay.
    pub fn is_cached(&self) -> bool {
        self.cached
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Take every sequence, indexed by choice.
    pub fn into_streams(self) -> Vec<OutputStream> {
        self.choices
    }

    /// Take the first sequence; the others are dropped.
    pub fn into_stream(self) -> OutputStream {
        self.choices
            .into_iter()
            .next()
            .unwrap_or_else(|| Box::pin(futures_util::stream::empty()))
    }

    /// Consume every sequence in choice order.
    pub async fn buffer(self) -> Result<Vec<CompleteOutput>, Error> {
        let mut outputs = Vec::with_capacity(self.choices.len());
        for choice in self.choices {
            outputs.push(Self::buffer_stream(choice).await?);
        }
        Ok(outputs)
    }

    /// Text of the first choice (convenience method).
    pub async fn text(self) -> Result<String, Error> {
        let output = Self::buffer_stream(self.into_stream()).await?;
        Ok(output.text)
    }

    async fn buffer_stream(mut stream: OutputStream) -> Result<CompleteOutput, Error> {
        let mut accumulator = OutputAccumulator::new();
        while let Some(unit) = stream.next().await {
            accumulator.push(unit?);
        }
        Ok(accumulator.finalize())
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("choices", &self.choices.len())
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("cached", &self.cached)
            .finish()
    }
}
