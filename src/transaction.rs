//! Transaction records handed to the history collaborator.

use crate::types::{CompletionRequest, OutputUnit};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a dispatched request ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransactionOutcome {
    Completed {
        outputs: Vec<Vec<OutputUnit>>,
        cached: bool,
    },
    /// `outputs` holds whatever was delivered before the failure.
    Failed {
        error: String,
        outputs: Vec<Vec<OutputUnit>>,
    },
    /// Consumer went away (or the transport timed out) before completion.
    Cancelled { outputs: Vec<Vec<OutputUnit>> },
}

impl TransactionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransactionOutcome::Completed { .. })
    }
}

/// One request and how it ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub origin: String,
    /// Resolved provider and concrete model, when resolution got that far.
    pub provider: Option<String>,
    pub model: Option<String>,
    pub request: CompletionRequest,
    pub outcome: TransactionOutcome,
}

impl Transaction {
    pub fn new(
        origin: impl Into<String>,
        request: CompletionRequest,
        outcome: TransactionOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            origin: origin.into(),
            provider: None,
            model: None,
            request,
            outcome,
        }
    }

    pub fn with_route(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self.model = Some(model.into());
        self
    }
}

/// History collaborator. Called exactly once per dispatched request.
#[async_trait]
pub trait TransactionSink: Send + Sync {
    async fn record(&self, transaction: Transaction);
}
